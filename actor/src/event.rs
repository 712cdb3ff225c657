// SPDX-License-Identifier: Apache-2.0

//! # Events
//!
//! Broadcast notifications decoupled from the RPC path. An event is published
//! by name, fans out to every top-level actor, and cascades from each actor
//! to its children; an actor only receives events whose names it registered a
//! handler for, and the handler always runs on the owning actor's task.
//!

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{ActorContext, ActorHandler, Error};

/// A broadcastable notification.
///
/// Events travel by shared reference, so one publication can reach many
/// actors without cloning the payload.
pub trait EventData: Any + Send + Sync {
    /// Name the event is registered and matched under.
    fn name(&self) -> &str;
}

impl dyn EventData {
    /// Downcasts a shared event to its concrete type.
    pub fn downcast_ref<T: EventData>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref::<T>()
    }
}

/// Type-erased event handler bound to a handler type.
pub(crate) type EventFn<H> =
    Arc<dyn Fn(&mut H, &mut ActorContext<H>, &Arc<dyn EventData>) + Send + Sync>;

/// Per-actor table of event handlers, keyed by event name.
pub(crate) struct EventTable<H: ActorHandler> {
    handlers: HashMap<String, EventFn<H>>,
}

impl<H: ActorHandler> EventTable<H> {
    pub(crate) fn new() -> Self {
        EventTable {
            handlers: HashMap::new(),
        }
    }

    /// Registers a typed handler under the event's name. Re-registering a
    /// name replaces the previous handler.
    pub(crate) fn register<E, F>(&mut self, name: &str, handler: F) -> Result<(), Error>
    where
        E: EventData,
        F: Fn(&mut H, &mut ActorContext<H>, &E) + Send + Sync + 'static,
    {
        if name.is_empty() {
            return Err(Error::FuncName);
        }
        let wrapped: EventFn<H> = Arc::new(move |state, ctx, event| {
            if let Some(typed) = event.as_ref().downcast_ref::<E>() {
                handler(state, ctx, typed);
            }
        });
        self.handlers.insert(name.to_owned(), wrapped);
        Ok(())
    }

    pub(crate) fn unregister(&mut self, name: &str) {
        self.handlers.remove(name);
    }

    pub(crate) fn get(&self, name: &str) -> Option<EventFn<H>> {
        self.handlers.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    struct PlayerOnline {
        player_id: u64,
    }

    impl EventData for PlayerOnline {
        fn name(&self) -> &str {
            "player_online"
        }
    }

    struct ServerClosing;

    impl EventData for ServerClosing {
        fn name(&self) -> &str {
            "server_closing"
        }
    }

    #[test]
    fn downcast_matches_concrete_type() {
        let event: Arc<dyn EventData> = Arc::new(PlayerOnline { player_id: 12 });
        assert_eq!(event.name(), "player_online");
        let typed = event.downcast_ref::<PlayerOnline>().unwrap();
        assert_eq!(typed.player_id, 12);
        assert!(event.downcast_ref::<ServerClosing>().is_none());
    }
}
