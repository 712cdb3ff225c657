// SPDX-License-Identifier: Apache-2.0

//! # Mailbox functions
//!
//! Registered mailbox functions are typed closures wrapped, at registration
//! time, into a uniform type-erased shape: decode the argument, run the user
//! closure with exclusive state access, encode the reply. The table is
//! explicit per actor; an unknown function name is answered with
//! [`crate::code::RPC_NOT_IMPLEMENT`] instead of being looked up by
//! convention.
//!

use serde::{de::DeserializeOwned, Serialize};

use std::collections::HashMap;
use std::sync::Arc;

use crate::message::{Message, Payload};
use crate::{code, ActorContext, ActorHandler, Error, Serializer};

/// Outcome of one mailbox invocation.
pub(crate) struct Invoked {
    pub code: i32,
    pub reply: Payload,
}

impl Invoked {
    pub(crate) fn code(code: i32) -> Self {
        Invoked {
            code,
            reply: Payload::None,
        }
    }
}

/// Uniform invocation shape every registered function is reduced to.
pub(crate) type MailFn<H> = Arc<
    dyn Fn(&mut H, &mut ActorContext<H>, &mut Message) -> Invoked + Send + Sync,
>;

/// Per-actor table of registered mailbox functions.
pub(crate) struct FuncTable<H: ActorHandler> {
    funcs: HashMap<String, MailFn<H>>,
}

impl<H: ActorHandler> FuncTable<H> {
    pub(crate) fn new() -> Self {
        FuncTable {
            funcs: HashMap::new(),
        }
    }

    /// Adds a wrapped function under `name`. Registration is eager about
    /// mistakes: an empty name or a duplicate fails immediately instead of
    /// surfacing as a missing function at call time.
    pub(crate) fn register(
        &mut self,
        name: &str,
        func: MailFn<H>,
    ) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::FuncName);
        }
        if self.funcs.contains_key(name) {
            return Err(Error::DuplicateFunc(name.to_owned()));
        }
        self.funcs.insert(name.to_owned(), func);
        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> Option<MailFn<H>> {
        self.funcs.get(name).cloned()
    }
}

/// Decodes the argument of `msg` into `Req`.
fn decode_args<Req: DeserializeOwned + 'static>(
    serializer: Serializer,
    msg: &mut Message,
) -> Result<Req, ()> {
    match msg.take_args() {
        Payload::Value(boxed) => boxed.downcast::<Req>().map(|v| *v).map_err(|_| ()),
        Payload::Bytes(bytes) => serializer.unmarshal(&bytes).map_err(|_| ()),
        // Calls without arguments reach the table as an empty encoding.
        Payload::None => serializer.unmarshal(&[]).map_err(|_| ()),
    }
}

/// Wraps a request/response function. The reply travels back typed for
/// in-process callers and wire-encoded for cluster callers.
pub(crate) fn wrap_remote<H, Req, Rsp, F>(
    serializer: Serializer,
    func: F,
) -> MailFn<H>
where
    H: ActorHandler,
    Req: DeserializeOwned + Send + 'static,
    Rsp: Serialize + Send + 'static,
    F: Fn(&mut H, &mut ActorContext<H>, Req) -> (i32, Option<Rsp>)
        + Send
        + Sync
        + 'static,
{
    Arc::new(move |state, ctx, msg| {
        let Ok(req) = decode_args::<Req>(serializer, msg) else {
            return Invoked::code(code::RPC_UNMARSHAL_ERROR);
        };
        let (result, rsp) = func(state, ctx, req);
        let reply = match rsp {
            None => Payload::None,
            Some(rsp) if msg.is_cluster => match serializer.marshal(&rsp) {
                Ok(bytes) => Payload::Bytes(bytes),
                Err(_) => return Invoked::code(code::RPC_MARSHAL_ERROR),
            },
            Some(rsp) => Payload::value(rsp),
        };
        Invoked {
            code: result,
            reply,
        }
    })
}

/// Wraps a one-way function; only the status code travels back.
pub(crate) fn wrap_local<H, Req, F>(serializer: Serializer, func: F) -> MailFn<H>
where
    H: ActorHandler,
    Req: DeserializeOwned + Send + 'static,
    F: Fn(&mut H, &mut ActorContext<H>, Req) -> i32 + Send + Sync + 'static,
{
    Arc::new(move |state, ctx, msg| {
        let Ok(req) = decode_args::<Req>(serializer, msg) else {
            return Invoked::code(code::RPC_UNMARSHAL_ERROR);
        };
        Invoked::code(func(state, ctx, req))
    })
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn register_rejects_empty_and_duplicate_names() {
        struct Dummy;
        impl ActorHandler for Dummy {}

        let mut table: FuncTable<Dummy> = FuncTable::new();
        let func: MailFn<Dummy> =
            Arc::new(|_, _, _| Invoked::code(code::OK));

        assert_eq!(table.register("", func.clone()), Err(Error::FuncName));
        assert!(table.register("join", func.clone()).is_ok());
        assert_eq!(
            table.register("join", func),
            Err(Error::DuplicateFunc("join".to_owned()))
        );
        assert!(table.get("join").is_some());
        assert!(table.get("leave").is_none());
    }

    #[test]
    fn decode_prefers_typed_payload() {
        let mut msg = Message::new("", "node1.room", "join", 0);
        msg.args = Payload::value(7u32);
        assert_eq!(decode_args::<u32>(Serializer::Bincode, &mut msg), Ok(7));

        let mut msg = Message::new("", "node1.room", "join", 0);
        msg.args = Payload::Bytes(Serializer::Json.marshal(&9u32).unwrap());
        assert_eq!(decode_args::<u32>(Serializer::Json, &mut msg), Ok(9));

        let mut msg = Message::new("", "node1.room", "join", 0);
        msg.args = Payload::value("wrong type".to_owned());
        assert!(decode_args::<u32>(Serializer::Bincode, &mut msg).is_err());
    }
}
