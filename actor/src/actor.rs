// SPDX-License-Identifier: Apache-2.0

//! # Actor core
//!
//! The handler trait user state implements, the shared reference other tasks
//! hold, and the context a running actor works through. One tokio task owns
//! each actor's state; everything another task can do to an actor goes
//! through queues or the cancellation token on its [`ActorRef`].
//!

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use std::collections::{HashMap, HashSet};
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc, RwLock,
};
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use crate::event::{EventData, EventFn, EventTable};
use crate::mailbox::{wrap_local, wrap_remote, FuncTable, MailFn};
use crate::message::Message;
use crate::queue::QueueSender;
use crate::runner::ActorRunner;
use crate::system::SystemRef;
use crate::timer::{Scheduler, TimerId};
use crate::{Error, Serializer};

/// Lifecycle of a running actor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ActorState {
    /// Created, `on_init` not finished yet.
    Init,
    /// Processing mailbox work.
    Working,
    /// Asked to close; draining pending work.
    Stopping,
    /// Fully stopped and deregistered.
    Stopped,
}

/// Routing decision returned by the received hooks.
#[derive(Clone, Copy, Debug)]
pub struct Dispatch {
    /// Route to a child mailbox when the target names one.
    pub next: bool,
    /// Invoke the registered function on this actor.
    pub invoke: bool,
}

impl Default for Dispatch {
    fn default() -> Self {
        Dispatch {
            next: true,
            invoke: true,
        }
    }
}

/// User state hosted by an actor.
///
/// All hooks run on the actor's own task with exclusive access to `self`;
/// none of them may be called from outside. Mailbox functions are registered
/// in `on_init` through the context.
#[async_trait]
pub trait ActorHandler: Send + Sized + 'static {
    /// Secondary lookup id, resolvable beside the actor id. Empty for none.
    fn alias_id(&self) -> &str {
        ""
    }

    /// Runs once before the mailbox opens. Registration errors here abort
    /// the start.
    async fn on_init(&mut self, _ctx: &mut ActorContext<Self>) -> Result<(), Error> {
        Ok(())
    }

    /// Runs once after the mailbox has drained, before deregistration.
    async fn on_stop(&mut self, _ctx: &mut ActorContext<Self>) {}

    /// Inspects every local message before routing and invocation.
    async fn on_local_received(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        _msg: &mut Message,
    ) -> Dispatch {
        Dispatch::default()
    }

    /// Inspects every remote message before routing and invocation.
    async fn on_remote_received(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        _msg: &mut Message,
    ) -> Dispatch {
        Dispatch::default()
    }

    /// Called when a message targets a child this actor does not have yet.
    /// Returning a reference (usually from [`ActorContext::create_child`])
    /// lets the message proceed; `None` fails it with not-found.
    async fn on_find_child(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        _child_id: &str,
    ) -> Option<ActorRef> {
        None
    }
}

/// Children of one actor, keyed by child id and remembered in creation
/// order so shutdown can walk them newest first.
#[derive(Clone)]
pub(crate) struct ChildRegistry(Arc<RwLock<ChildMap>>);

struct ChildMap {
    by_id: HashMap<String, ActorRef>,
    order: Vec<String>,
}

impl ChildRegistry {
    pub(crate) fn new() -> Self {
        ChildRegistry(Arc::new(RwLock::new(ChildMap {
            by_id: HashMap::new(),
            order: Vec::new(),
        })))
    }

    pub(crate) fn get(&self, child_id: &str) -> Option<ActorRef> {
        match self.0.read() {
            Ok(map) => map.by_id.get(child_id).cloned(),
            Err(_) => None,
        }
    }

    fn insert(&self, child_id: &str, actor_ref: ActorRef) {
        if let Ok(mut map) = self.0.write() {
            if map.by_id.insert(child_id.to_owned(), actor_ref).is_none() {
                map.order.push(child_id.to_owned());
            }
        }
    }

    pub(crate) fn remove(&self, child_id: &str) {
        if let Ok(mut map) = self.0.write() {
            map.by_id.remove(child_id);
            map.order.retain(|id| id != child_id);
        }
    }

    /// Children in creation order.
    pub(crate) fn snapshot(&self) -> Vec<ActorRef> {
        match self.0.read() {
            Ok(map) => map
                .order
                .iter()
                .filter_map(|id| map.by_id.get(id).cloned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Children in reverse creation order, for shutdown.
    pub(crate) fn snapshot_reverse(&self) -> Vec<ActorRef> {
        let mut children = self.snapshot();
        children.reverse();
        children
    }
}

/// The queues and signals other tasks reach an actor through.
pub(crate) struct ActorCell {
    pub(crate) path: crate::ActorPath,
    pub(crate) alias: String,
    pub(crate) local_tx: QueueSender<Message>,
    pub(crate) remote_tx: QueueSender<Message>,
    pub(crate) event_tx: QueueSender<Arc<dyn EventData>>,
    pub(crate) timer_tx: QueueSender<TimerId>,
    pub(crate) token: CancellationToken,
    pub(crate) state_rx: watch::Receiver<ActorState>,
    pub(crate) event_names: Arc<RwLock<HashSet<String>>>,
    pub(crate) children: ChildRegistry,
    pub(crate) last_at: AtomicI64,
}

/// Shared handle to a running actor. Cloning is cheap; the actor itself is
/// never reachable through it, only its mailboxes.
#[derive(Clone)]
pub struct ActorRef(Arc<ActorCell>);

impl ActorRef {
    pub(crate) fn new(cell: ActorCell) -> Self {
        ActorRef(Arc::new(cell))
    }

    /// The actor's path.
    pub fn path(&self) -> &crate::ActorPath {
        &self.0.path
    }

    /// The actor's alias id, empty when it has none.
    pub fn alias(&self) -> &str {
        &self.0.alias
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ActorState {
        *self.0.state_rx.borrow()
    }

    /// When the actor last finished a piece of mailbox work, in epoch
    /// milliseconds. Useful for idle-actor sweeps above the runtime.
    pub fn last_at(&self) -> i64 {
        self.0.last_at.load(Ordering::Relaxed)
    }

    pub(crate) fn touch(&self, at: i64) {
        self.0.last_at.store(at, Ordering::Relaxed);
    }

    /// Enqueues into the local mailbox.
    pub fn push_local(&self, mut msg: Message) -> Result<(), Error> {
        msg.stamp_posted();
        self.0.local_tx.push(msg)
    }

    /// Enqueues into the remote mailbox.
    pub fn push_remote(&self, mut msg: Message) -> Result<(), Error> {
        msg.stamp_posted();
        self.0.remote_tx.push(msg)
    }

    /// Delivers an event to this actor if it registered a handler for the
    /// event's name, then cascades to its children.
    pub fn push_event(&self, event: Arc<dyn EventData>) {
        let registered = match self.0.event_names.read() {
            Ok(names) => names.contains(event.name()),
            Err(_) => false,
        };
        if registered {
            // A closed queue means the actor is already past draining.
            let _ = self.0.event_tx.push(event.clone());
        }
        for child in self.0.children.snapshot() {
            child.push_event(event.clone());
        }
    }

    /// Asks the actor to close. Idempotent; pending mailbox work is drained
    /// before the actor stops.
    pub fn exit(&self) {
        self.0.token.cancel();
    }

    /// Waits until the actor has fully stopped and deregistered.
    pub async fn wait_stopped(&self) {
        let mut state_rx = self.0.state_rx.clone();
        let _ = state_rx
            .wait_for(|state| *state == ActorState::Stopped)
            .await;
    }

    pub(crate) fn timer_sink(&self) -> QueueSender<TimerId> {
        self.0.timer_tx.clone()
    }

    pub(crate) fn children(&self) -> &ChildRegistry {
        &self.0.children
    }

    pub(crate) fn event_names(&self) -> &Arc<RwLock<HashSet<String>>> {
        &self.0.event_names
    }
}

pub(crate) type TimerFn<H> =
    Arc<dyn Fn(&mut H, &mut ActorContext<H>) + Send + Sync>;

pub(crate) struct TimerEntry<H: ActorHandler> {
    func: TimerFn<H>,
    once: bool,
}

/// The running actor's view of itself and the system.
///
/// Handed to every hook, mailbox function, event handler and timer callback;
/// owns the registration tables. Never leaves the actor's task.
pub struct ActorContext<H: ActorHandler> {
    system: SystemRef,
    actor_ref: ActorRef,
    serializer: Serializer,
    funcs: FuncTable<H>,
    events: EventTable<H>,
    timers: HashMap<TimerId, TimerEntry<H>>,
}

impl<H: ActorHandler> ActorContext<H> {
    pub(crate) fn new(system: SystemRef, actor_ref: ActorRef) -> Self {
        let serializer = system.serializer();
        ActorContext {
            system,
            actor_ref,
            serializer,
            funcs: FuncTable::new(),
            events: EventTable::new(),
            timers: HashMap::new(),
        }
    }

    /// The hosting system.
    pub fn system(&self) -> &SystemRef {
        &self.system
    }

    /// This actor's shared reference.
    pub fn actor_ref(&self) -> &ActorRef {
        &self.actor_ref
    }

    /// This actor's path.
    pub fn path(&self) -> &crate::ActorPath {
        self.actor_ref.path()
    }

    /// Registers a request/response mailbox function.
    pub fn register_remote<Req, Rsp, F>(
        &mut self,
        name: &str,
        func: F,
    ) -> Result<(), Error>
    where
        Req: DeserializeOwned + Send + 'static,
        Rsp: Serialize + Send + 'static,
        F: Fn(&mut H, &mut ActorContext<H>, Req) -> (i32, Option<Rsp>)
            + Send
            + Sync
            + 'static,
    {
        self.funcs
            .register(name, wrap_remote(self.serializer, func))
    }

    /// Registers a one-way mailbox function.
    pub fn register_local<Req, F>(&mut self, name: &str, func: F) -> Result<(), Error>
    where
        Req: DeserializeOwned + Send + 'static,
        F: Fn(&mut H, &mut ActorContext<H>, Req) -> i32 + Send + Sync + 'static,
    {
        self.funcs.register(name, wrap_local(self.serializer, func))
    }

    /// Subscribes this actor to events published under `name`.
    pub fn register_event<E, F>(&mut self, name: &str, func: F) -> Result<(), Error>
    where
        E: EventData,
        F: Fn(&mut H, &mut ActorContext<H>, &E) + Send + Sync + 'static,
    {
        self.events.register::<E, F>(name, func)?;
        if let Ok(mut names) = self.actor_ref.event_names().write() {
            names.insert(name.to_owned());
        }
        Ok(())
    }

    /// Drops the subscription for `name`.
    pub fn unregister_event(&mut self, name: &str) {
        self.events.unregister(name);
        if let Ok(mut names) = self.actor_ref.event_names().write() {
            names.remove(name);
        }
    }

    /// Creates a child actor under this actor. Idempotent: an existing child
    /// with the same id is returned as-is. Only top-level actors may own
    /// children.
    pub fn create_child<C: ActorHandler>(
        &mut self,
        child_id: &str,
        handler: C,
    ) -> Result<ActorRef, Error> {
        if self.path().is_child() {
            return Err(Error::ForbiddenCreateChildActor(self.path().clone()));
        }
        if child_id.is_empty() || child_id.contains('.') {
            return Err(Error::ActorId);
        }
        let children = self.actor_ref.children();
        if let Some(existing) = children.get(child_id) {
            return Ok(existing);
        }
        let path = self.path().child_of(child_id);
        let (runner, child_ref) = ActorRunner::create(
            self.system.clone(),
            path,
            handler,
            Some(children.clone()),
        );
        children.insert(child_id, child_ref.clone());
        tokio::spawn(async move { runner.run(None).await });
        Ok(child_ref)
    }

    /// Looks up an existing child.
    pub fn get_child(&self, child_id: &str) -> Option<ActorRef> {
        self.actor_ref.children().get(child_id)
    }

    /// Registers a fixed-period recurring timer.
    pub fn add_timer<F>(&mut self, interval: Duration, func: F) -> TimerId
    where
        F: Fn(&mut H, &mut ActorContext<H>) + Send + Sync + 'static,
    {
        let id = self
            .system
            .wheel()
            .add_interval(interval, self.actor_ref.timer_sink());
        self.timers.insert(
            id,
            TimerEntry {
                func: Arc::new(func),
                once: false,
            },
        );
        id
    }

    /// Registers a one-shot timer.
    pub fn add_timer_once<F>(&mut self, delay: Duration, func: F) -> TimerId
    where
        F: Fn(&mut H, &mut ActorContext<H>) + Send + Sync + 'static,
    {
        let id = self
            .system
            .wheel()
            .add_once(delay, self.actor_ref.timer_sink());
        self.timers.insert(
            id,
            TimerEntry {
                func: Arc::new(func),
                once: true,
            },
        );
        id
    }

    /// Registers a recurring timer driven by a wall-clock schedule.
    pub fn add_schedule<F>(
        &mut self,
        schedule: Arc<dyn Scheduler>,
        func: F,
    ) -> Result<TimerId, Error>
    where
        F: Fn(&mut H, &mut ActorContext<H>) + Send + Sync + 'static,
    {
        let id = self
            .system
            .wheel()
            .add_schedule(schedule, self.actor_ref.timer_sink())?;
        self.timers.insert(
            id,
            TimerEntry {
                func: Arc::new(func),
                once: false,
            },
        );
        Ok(id)
    }

    /// Cancels a timer.
    pub fn remove_timer(&mut self, id: TimerId) {
        self.system.wheel().remove(id);
        self.timers.remove(&id);
    }

    /// Publishes an event to every actor in the system.
    pub fn post_event(&self, event: impl EventData) {
        self.system.post_event(event);
    }

    /// Delivers an event to this actor and its children only.
    pub fn push_event(&self, event: impl EventData) {
        self.actor_ref.push_event(Arc::new(event));
    }

    /// Asks this actor to close once its mailboxes drain.
    pub fn stop(&self) {
        self.actor_ref.exit();
    }

    pub(crate) fn mail_fn(&self, name: &str) -> Option<MailFn<H>> {
        self.funcs.get(name)
    }

    pub(crate) fn event_fn(&self, name: &str) -> Option<EventFn<H>> {
        self.events.get(name)
    }

    /// Pulls a timer callback for invocation. One-shot entries are consumed.
    pub(crate) fn take_timer(&mut self, id: TimerId) -> Option<TimerFn<H>> {
        let entry = self.timers.get(&id)?;
        let func = entry.func.clone();
        if entry.once {
            self.timers.remove(&id);
        }
        Some(func)
    }

    /// Removes every live timer from the wheel. Part of shutdown.
    pub(crate) fn clear_timers(&mut self) {
        for id in self.timers.keys() {
            self.system.wheel().remove(*id);
        }
        self.timers.clear();
    }
}
