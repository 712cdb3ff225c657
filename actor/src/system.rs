// SPDX-License-Identifier: Apache-2.0

//! # Actor system
//!
//! One system per process node: the registry of top-level actors, the shared
//! timing wheel, the optional cluster transport, and the posting API every
//! caller goes through. [`SystemRef`] is the cheap clonable handle;
//! [`SystemRunner`] is the long-lived task that reacts to system events and
//! drives orderly shutdown.
//!

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::actor::ActorRef;
use crate::cluster::{Cluster, ClusterReply, RemotePacket, ResponsePacket};
use crate::event::EventData;
use crate::message::{Message, Payload, Response};
use crate::runner::{fail_message, ActorRunner};
use crate::timer::TimingWheel;
use crate::{code, ActorHandler, ActorPath, Error, Serializer};

/// System configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Identity of this node inside the cluster.
    pub node_id: String,
    /// Wire format for cluster payloads.
    pub serializer: Serializer,
    /// How long a waiting call blocks before giving up, in milliseconds.
    pub call_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            node_id: "node".to_owned(),
            serializer: Serializer::default(),
            call_timeout_ms: 3000,
        }
    }
}

/// Control events consumed by the [`SystemRunner`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SystemEvent {
    /// Stop every actor and shut the system down.
    StopSystem,
}

struct Registry {
    by_id: HashMap<String, ActorRef>,
    aliases: HashMap<String, String>,
    order: Vec<String>,
}

impl Registry {
    /// Resolves an actor id or alias to a reference.
    fn resolve(&self, id: &str) -> Option<ActorRef> {
        if let Some(actor) = self.by_id.get(id) {
            return Some(actor.clone());
        }
        let actor_id = self.aliases.get(id)?;
        self.by_id.get(actor_id).cloned()
    }
}

struct SystemInner {
    settings: Settings,
    actors: RwLock<Registry>,
    cluster: RwLock<Option<Arc<dyn Cluster>>>,
    wheel: Arc<TimingWheel>,
    event_tx: mpsc::UnboundedSender<SystemEvent>,
}

/// Entry point: builds the system pair.
pub struct ActorSystem;

impl ActorSystem {
    /// Creates a system and its runner. The wheel driver task starts
    /// immediately; the caller is expected to spawn or await
    /// [`SystemRunner::run`].
    pub fn create(
        settings: Settings,
        token: CancellationToken,
    ) -> (SystemRef, SystemRunner) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let wheel = Arc::new(TimingWheel::new());

        let driver = wheel.clone();
        let driver_token = token.clone();
        tokio::spawn(async move { driver.run(driver_token).await });

        let system = SystemRef {
            inner: Arc::new(SystemInner {
                settings,
                actors: RwLock::new(Registry {
                    by_id: HashMap::new(),
                    aliases: HashMap::new(),
                    order: Vec::new(),
                }),
                cluster: RwLock::new(None),
                wheel,
                event_tx,
            }),
        };
        let runner = SystemRunner {
            system: system.clone(),
            event_rx,
            token,
        };
        (system, runner)
    }
}

/// Shared handle to the actor system.
#[derive(Clone)]
pub struct SystemRef {
    inner: Arc<SystemInner>,
}

impl SystemRef {
    /// This node's identity.
    pub fn node_id(&self) -> &str {
        &self.inner.settings.node_id
    }

    /// The configured wire serializer.
    pub fn serializer(&self) -> Serializer {
        self.inner.settings.serializer
    }

    pub(crate) fn wheel(&self) -> &TimingWheel {
        &self.inner.wheel
    }

    /// Installs and connects the cluster transport.
    pub async fn set_cluster(&self, cluster: Arc<dyn Cluster>) -> Result<(), Error> {
        cluster.init().await?;
        if let Ok(mut slot) = self.inner.cluster.write() {
            *slot = Some(cluster);
        }
        info!("Cluster transport connected on node {}.", self.node_id());
        Ok(())
    }

    fn cluster(&self) -> Option<Arc<dyn Cluster>> {
        match self.inner.cluster.read() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        }
    }

    /// Creates and starts a top-level actor. Returns once `on_init` has
    /// finished; an init failure tears the actor down and surfaces here.
    pub async fn create_actor<H: ActorHandler>(
        &self,
        id: &str,
        handler: H,
    ) -> Result<ActorRef, Error> {
        if id.is_empty() || id.contains('.') {
            return Err(Error::ActorId);
        }
        let path = ActorPath::new(self.node_id(), id);
        let (runner, actor_ref) =
            ActorRunner::create(self.clone(), path.clone(), handler, None);
        {
            let mut registry = self
                .inner
                .actors
                .write()
                .map_err(|_| Error::Start(path.to_string()))?;
            if registry.by_id.contains_key(id) {
                return Err(Error::Exists(path));
            }
            let alias = actor_ref.alias().to_owned();
            if !alias.is_empty() {
                registry.aliases.insert(alias, id.to_owned());
            }
            registry.by_id.insert(id.to_owned(), actor_ref.clone());
            registry.order.push(id.to_owned());
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(async move { runner.run(Some(ready_tx)).await });
        match ready_rx.await {
            Ok(Ok(())) => {
                debug!("Actor {} started.", path);
                Ok(actor_ref)
            }
            // The runner deregisters itself on a failed init.
            Ok(Err(err)) => Err(err),
            Err(_) => Err(Error::Start(path.to_string())),
        }
    }

    /// Looks a top-level actor up by id or alias.
    pub fn find_actor(&self, id: &str) -> Option<ActorRef> {
        match self.inner.actors.read() {
            Ok(registry) => registry.resolve(id),
            Err(_) => None,
        }
    }

    pub(crate) async fn remove_actor(&self, path: &ActorPath) {
        if let Ok(mut registry) = self.inner.actors.write() {
            registry.by_id.remove(path.actor_id());
            registry.order.retain(|id| id != path.actor_id());
            registry
                .aliases
                .retain(|_, actor_id| actor_id != path.actor_id());
        }
    }

    /// Posts a message into the target's local mailbox, dispatching through
    /// the cluster when the target lives on another node.
    pub async fn post_local(&self, msg: Message) -> i32 {
        self.post(msg, false).await
    }

    /// Posts a message into the target's remote mailbox.
    pub async fn post_remote(&self, msg: Message) -> i32 {
        self.post(msg, true).await
    }

    async fn post(&self, mut msg: Message, remote: bool) -> i32 {
        if msg.target.is_empty() {
            return fail_message(msg, code::ACTOR_TARGET_PATH_IS_NIL);
        }
        if msg.func_name.is_empty() {
            return fail_message(msg, code::ACTOR_FUNC_NAME_ERROR);
        }
        let path = match msg.target_path() {
            Ok(path) => path.clone(),
            Err(_) => return fail_message(msg, code::ACTOR_CONVERT_PATH_ERROR),
        };

        if path.node_id() != self.node_id() {
            return self.publish(msg, &path, remote).await;
        }

        let Some(actor) = self.find_actor(path.actor_id()) else {
            return fail_message(msg, code::ACTOR_NOT_FOUND);
        };
        let pushed = if remote {
            actor.push_remote(msg)
        } else {
            actor.push_local(msg)
        };
        match pushed {
            Ok(()) => code::OK,
            Err(_) => code::ACTOR_CALL_FAIL,
        }
    }

    /// Hands a message addressed to another node to the cluster transport.
    async fn publish(&self, msg: Message, path: &ActorPath, remote: bool) -> i32 {
        let Some(cluster) = self.cluster() else {
            return code::ACTOR_PUBLISH_REMOTE_ERROR;
        };
        let payload = match msg.args {
            Payload::Bytes(bytes) => bytes,
            Payload::None => Vec::new(),
            // Typed payloads never cross the node boundary.
            Payload::Value(_) => return code::ACTOR_MARSHAL_ERROR,
        };
        let packet = RemotePacket {
            source: msg.source,
            target: msg.target,
            func_name: msg.func_name,
            session: msg.session,
            payload,
        };
        let encoded = match self.serializer().marshal(&packet) {
            Ok(encoded) => encoded,
            Err(_) => return code::ACTOR_MARSHAL_ERROR,
        };
        let published = if remote {
            cluster.publish_remote(path.node_id(), encoded).await
        } else {
            cluster.publish_local(path.node_id(), encoded).await
        };
        match published {
            Ok(()) => code::OK,
            Err(err) => {
                error!("Publish to node {} failed: {}.", path.node_id(), err);
                code::ACTOR_PUBLISH_REMOTE_ERROR
            }
        }
    }

    /// Fire-and-forget call. The argument travels typed in-process and
    /// wire-encoded across nodes; either way it lands in the target's remote
    /// mailbox, so `on_remote_received` sees RPC traffic regardless of where
    /// the caller runs.
    pub async fn call<T: Serialize + Send + 'static>(
        &self,
        source: &str,
        target: &str,
        func_name: &str,
        session: i64,
        args: T,
    ) -> i32 {
        let mut msg = Message::new(source, target, func_name, session);
        let path = match msg.target_path() {
            Ok(path) => path.clone(),
            Err(_) => {
                return if msg.target.is_empty() {
                    code::ACTOR_TARGET_PATH_IS_NIL
                } else {
                    code::ACTOR_CONVERT_PATH_ERROR
                }
            }
        };
        if path.node_id() == self.node_id() {
            msg.args = Payload::value(args);
        } else {
            match self.serializer().marshal(&args) {
                Ok(bytes) => msg.args = Payload::Bytes(bytes),
                Err(_) => return code::ACTOR_MARSHAL_ERROR,
            }
        }
        self.post_remote(msg).await
    }

    /// Blocking call: posts, then waits for the invocation result up to the
    /// configured timeout. A call to the caller's own path is rejected
    /// outright, since the caller's mailbox cannot turn while it waits.
    pub async fn call_wait<T, R>(
        &self,
        source: &str,
        target: &str,
        func_name: &str,
        session: i64,
        args: T,
    ) -> (i32, Option<R>)
    where
        T: Serialize + Send + 'static,
        R: DeserializeOwned + 'static,
    {
        if !source.is_empty() && source == target {
            return (code::ACTOR_SOURCE_EQUAL_TARGET, None);
        }
        let mut msg = Message::new(source, target, func_name, session);
        let path = match msg.target_path() {
            Ok(path) => path.clone(),
            Err(_) => {
                let result = if msg.target.is_empty() {
                    code::ACTOR_TARGET_PATH_IS_NIL
                } else {
                    code::ACTOR_CONVERT_PATH_ERROR
                };
                return (result, None);
            }
        };
        let timeout = Duration::from_millis(self.inner.settings.call_timeout_ms);

        if path.node_id() != self.node_id() {
            return self.call_wait_remote(msg, &path, args, timeout).await;
        }

        msg.args = Payload::value(args);
        let (result_tx, result_rx) = oneshot::channel::<Response>();
        msg.chan_result = Some(result_tx);
        let posted = self.post_remote(msg).await;
        if code::is_fail(posted) {
            return (posted, None);
        }
        match tokio::time::timeout(timeout, result_rx).await {
            Err(_) => (code::ACTOR_CALL_TIMEOUT, None),
            Ok(Err(_)) => (code::ACTOR_CALL_FAIL, None),
            Ok(Ok(response)) => {
                if code::is_fail(response.code) {
                    return (response.code, None);
                }
                match response.data {
                    Payload::None => (code::OK, None),
                    Payload::Value(boxed) => match boxed.downcast::<R>() {
                        Ok(reply) => (code::OK, Some(*reply)),
                        Err(_) => (code::ACTOR_UNMARSHAL_ERROR, None),
                    },
                    Payload::Bytes(bytes) => {
                        match self.serializer().unmarshal(&bytes) {
                            Ok(reply) => (code::OK, Some(reply)),
                            Err(_) => (code::ACTOR_UNMARSHAL_ERROR, None),
                        }
                    }
                }
            }
        }
    }

    async fn call_wait_remote<T, R>(
        &self,
        msg: Message,
        path: &ActorPath,
        args: T,
        timeout: Duration,
    ) -> (i32, Option<R>)
    where
        T: Serialize + Send + 'static,
        R: DeserializeOwned + 'static,
    {
        let Some(cluster) = self.cluster() else {
            return (code::ACTOR_PUBLISH_REMOTE_ERROR, None);
        };
        let payload = match self.serializer().marshal(&args) {
            Ok(bytes) => bytes,
            Err(_) => return (code::ACTOR_MARSHAL_ERROR, None),
        };
        let packet = RemotePacket {
            source: msg.source,
            target: msg.target,
            func_name: msg.func_name,
            session: msg.session,
            payload,
        };
        let encoded = match self.serializer().marshal(&packet) {
            Ok(encoded) => encoded,
            Err(_) => return (code::ACTOR_MARSHAL_ERROR, None),
        };
        let response = match cluster
            .request_remote(path.node_id(), encoded, timeout)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                error!("Request to node {} failed: {}.", path.node_id(), err);
                return (code::RPC_REMOTE_EXECUTE_ERROR, None);
            }
        };
        if code::is_fail(response.code) {
            return (response.code, None);
        }
        if response.data.is_empty() {
            return (code::OK, None);
        }
        match self.serializer().unmarshal(&response.data) {
            Ok(reply) => (code::OK, Some(reply)),
            Err(_) => (code::ACTOR_UNMARSHAL_ERROR, None),
        }
    }

    /// Publishes an event to every top-level actor in creation order; each
    /// actor cascades it to its own children.
    pub fn post_event(&self, event: impl EventData) {
        let event: Arc<dyn EventData> = Arc::new(event);
        let actors = match self.inner.actors.read() {
            Ok(registry) => registry
                .order
                .iter()
                .filter_map(|id| registry.by_id.get(id).cloned())
                .collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        for actor in actors {
            actor.push_event(event.clone());
        }
    }

    /// Feeds an inbound fire-and-forget cluster packet into the target's
    /// local mailbox. Called by the transport integration.
    pub async fn cluster_post_local(&self, packet: &[u8]) -> i32 {
        let packet: RemotePacket = match self.serializer().unmarshal(packet) {
            Ok(packet) => packet,
            Err(_) => return code::RPC_UNMARSHAL_ERROR,
        };
        let mut msg = Message::new(
            &packet.source,
            &packet.target,
            &packet.func_name,
            packet.session,
        );
        msg.is_cluster = true;
        msg.args = Payload::Bytes(packet.payload);
        self.post_local(msg).await
    }

    /// Feeds an inbound cluster request into the target's remote mailbox,
    /// wiring the transport's reply handle through when the peer expects an
    /// answer. Failures before the mailbox are answered on the handle
    /// immediately.
    pub async fn cluster_post_remote(
        &self,
        packet: &[u8],
        reply: Option<Box<dyn ClusterReply>>,
    ) -> i32 {
        let packet: RemotePacket = match self.serializer().unmarshal(packet) {
            Ok(packet) => packet,
            Err(_) => {
                if let Some(reply) = reply {
                    let _ = reply.respond(ResponsePacket {
                        code: code::RPC_UNMARSHAL_ERROR,
                        data: Vec::new(),
                    });
                }
                return code::RPC_UNMARSHAL_ERROR;
            }
        };
        let mut msg = Message::new(
            &packet.source,
            &packet.target,
            &packet.func_name,
            packet.session,
        );
        msg.is_cluster = true;
        msg.args = Payload::Bytes(packet.payload);
        msg.cluster_reply = reply;
        let posted = self.post_remote(msg).await;
        if code::is_fail(posted) {
            // The failure code has already been answered on the reply handle.
            error!("Inbound cluster request failed with code {}.", posted);
        }
        posted
    }

    /// Asks the runner to shut the whole system down.
    pub fn stop_system(&self) {
        let _ = self.inner.event_tx.send(SystemEvent::StopSystem);
    }

    /// Stops every actor, newest first, then the cluster transport.
    pub async fn stop(&self) {
        info!("Stopping actor system on node {}.", self.node_id());
        loop {
            let last = match self.inner.actors.read() {
                Ok(registry) => registry
                    .order
                    .last()
                    .and_then(|id| registry.by_id.get(id).cloned()),
                Err(_) => None,
            };
            let Some(actor) = last else {
                break;
            };
            actor.exit();
            actor.wait_stopped().await;
        }
        if let Some(cluster) = self.cluster() {
            cluster.stop().await;
        }
        info!("Actor system on node {} stopped.", self.node_id());
    }
}

/// Long-lived task that owns system shutdown.
pub struct SystemRunner {
    system: SystemRef,
    event_rx: mpsc::UnboundedReceiver<SystemEvent>,
    token: CancellationToken,
}

impl SystemRunner {
    /// Runs until a stop event or token cancellation, then stops the system
    /// and cancels the token for every task derived from it.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                event = self.event_rx.recv() => match event {
                    Some(SystemEvent::StopSystem) | None => break,
                },
            }
        }
        self.system.stop().await;
        self.token.cancel();
    }
}
