// SPDX-License-Identifier: Apache-2.0

//! # Actor runner
//!
//! One runner per actor, one tokio task per runner. The loop multiplexes the
//! four mailbox queues and the close signal; user code only ever runs inside
//! this loop, which is what makes actor state single-writer.
//!
//! A close request does not abort work: the runner stops accepting the close
//! branch, drains the local, remote and event queues to empty, stops its
//! children, and only then runs `on_stop` and deregisters.
//!

use futures::FutureExt;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{atomic::AtomicI64, Arc, RwLock};

use crate::actor::{ActorCell, ActorRef, ActorState, ChildRegistry};
use crate::cluster::ResponsePacket;
use crate::event::EventData;
use crate::message::{now_millis, Message, Payload, Response};
use crate::queue::{queue, QueueReceiver};
use crate::system::SystemRef;
use crate::timer::TimerId;
use crate::{code, ActorContext, ActorHandler, ActorPath, Error};

enum Work {
    Close,
    Local(Message),
    Remote(Message),
    Event(Arc<dyn EventData>),
    Timer(TimerId),
}

pub(crate) struct ActorRunner<H: ActorHandler> {
    handler: H,
    ctx: ActorContext<H>,
    local_rx: QueueReceiver<Message>,
    remote_rx: QueueReceiver<Message>,
    event_rx: QueueReceiver<Arc<dyn EventData>>,
    timer_rx: QueueReceiver<TimerId>,
    state_tx: watch::Sender<ActorState>,
    token: CancellationToken,
    parent: Option<ChildRegistry>,
}

impl<H: ActorHandler> ActorRunner<H> {
    /// Builds a runner and the [`ActorRef`] other tasks will hold. `parent`
    /// is the owning actor's child registry, `None` for top-level actors.
    pub(crate) fn create(
        system: SystemRef,
        path: ActorPath,
        handler: H,
        parent: Option<ChildRegistry>,
    ) -> (Self, ActorRef) {
        let (local_tx, local_rx) = queue();
        let (remote_tx, remote_rx) = queue();
        let (event_tx, event_rx) = queue();
        let (timer_tx, timer_rx) = queue();
        let (state_tx, state_rx) = watch::channel(ActorState::Init);
        let token = CancellationToken::new();

        let actor_ref = ActorRef::new(ActorCell {
            path,
            alias: handler.alias_id().to_owned(),
            local_tx,
            remote_tx,
            event_tx,
            timer_tx,
            token: token.clone(),
            state_rx,
            event_names: Arc::new(RwLock::new(HashSet::new())),
            children: ChildRegistry::new(),
            last_at: AtomicI64::new(now_millis()),
        });
        let ctx = ActorContext::new(system, actor_ref.clone());

        let runner = ActorRunner {
            handler,
            ctx,
            local_rx,
            remote_rx,
            event_rx,
            timer_rx,
            state_tx,
            token,
            parent,
        };
        (runner, actor_ref)
    }

    /// Runs the actor to completion. `ready` reports the outcome of
    /// `on_init` to a caller waiting on actor creation.
    pub(crate) async fn run(
        mut self,
        ready: Option<oneshot::Sender<Result<(), Error>>>,
    ) {
        debug!("Starting actor {}.", self.ctx.path());
        let init = AssertUnwindSafe(self.handler.on_init(&mut self.ctx))
            .catch_unwind()
            .await;
        let init = match init {
            Ok(result) => result,
            Err(_) => Err(Error::Start(self.ctx.path().to_string())),
        };
        if let Err(err) = init {
            error!("Actor {} failed to start: {}.", self.ctx.path(), err);
            if let Some(ready) = ready {
                let _ = ready.send(Err(err));
            }
            self.shutdown(false).await;
            return;
        }
        if let Some(ready) = ready {
            let _ = ready.send(Ok(()));
        }
        let _ = self.state_tx.send(ActorState::Working);

        let mut closing = false;
        loop {
            if closing
                && self.local_rx.is_empty()
                && self.remote_rx.is_empty()
                && self.event_rx.is_empty()
            {
                break;
            }
            let work = tokio::select! {
                _ = self.token.cancelled(), if !closing => Work::Close,
                Some(msg) = self.local_rx.pop() => Work::Local(msg),
                Some(msg) = self.remote_rx.pop() => Work::Remote(msg),
                Some(event) = self.event_rx.pop() => Work::Event(event),
                Some(id) = self.timer_rx.pop() => Work::Timer(id),
            };
            match work {
                Work::Close => closing = true,
                Work::Local(msg) => self.handle_message(msg, false).await,
                Work::Remote(msg) => self.handle_message(msg, true).await,
                Work::Event(event) => self.handle_event(event),
                Work::Timer(id) => self.handle_timer(id),
            }
            self.ctx.actor_ref().touch(now_millis());
        }
        self.shutdown(true).await;
    }

    /// Local and remote messages share one pipeline: received hook, child
    /// routing, then invocation on this actor.
    async fn handle_message(&mut self, mut msg: Message, remote: bool) {
        let hook = if remote {
            AssertUnwindSafe(
                self.handler.on_remote_received(&mut self.ctx, &mut msg),
            )
            .catch_unwind()
            .await
        } else {
            AssertUnwindSafe(
                self.handler.on_local_received(&mut self.ctx, &mut msg),
            )
            .catch_unwind()
            .await
        };
        let dispatch = match hook {
            Ok(dispatch) => dispatch,
            Err(_) => {
                error!(
                    "Received hook of actor {} panicked on '{}'.",
                    self.ctx.path(),
                    msg.func_name
                );
                fail_message(msg, code::RPC_HANDLER_ERROR);
                return;
            }
        };

        let child_id = match msg.target_path() {
            Ok(path) => path.child_id().to_owned(),
            Err(_) => {
                fail_message(msg, code::ACTOR_CONVERT_PATH_ERROR);
                return;
            }
        };
        let route_to_child = !child_id.is_empty() && !self.ctx.path().is_child();
        if route_to_child {
            if !dispatch.next {
                fail_message(msg, code::ACTOR_CALL_FAIL);
                return;
            }
            self.route_to_child(msg, &child_id, remote).await;
            return;
        }
        if !dispatch.invoke {
            fail_message(msg, code::ACTOR_CALL_FAIL);
            return;
        }
        self.invoke(msg);
    }

    async fn route_to_child(&mut self, msg: Message, child_id: &str, remote: bool) {
        let child = match self.ctx.get_child(child_id) {
            Some(child) => Some(child),
            None => {
                let found = AssertUnwindSafe(
                    self.handler.on_find_child(&mut self.ctx, child_id),
                )
                .catch_unwind()
                .await;
                match found {
                    Ok(child) => child,
                    Err(_) => {
                        error!(
                            "Find-child hook of actor {} panicked for '{}'.",
                            self.ctx.path(),
                            child_id
                        );
                        None
                    }
                }
            }
        };
        let Some(child) = child else {
            fail_message(msg, code::ACTOR_NOT_FOUND);
            return;
        };
        let pushed = if remote {
            child.push_remote(msg)
        } else {
            child.push_local(msg)
        };
        if let Err(Error::Send(_) | Error::QueueClosed) = pushed {
            warn!(
                "Actor {} dropped a message for stopping child '{}'.",
                self.ctx.path(),
                child_id
            );
        }
    }

    fn invoke(&mut self, mut msg: Message) {
        let Some(func) = self.ctx.mail_fn(&msg.func_name) else {
            fail_message(msg, code::RPC_NOT_IMPLEMENT);
            return;
        };
        let invoked = catch_unwind(AssertUnwindSafe(|| {
            func(&mut self.handler, &mut self.ctx, &mut msg)
        }));
        match invoked {
            Ok(invoked) => reply(msg, invoked.code, invoked.reply),
            Err(_) => {
                error!(
                    "Function '{}' of actor {} panicked.",
                    msg.func_name,
                    self.ctx.path()
                );
                fail_message(msg, code::RPC_HANDLER_ERROR);
            }
        }
    }

    fn handle_event(&mut self, event: Arc<dyn EventData>) {
        let Some(func) = self.ctx.event_fn(event.name()) else {
            return;
        };
        let invoked = catch_unwind(AssertUnwindSafe(|| {
            func(&mut self.handler, &mut self.ctx, &event)
        }));
        if invoked.is_err() {
            error!(
                "Event handler '{}' of actor {} panicked.",
                event.name(),
                self.ctx.path()
            );
        }
    }

    fn handle_timer(&mut self, id: TimerId) {
        let Some(func) = self.ctx.take_timer(id) else {
            // Removed after the wheel had already fired it.
            return;
        };
        let invoked = catch_unwind(AssertUnwindSafe(|| {
            func(&mut self.handler, &mut self.ctx)
        }));
        if invoked.is_err() {
            error!("Timer callback of actor {} panicked.", self.ctx.path());
        }
    }

    /// Stops children newest first, runs `on_stop`, then deregisters and
    /// fails whatever slipped into the queues after draining.
    async fn shutdown(mut self, run_on_stop: bool) {
        let _ = self.state_tx.send(ActorState::Stopping);
        self.token.cancel();

        for child in self.ctx.actor_ref().children().snapshot_reverse() {
            child.exit();
            child.wait_stopped().await;
        }

        if run_on_stop {
            let stopped = AssertUnwindSafe(self.handler.on_stop(&mut self.ctx))
                .catch_unwind()
                .await;
            if stopped.is_err() {
                error!("Stop hook of actor {} panicked.", self.ctx.path());
            }
        }
        self.ctx.clear_timers();

        let path = self.ctx.path().clone();
        match &self.parent {
            Some(registry) => registry.remove(path.child_id()),
            None => self.ctx.system().remove_actor(&path).await,
        }

        self.local_rx.close();
        self.remote_rx.close();
        self.event_rx.close();
        self.timer_rx.close();
        while let Some(msg) = self.local_rx.try_pop() {
            fail_message(msg, code::ACTOR_CALL_FAIL);
        }
        while let Some(msg) = self.remote_rx.try_pop() {
            fail_message(msg, code::ACTOR_CALL_FAIL);
        }

        let _ = self.state_tx.send(ActorState::Stopped);
        debug!("Actor {} stopped.", path);
    }
}

/// Routes an invocation result back to whoever is waiting, if anyone.
fn reply(mut msg: Message, result: i32, payload: Payload) {
    if let Some(cluster_reply) = msg.cluster_reply.take() {
        let data = match payload {
            Payload::Bytes(bytes) => bytes,
            _ => Vec::new(),
        };
        if let Err(err) = cluster_reply.respond(ResponsePacket { code: result, data })
        {
            warn!(
                "Reply for '{}' could not reach the cluster: {}.",
                msg.func_name, err
            );
        }
        return;
    }
    if let Some(chan_result) = msg.chan_result.take() {
        // A closed channel means the caller timed out; nothing to do.
        let _ = chan_result.send(Response {
            code: result,
            data: payload,
        });
    }
}

/// Answers a message that will never be invoked with a bare failure code,
/// which is also handed back for the poster's own result.
pub(crate) fn fail_message(msg: Message, result: i32) -> i32 {
    debug!(
        "Message '{}' for {} failed with code {}.",
        msg.func_name, msg.target, result
    );
    reply(msg, result, Payload::None);
    result
}
