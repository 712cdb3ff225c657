// SPDX-License-Identifier: Apache-2.0

//! # Actor runtime
//!
//! An actor runtime for distributed game-server style backends. Every actor
//! owns its state on a dedicated tokio task and talks to the world through
//! queues: a local mailbox for in-process traffic, a remote mailbox for
//! cluster traffic, an event queue for broadcast notifications and a timer
//! queue fed by a shared timing wheel. Since only the owning task ever
//! touches actor state, handlers are written without locks.
//!
//! Actors are addressed by path (`node.actor` or `node.actor.child`) and
//! invoked by registered function name, either fire-and-forget
//! ([`SystemRef::call`]) or blocking for a typed reply
//! ([`SystemRef::call_wait`]). The same calls work across nodes once a
//! [`Cluster`] transport is installed; payloads are then wire-encoded with
//! the configured [`Serializer`].
//!
//! ```
//! use actor::{code, ActorContext, ActorHandler, ActorSystem, Error, Settings};
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Counter {
//!     hits: u64,
//! }
//!
//! #[async_trait]
//! impl ActorHandler for Counter {
//!     async fn on_init(
//!         &mut self,
//!         ctx: &mut ActorContext<Self>,
//!     ) -> Result<(), Error> {
//!         ctx.register_remote(
//!             "hit",
//!             |state: &mut Counter, _ctx: &mut ActorContext<Counter>, n: u64| {
//!                 state.hits += n;
//!                 (code::OK, Some(state.hits))
//!             },
//!         )
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let token = CancellationToken::new();
//!     let (system, runner) = ActorSystem::create(Settings::default(), token);
//!     tokio::spawn(runner.run());
//!
//!     system
//!         .create_actor("counter", Counter { hits: 0 })
//!         .await
//!         .unwrap();
//!     let (result, total) = system
//!         .call_wait::<u64, u64>("", "node.counter", "hit", 0, 3)
//!         .await;
//!     assert_eq!(result, code::OK);
//!     assert_eq!(total, Some(3));
//!
//!     system.stop().await;
//! }
//! ```

mod actor;
mod cluster;
pub mod code;
mod error;
mod event;
mod mailbox;
mod message;
mod path;
mod queue;
mod runner;
mod serializer;
mod system;
mod timer;

pub use actor::{ActorContext, ActorHandler, ActorRef, ActorState, Dispatch};
pub use cluster::{
    Cluster, ClusterReply, Discovery, NodeInfo, RemotePacket, ResponsePacket,
};
pub use error::Error;
pub use event::EventData;
pub use message::{Message, Payload, Response};
pub use path::ActorPath;
pub use serializer::Serializer;
pub use system::{
    ActorSystem, Settings, SystemEvent, SystemRef, SystemRunner,
};
pub use timer::{
    DailySchedule, HourlySchedule, IntervalSchedule, Scheduler, TimerId,
};
