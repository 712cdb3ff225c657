// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!
//! Construction-time and infrastructure faults. Anything that happens on the
//! RPC path is reported as a status code from [`crate::code`] instead; the
//! variants here surface eagerly, at `register`/`create` time, or from the
//! pluggable transport/serializer boundary.
//!

use crate::ActorPath;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the actor runtime.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// A message could not be handed to an actor's queue.
    #[error("An error occurred while sending a message to actor: {0}.")]
    Send(String),
    /// A path string did not parse as `node.actor[.child]`.
    #[error("Malformed actor path: {0}.")]
    Path(String),
    /// An actor with the same id is already registered.
    #[error("Actor {0} already exists.")]
    Exists(ActorPath),
    /// No actor with the given id is registered on this node.
    #[error("Actor {0} not found.")]
    NotFound(String),
    /// Only a top-level actor may own children.
    #[error("A child actor cannot create its own children: {0}.")]
    ForbiddenCreateChildActor(ActorPath),
    /// A mailbox function with the same name is already registered.
    #[error("Function '{0}' is already registered.")]
    DuplicateFunc(String),
    /// An empty function name was supplied at registration.
    #[error("Function name is empty.")]
    FuncName,
    /// An empty actor or child id was supplied at creation.
    #[error("Actor id is empty.")]
    ActorId,
    /// The actor's `on_init` hook failed or panicked.
    #[error("An error occurred while starting actor {0}.")]
    Start(String),
    /// Push after the queue was destroyed.
    #[error("Queue is closed.")]
    QueueClosed,
    /// Serializer failure on the outbound path.
    #[error("Marshal error: {0}.")]
    Marshal(String),
    /// Serializer failure on the inbound path.
    #[error("Unmarshal error: {0}.")]
    Unmarshal(String),
    /// Cluster transport failure.
    #[error("Cluster transport error: {0}.")]
    Cluster(String),
    /// A schedule produced no next fire time.
    #[error("Schedule yields no next fire time.")]
    Schedule,
    /// Error that does not compromise the operation of the system.
    #[error("Error: {0}")]
    Functional(String),
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn display_carries_context() {
        let err = Error::DuplicateFunc("join".to_owned());
        assert!(err.to_string().contains("join"));
        let err = Error::Path("a..b".to_owned());
        assert!(err.to_string().contains("a..b"));
    }

    #[test]
    fn serde_round_trip() {
        let err = Error::ForbiddenCreateChildActor(ActorPath::child(
            "node1", "room", "p1",
        ));
        let bytes = bincode::serialize(&err).unwrap();
        let back: Error = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, err);
    }
}
