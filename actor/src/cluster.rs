// SPDX-License-Identifier: Apache-2.0

//! # Cluster boundary
//!
//! The actor core never talks to a broker or a discovery backend directly; it
//! depends only on the contracts in this module. Concrete transports (NATS,
//! etcd, in-process loopbacks in tests) live outside the crate and feed
//! inbound packets back through [`crate::SystemRef::cluster_post_local`] and
//! [`crate::SystemRef::cluster_post_remote`].
//!

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use std::time::Duration;

use crate::Error;

/// A message crossing the node boundary. The argument payload is already
/// encoded with the sender's configured [`crate::Serializer`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RemotePacket {
    /// Path string of the calling actor, possibly empty.
    pub source: String,
    /// Path string of the target actor.
    pub target: String,
    /// Registered function to invoke on the target mailbox.
    pub func_name: String,
    /// Caller-defined correlation id carried through untouched.
    pub session: i64,
    /// Encoded argument.
    pub payload: Vec<u8>,
}

/// The reply half of a cluster request/response exchange.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponsePacket {
    /// Status code, `0` for success.
    pub code: i32,
    /// Encoded reply payload, empty when the handler returned none.
    pub data: Vec<u8>,
}

/// Pluggable cluster transport consumed by the actor core.
///
/// `publish_local`/`publish_remote` mirror the two mailboxes of the target
/// actor; `request_remote` is the synchronous request/response primitive
/// behind cross-node `call_wait`.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Connects the transport.
    async fn init(&self) -> Result<(), Error>;

    /// Fire-and-forget delivery into the target node's local mailbox path.
    async fn publish_local(&self, node_id: &str, packet: Vec<u8>) -> Result<(), Error>;

    /// Fire-and-forget delivery into the target node's remote mailbox path.
    async fn publish_remote(&self, node_id: &str, packet: Vec<u8>) -> Result<(), Error>;

    /// Synchronous request/response against the target node.
    async fn request_remote(
        &self,
        node_id: &str,
        packet: Vec<u8>,
        timeout: Duration,
    ) -> Result<ResponsePacket, Error>;

    /// Tears the transport down.
    async fn stop(&self);
}

/// Pluggable node discovery. Resolution happens above the actor core (for
/// example in network-facing parsers); `call`/`call_wait` take an already
/// resolved path and never consult discovery themselves.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn init(&self) -> Result<(), Error>;

    /// Resolves a node id to its address and node type.
    async fn resolve(&self, node_id: &str) -> Option<NodeInfo>;

    async fn stop(&self);
}

/// Address record returned by [`Discovery`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: String,
    pub address: String,
    pub kind: String,
}

/// Reply handle attached to a cluster-originated request. The invoke layer
/// answers through this instead of the in-process oneshot channel.
pub trait ClusterReply: Send {
    /// Sends the response back over the transport that carried the request.
    fn respond(self: Box<Self>, packet: ResponsePacket) -> Result<(), Error>;
}
