// SPDX-License-Identifier: Apache-2.0

//! # Message envelope
//!
//! Every mailbox item is a [`Message`]: the function name to invoke, the
//! argument payload, correlation metadata, and the reply route. The same
//! envelope carries in-process calls (typed payload, oneshot reply) and
//! cluster calls (encoded payload, transport reply handle).
//!

use chrono::Utc;
use tokio::sync::oneshot;

use std::any::Any;
use std::fmt;

use crate::{ActorPath, ClusterReply, Error};

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Argument or reply carried by a [`Message`].
///
/// In-process traffic uses `Value` and moves the argument by ownership with
/// no encoding; cluster traffic uses `Bytes` and the configured
/// [`crate::Serializer`].
#[derive(Default)]
pub enum Payload {
    /// Nothing attached.
    #[default]
    None,
    /// Typed in-process payload, downcast at the receiving mailbox.
    Value(Box<dyn Any + Send>),
    /// Wire-encoded payload from or for the cluster.
    Bytes(Vec<u8>),
}

impl Payload {
    /// Wraps a typed in-process value.
    pub fn value<T: Send + 'static>(value: T) -> Self {
        Payload::Value(Box::new(value))
    }

    /// True when nothing is attached.
    pub fn is_none(&self) -> bool {
        matches!(self, Payload::None)
    }

    /// Recovers a typed in-process value, consuming the payload.
    pub fn downcast<T: 'static>(self) -> Option<T> {
        match self {
            Payload::Value(boxed) => boxed.downcast::<T>().ok().map(|v| *v),
            _ => None,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::None => write!(f, "Payload::None"),
            Payload::Value(_) => write!(f, "Payload::Value(..)"),
            Payload::Bytes(bytes) => {
                write!(f, "Payload::Bytes({} bytes)", bytes.len())
            }
        }
    }
}

/// Result of one mailbox invocation, delivered to a waiting caller.
#[derive(Debug, Default)]
pub struct Response {
    /// Status code, `0` for success.
    pub code: i32,
    /// Reply payload in the same representation the call used.
    pub data: Payload,
}

impl Response {
    /// A bare status code with no payload.
    pub fn code(code: i32) -> Self {
        Response {
            code,
            data: Payload::None,
        }
    }
}

/// One unit of mailbox work.
pub struct Message {
    /// Creation time, milliseconds since the epoch.
    pub build_time: i64,
    /// Enqueue time, stamped when the message is handed to a queue.
    pub post_time: i64,
    /// Path string of the sender, possibly empty.
    pub source: String,
    /// Path string of the receiver.
    pub target: String,
    /// Registered function to invoke.
    pub func_name: String,
    /// Caller-defined correlation id.
    pub session: i64,
    /// Argument payload.
    pub args: Payload,
    /// True when the message arrived through the cluster transport; the
    /// reply, if any, must be wire-encoded.
    pub is_cluster: bool,
    /// Reply route for cluster-originated requests.
    pub cluster_reply: Option<Box<dyn ClusterReply>>,
    /// Reply route for in-process waiting calls.
    pub chan_result: Option<oneshot::Sender<Response>>,

    target_path: Option<ActorPath>,
}

impl Message {
    /// A fresh envelope addressed to `target`.
    pub fn new(source: &str, target: &str, func_name: &str, session: i64) -> Self {
        Message {
            build_time: now_millis(),
            post_time: 0,
            source: source.to_owned(),
            target: target.to_owned(),
            func_name: func_name.to_owned(),
            session,
            args: Payload::None,
            is_cluster: false,
            cluster_reply: None,
            chan_result: None,
            target_path: None,
        }
    }

    /// Parses and caches the structured target path.
    pub fn target_path(&mut self) -> Result<&ActorPath, Error> {
        if self.target_path.is_none() {
            self.target_path = Some(self.target.parse()?);
        }
        match &self.target_path {
            Some(path) => Ok(path),
            None => Err(Error::Path(self.target.clone())),
        }
    }

    /// Takes the argument payload, leaving `None` behind.
    pub fn take_args(&mut self) -> Payload {
        std::mem::take(&mut self.args)
    }

    /// Stamps the enqueue time.
    pub fn stamp_posted(&mut self) {
        self.post_time = now_millis();
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("func_name", &self.func_name)
            .field("session", &self.session)
            .field("args", &self.args)
            .field("is_cluster", &self.is_cluster)
            .field("has_cluster_reply", &self.cluster_reply.is_some())
            .field("has_chan_result", &self.chan_result.is_some())
            .finish()
    }
}
