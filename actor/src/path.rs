// SPDX-License-Identifier: Apache-2.0

//! # Actor path
//!
//! The `path` module provides the `ActorPath` type: the location-transparent
//! address of an actor in the system. A path names a node, a top-level actor
//! on that node and, optionally, one of that actor's children.
//!

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Location-transparent actor address.
///
/// The string form is `node.actor` for a top-level actor and
/// `node.actor.child` for a child actor. A child shares its parent's
/// `actor_id` segment; it is addressed *through* the parent and never appears
/// in the system registry on its own.
///
/// Paths are immutable value types with structural equality. Whether a target
/// is in-process or on another machine is decided by a single comparison of
/// the `node_id` segment against the local node id — callers never need to
/// know where an actor actually runs.
///
/// ```ignore
/// let path: ActorPath = "node1.room.player42".parse()?;
/// assert_eq!(path.node_id(), "node1");
/// assert_eq!(path.actor_id(), "room");
/// assert!(path.is_child());
/// assert_eq!(path.parent().to_string(), "node1.room");
/// ```
#[derive(
    Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct ActorPath {
    node_id: String,
    actor_id: String,
    child_id: String,
}

impl ActorPath {
    /// Creates a top-level actor path.
    pub fn new(node_id: &str, actor_id: &str) -> Self {
        ActorPath {
            node_id: node_id.to_owned(),
            actor_id: actor_id.to_owned(),
            child_id: String::new(),
        }
    }

    /// Creates a child actor path. The child shares the parent's `actor_id`
    /// segment.
    pub fn child(node_id: &str, actor_id: &str, child_id: &str) -> Self {
        ActorPath {
            node_id: node_id.to_owned(),
            actor_id: actor_id.to_owned(),
            child_id: child_id.to_owned(),
        }
    }

    /// The node segment of this path.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// The top-level actor segment of this path.
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    /// The child segment, empty for top-level paths.
    pub fn child_id(&self) -> &str {
        &self.child_id
    }

    /// True if this path denotes a child actor. `child_id == ""` always means
    /// a top-level (parent) actor.
    pub fn is_child(&self) -> bool {
        !self.child_id.is_empty()
    }

    /// The top-level path this actor hangs off. For a top-level path this is
    /// a clone of itself.
    pub fn parent(&self) -> Self {
        ActorPath::new(&self.node_id, &self.actor_id)
    }

    /// Derives the path of a child of this actor.
    pub fn child_of(&self, child_id: &str) -> Self {
        ActorPath::child(&self.node_id, &self.actor_id, child_id)
    }
}

impl fmt::Display for ActorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.child_id.is_empty() {
            write!(f, "{}.{}", self.node_id, self.actor_id)
        } else {
            write!(f, "{}.{}.{}", self.node_id, self.actor_id, self.child_id)
        }
    }
}

impl FromStr for ActorPath {
    type Err = Error;

    /// Parses `node.actor` or `node.actor.child`. Any other shape, including
    /// empty segments, is a routing error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = s.split('.').collect();
        match segments.as_slice() {
            [node, actor] if !node.is_empty() && !actor.is_empty() => {
                Ok(ActorPath::new(node, actor))
            }
            [node, actor, child]
                if !node.is_empty() && !actor.is_empty() && !child.is_empty() =>
            {
                Ok(ActorPath::child(node, actor, child))
            }
            _ => Err(Error::Path(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn parse_top_level() {
        let path: ActorPath = "node1.room".parse().unwrap();
        assert_eq!(path.node_id(), "node1");
        assert_eq!(path.actor_id(), "room");
        assert_eq!(path.child_id(), "");
        assert!(!path.is_child());
    }

    #[test]
    fn parse_child() {
        let path: ActorPath = "node1.room.player42".parse().unwrap();
        assert_eq!(path.child_id(), "player42");
        assert!(path.is_child());
        assert_eq!(path.parent(), ActorPath::new("node1", "room"));
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["", "node1", "node1.", ".room", "a.b.c.d", "a..c", "a.b."] {
            assert!(bad.parse::<ActorPath>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn round_trip_addressing() {
        for (node, actor, child) in [
            ("node1", "room", ""),
            ("node1", "room", "player42"),
            ("gate-2", "lobby", "seat_9"),
        ] {
            let path = if child.is_empty() {
                ActorPath::new(node, actor)
            } else {
                ActorPath::child(node, actor, child)
            };
            let reparsed: ActorPath = path.to_string().parse().unwrap();
            assert_eq!(reparsed, path);
            assert_eq!(reparsed.to_string(), path.to_string());
        }
    }

    #[test]
    fn child_of_parent() {
        let parent = ActorPath::new("node1", "room");
        let child = parent.child_of("p1");
        assert_eq!(child.to_string(), "node1.room.p1");
        assert_eq!(child.parent(), parent);
    }

    #[test]
    fn serde_round_trip() {
        let path = ActorPath::child("node1", "room", "p1");
        let bytes = bincode::serialize(&path).unwrap();
        let back: ActorPath = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, path);
    }
}
