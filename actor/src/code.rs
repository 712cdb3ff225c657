// SPDX-License-Identifier: Apache-2.0

//! # Status codes
//!
//! Every RPC-path outcome is communicated as a plain `i32` status code rather
//! than an error value crossing the actor boundary: codes are cheap to carry
//! across the cluster transport and uniform for in-process and remote calls.
//! `0` is success; anything else satisfies [`is_fail`].
//!

/// Success.
pub const OK: i32 = 0;

// Addressing errors.

/// The target path string was empty.
pub const ACTOR_TARGET_PATH_IS_NIL: i32 = 1001;
/// The function name was empty.
pub const ACTOR_FUNC_NAME_ERROR: i32 = 1002;
/// The target string did not parse as `node.actor[.child]`.
pub const ACTOR_CONVERT_PATH_ERROR: i32 = 1003;
/// `call_wait` with `source == target` is rejected before any enqueue.
pub const ACTOR_SOURCE_EQUAL_TARGET: i32 = 1004;
/// No actor with the target id is registered on this node.
pub const ACTOR_NOT_FOUND: i32 = 1005;

// Delivery errors.

/// The message could not be enqueued or the reply channel was dropped.
pub const ACTOR_CALL_FAIL: i32 = 1006;
/// The cluster transport refused or failed the publish.
pub const ACTOR_PUBLISH_REMOTE_ERROR: i32 = 1007;
/// A waiting call did not complete within the configured timeout.
pub const ACTOR_CALL_TIMEOUT: i32 = 1008;

// Serialization errors.

/// Marshalling the outbound argument failed.
pub const ACTOR_MARSHAL_ERROR: i32 = 1009;
/// The reply payload did not match the caller's expected type.
pub const ACTOR_UNMARSHAL_ERROR: i32 = 1010;

// Remote execution errors.

/// Marshalling the handler's reply for the cluster failed.
pub const RPC_MARSHAL_ERROR: i32 = 1101;
/// Unmarshalling the request payload on the handler side failed.
pub const RPC_UNMARSHAL_ERROR: i32 = 1102;
/// The remote node reported a transport-level execution failure.
pub const RPC_REMOTE_EXECUTE_ERROR: i32 = 1103;
/// The handler invocation panicked; the message was dropped.
pub const RPC_HANDLER_ERROR: i32 = 1104;
/// No function with the requested name is registered on the target mailbox.
pub const RPC_NOT_IMPLEMENT: i32 = 1105;

/// True for every non-success code.
pub fn is_fail(code: i32) -> bool {
    code != OK
}

/// True only for [`OK`].
pub fn is_ok(code: i32) -> bool {
    code == OK
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn ok_is_not_fail() {
        assert!(is_ok(OK));
        assert!(!is_fail(OK));
        assert!(is_fail(ACTOR_NOT_FOUND));
        assert!(is_fail(RPC_NOT_IMPLEMENT));
    }
}
