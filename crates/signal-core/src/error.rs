//! Errors raised by the pure session state machine.
//!
//! These cover protocol-level mistakes only (wrong state, stale room id);
//! they never wrap I/O failures, since [`crate::session::SessionController`]
//! performs no I/O itself. The driver that owns a [`SessionController`]
//! surfaces these as an `error` event to the offending client and leaves
//! state unchanged, matching the "client-protocol error" kind in the
//! service's error-handling design.

use signal_proto::RoomId;

/// A session-level protocol error.
///
/// State-incompatible actions that aren't a relay (`skip-partner` while
/// idle, `find-partner` while paired, ...) are not modeled as errors here:
/// [`crate::session::SessionController`] handles those inline by returning a
/// benign [`crate::session::SessionAction::Send`] of an `error` event rather
/// than failing the transition, since the session's own state is still
/// valid and nothing needs to be rolled back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// A relayed message (`offer`/`answer`/`ice-candidate`) named a room id
    /// that does not match the session's current room.
    #[error("roomId {given} does not match active room {actual}")]
    RoomMismatch {
        /// Room id the client supplied.
        given: RoomId,
        /// Room id the session is actually paired in.
        actual: RoomId,
    },

    /// A relayed message named a room id while the session is not paired at
    /// all.
    #[error("not currently in a chat")]
    NotPaired,
}
