//! Wire protocol types for the random-pairing voice-chat signaling service.
//!
//! This crate has no knowledge of transport, storage, or the state machines
//! that produce and consume these messages; it is purely the shared vocabulary
//! between client and server.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod event;
mod ids;

pub use event::{ClientEvent, IceServer, ServerEvent};
pub use ids::{RoomId, UserId};
