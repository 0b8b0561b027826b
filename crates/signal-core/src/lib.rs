//! Pure matching/session logic for the random-pairing voice-chat signaling
//! service.
//!
//! This crate has no knowledge of WebSockets, the shared store, or any other
//! I/O. It provides:
//!
//! - [`env::Environment`]: time/randomness abstraction for deterministic
//!   tests, mirrored by `signal-server`'s production `SystemEnv`.
//! - [`session::SessionController`]: the per-connection state machine,
//!   following the Sans-IO pattern - every method takes an event and returns
//!   the actions the driver must carry out, with no I/O performed here.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod env;
pub mod error;
pub mod session;

pub use env::Environment;
pub use error::SessionError;
pub use session::{MatchOutcome, SessionAction, SessionController, SessionState};
