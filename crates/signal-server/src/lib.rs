//! Random-pairing voice-chat signaling server.
//!
//! This crate is the I/O-touching half of the service: the Matcher (queue +
//! room registry atop a Shared State Store), the Router (in-process
//! connection registry), the Transport Gateway (WebSocket accept loop and
//! per-connection driver), the Shared State Store and Analytics Store
//! adapters, and configuration/startup glue. The pure matching/session
//! logic itself lives in `signal-core`; this crate supplies the I/O that
//! drives it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod analytics;
pub mod config;
pub mod error;
pub mod gateway;
pub mod matcher;
pub mod registry;
pub mod store;
pub mod system_env;

pub use analytics::{AnalyticsSink, AnySink, NullAnalytics, PostgresAnalytics};
pub use config::Args;
pub use error::ServerError;
pub use gateway::Gateway;
pub use matcher::{MatchError, Matcher, PairingOutcome, Stats};
pub use registry::Registry;
pub use store::{AnyStore, MemoryStore, RedisStore, SharedStore};
pub use system_env::SystemEnv;
