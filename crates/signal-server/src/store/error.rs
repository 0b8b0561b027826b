//! Errors from the Shared State Store adapter.

/// A store-level failure. All variants are treated as the "shared-store
/// transient failure" error kind: the calling Matcher operation fails, a
/// generic error is reported to the client, and no partial local state is
/// left behind.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store did not respond within the configured timeout (2s connect
    /// / 5s per-operation).
    #[error("store operation timed out")]
    Timeout,

    /// Underlying connection or transport failure talking to the store.
    #[error("store connection error: {0}")]
    Connection(String),

    /// The store returned data that didn't deserialize into the expected
    /// shape (a corrupted or foreign-written key).
    #[error("store payload error: {0}")]
    Serialization(String),
}
