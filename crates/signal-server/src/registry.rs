//! Process-wide connection registry.
//!
//! Maps a [`UserId`] to the handle needed to push an event to that
//! connection's outbound queue. This is the only place peer delivery
//! (`ForwardToPeer`) resolves a user id into something you can actually
//! write to.

use std::{collections::HashMap, sync::Arc};

use signal_proto::{RoomId, ServerEvent, UserId};
use tokio::sync::{mpsc, RwLock};

/// A signal routed to a session from somewhere else in the process: either
/// another session forwarding a relay payload, or the Matcher notifying the
/// dequeued (non-calling) side of a fresh pairing. Both must flow through
/// the owning session's own [`signal_core::SessionController`] rather than
/// straight onto the wire, since a `Matched` notification has to update that
/// controller's state, not just its client's screen.
#[derive(Debug, Clone, PartialEq)]
pub enum RouterSignal {
    /// This session was just paired by another caller's `find-partner`; it
    /// is never the initiator.
    Matched {
        /// The newly created room.
        room_id: RoomId,
        /// The caller that dequeued this session.
        partner: UserId,
    },
    /// Deliver this event to the session's own client, verbatim.
    Forward(ServerEvent),
}

/// A registered connection's inbound-from-router channel. Bounded: a slow
/// reader applies backpressure rather than letting the server's memory grow
/// unbounded.
pub type Outbox = mpsc::Sender<RouterSignal>;

/// Registry of live connections, keyed by user id.
///
/// Cheap to clone: internally `Arc<RwLock<_>>`, so every session task holds
/// a handle to the same map.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<HashMap<UserId, Outbox>>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbox. Overwrites any existing entry for
    /// this user id (a reconnect under the same id replaces the stale one).
    pub async fn register(&self, user: UserId, outbox: Outbox) {
        self.inner.write().await.insert(user, outbox);
    }

    /// Remove a connection's outbox. No-op if already absent.
    pub async fn unregister(&self, user: UserId) {
        self.inner.write().await.remove(&user);
    }

    /// Deliver a signal to `user`'s session, if the connection is still
    /// registered and its inbound queue isn't full. Silently drops the
    /// signal otherwise (peer gone or backpressured) - the caller decides
    /// whether that silence matters.
    pub async fn try_send(&self, user: UserId, signal: RouterSignal) -> DeliveryOutcome {
        let outbox = { self.inner.read().await.get(&user).cloned() };
        let Some(outbox) = outbox else {
            return DeliveryOutcome::NoSuchConnection;
        };
        match outbox.try_send(signal) {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => DeliveryOutcome::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => DeliveryOutcome::NoSuchConnection,
        }
    }

    /// Number of currently registered connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Snapshot of every currently registered user id, for graceful
    /// shutdown's drain pass.
    pub async fn registered_users(&self) -> Vec<UserId> {
        self.inner.read().await.keys().copied().collect()
    }
}

/// Result of attempting to deliver to a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The event was enqueued on the peer's outbox.
    Delivered,
    /// No connection is registered for that user id.
    NoSuchConnection,
    /// The connection exists but its outbox is full.
    Full,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forward() -> RouterSignal {
        RouterSignal::Forward(ServerEvent::waiting())
    }

    #[tokio::test]
    async fn delivers_to_registered_connection() {
        let registry = Registry::new();
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(UserId(1), tx).await;

        let outcome = registry.try_send(UserId(1), forward()).await;
        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn missing_connection_reports_no_such_connection() {
        let registry = Registry::new();
        let outcome = registry.try_send(UserId(1), forward()).await;
        assert_eq!(outcome, DeliveryOutcome::NoSuchConnection);
    }

    #[tokio::test]
    async fn unregister_removes_connection() {
        let registry = Registry::new();
        let (tx, _rx) = mpsc::channel(4);
        registry.register(UserId(1), tx).await;
        registry.unregister(UserId(1)).await;

        let outcome = registry.try_send(UserId(1), forward()).await;
        assert_eq!(outcome, DeliveryOutcome::NoSuchConnection);
    }

    #[tokio::test]
    async fn full_outbox_reports_full_without_panicking() {
        let registry = Registry::new();
        let (tx, _rx) = mpsc::channel(1);
        registry.register(UserId(1), tx).await;

        assert_eq!(registry.try_send(UserId(1), forward()).await, DeliveryOutcome::Delivered);
        assert_eq!(registry.try_send(UserId(1), forward()).await, DeliveryOutcome::Full);
    }
}
