//! The Matcher: queue and room registry atop a [`SharedStore`].
//!
//! Stateless with respect to the controller - every bit of durable state
//! lives in the store, not in a local `HashMap`. A `Matcher` clone is cheap
//! (it just clones the store handle and the analytics sink) and is handed
//! to every session task.

use signal_core::Environment;
use signal_proto::{RoomId, UserId};

use crate::{
    analytics::AnalyticsSink,
    store::{EnqueueOutcome, RoomRecord, RoomStatus, SharedStore, StoreError},
};

/// Outcome of [`Matcher::find_partner`]'s pairing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    /// No waiting partner; the caller is now queued.
    Enqueued {
        /// 1-based queue position after enqueue.
        position: u64,
    },
    /// A room was created; `partner` is the dequeued, non-initiator side.
    Matched {
        /// Newly created room.
        room_id: RoomId,
        /// The peer the caller was paired with.
        partner: UserId,
    },
}

/// Errors surfaced by Matcher operations.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// The caller is already queued (protocol misuse).
    #[error("already queued")]
    AlreadyQueued,
    /// The caller is already a room participant (protocol misuse).
    #[error("already in a chat")]
    AlreadyInRoom,
    /// `userId` asked about a room it is not a participant of.
    #[error("not a participant of this room")]
    NotAParticipant,
    /// The shared store failed: timeout, connection loss, or a corrupted
    /// payload. No partial state is left behind.
    #[error("shared state store failure: {0}")]
    Store(#[from] StoreError),
}

/// Aggregate counters exposed by `Stats()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    /// Rooms currently open.
    pub active_rooms: u64,
    /// Clients currently waiting.
    pub queue_size: u64,
    /// Rooms ever created, monotonic.
    pub total_rooms: u64,
}

/// Queue + room registry operations atop a [`SharedStore`].
#[derive(Clone)]
pub struct Matcher<S, A> {
    store: S,
    analytics: A,
}

impl<S: SharedStore, A: AnalyticsSink> Matcher<S, A> {
    /// Build a Matcher over the given store and analytics sink.
    pub fn new(store: S, analytics: A) -> Self {
        Self { store, analytics }
    }

    /// Run the full pairing algorithm for `caller`. Caller must not already
    /// be queued or paired; checked here, not assumed by the store layer.
    pub async fn find_partner<E: Environment>(
        &self,
        caller: UserId,
        env: &E,
    ) -> Result<PairingOutcome, MatchError> {
        if self.store.get_user_room(caller).await?.is_some() {
            return Err(MatchError::AlreadyInRoom);
        }
        if self.store.is_queued(caller).await? {
            return Err(MatchError::AlreadyQueued);
        }

        let now_millis = env.wall_clock_millis();

        let Some((partner, partner_enqueued_at)) = self.store.dequeue_oldest().await? else {
            return self.enqueue_caller(caller, now_millis).await;
        };

        if partner == caller {
            // Transient consequence of a reconnect under the same id: put
            // the caller right back and wait for someone else.
            return self.enqueue_caller(caller, now_millis).await;
        }

        match self.create_room(caller, partner, env).await {
            Ok(room_id) => Ok(PairingOutcome::Matched { room_id, partner }),
            Err(err) => {
                // Roll back: re-enqueue both, caller first, partner with its
                // original timestamp as closely as possible.
                let _ = self.store.enqueue(partner, partner_enqueued_at).await;
                let _ = self.store.enqueue(caller, now_millis).await;
                Err(err)
            },
        }
    }

    async fn enqueue_caller(
        &self,
        caller: UserId,
        now_millis: u64,
    ) -> Result<PairingOutcome, MatchError> {
        match self.store.enqueue(caller, now_millis).await? {
            EnqueueOutcome::Enqueued { position } => Ok(PairingOutcome::Enqueued { position }),
            EnqueueOutcome::AlreadyQueued => Err(MatchError::AlreadyQueued),
            EnqueueOutcome::AlreadyInRoom => Err(MatchError::AlreadyInRoom),
        }
    }

    async fn create_room<E: Environment>(
        &self,
        caller: UserId,
        partner: UserId,
        env: &E,
    ) -> Result<RoomId, MatchError> {
        let room_id = RoomId::from_u128(env.random_u128());
        let room = RoomRecord {
            room_id,
            users: [caller, partner],
            created_at_millis: env.wall_clock_millis(),
            status: RoomStatus::Active,
        };

        if let Err(err) = self.write_room(&room).await {
            self.teardown_partial_room(room_id, caller, partner).await;
            return Err(err.into());
        }

        self.analytics.record_room_opened(room_id, caller, partner);
        Ok(room_id)
    }

    async fn write_room(&self, room: &RoomRecord) -> Result<(), StoreError> {
        self.store.put_room(room).await?;
        self.store.put_user_room(room.users[0], room.room_id).await?;
        self.store.put_user_room(room.users[1], room.room_id).await?;
        self.store.add_active_room(room.room_id).await?;
        self.store.increment_total_rooms().await?;
        Ok(())
    }

    async fn teardown_partial_room(&self, room_id: RoomId, a: UserId, b: UserId) {
        let _ = self.store.delete_room(room_id).await;
        let _ = self.store.delete_user_room(a).await;
        let _ = self.store.delete_user_room(b).await;
        let _ = self.store.remove_active_room(room_id).await;
    }

    /// `RemoveFromQueue`. Idempotent.
    pub async fn remove_from_queue(&self, user: UserId) -> Result<bool, MatchError> {
        Ok(self.store.remove_from_queue(user).await?)
    }

    /// `GetRoom`.
    pub async fn get_room(&self, room_id: RoomId) -> Result<Option<RoomRecord>, MatchError> {
        Ok(self.store.get_room(room_id).await?)
    }

    /// `GetRoomByUser`.
    pub async fn get_room_by_user(&self, user: UserId) -> Result<Option<RoomRecord>, MatchError> {
        let Some(room_id) = self.store.get_user_room(user).await? else {
            return Ok(None);
        };
        Ok(self.store.get_room(room_id).await?)
    }

    /// `GetPeer`. `Ok(None)` models the "peer gone" case; `Err(NotAParticipant)`
    /// means `user` itself isn't in this room.
    pub async fn get_peer(
        &self,
        room_id: RoomId,
        user: UserId,
    ) -> Result<Option<UserId>, MatchError> {
        let Some(room) = self.store.get_room(room_id).await? else {
            return Ok(None);
        };
        room.peer_of(user).map(Some).ok_or(MatchError::NotAParticipant)
    }

    /// `CloseRoom`. Idempotent: the second call on the same id returns
    /// `false` without error.
    pub async fn close_room(&self, room_id: RoomId) -> Result<bool, MatchError> {
        let Some(room) = self.store.get_room(room_id).await? else {
            return Ok(false);
        };

        let deleted = self.store.delete_room(room_id).await?;
        for user in room.users {
            let _ = self.store.delete_user_room(user).await;
        }
        self.store.remove_active_room(room_id).await?;

        if deleted {
            self.analytics.record_room_closed(room_id);
        }
        Ok(deleted)
    }

    /// `Stats()`.
    pub async fn stats(&self) -> Result<Stats, MatchError> {
        let stats = self.store.stats().await?;
        Ok(Stats {
            active_rooms: stats.active_rooms,
            queue_size: stats.queue_size,
            total_rooms: stats.total_rooms,
        })
    }
}
