//! The Shared State Store (SSS) contract.
//!
//! The Matcher is "stateless with respect to the controller": every bit of
//! queue and room state lives behind this trait, not in an in-process
//! `HashMap`. Each method here maps to one (or a small, fixed number of)
//! atomic single-key SSS primitive calls - no multi-key transactions are
//! assumed; the store need only provide atomic single-key operations.
//!
//! Two implementations exist: [`memory::MemoryStore`] (in-process, used by
//! tests and [`AnyStore::Memory`]) and [`redis::RedisStore`] (production,
//! talking to the exact key shapes documented on each method below).

mod error;
mod memory;
mod redis;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use redis::RedisStore;
use signal_proto::{RoomId, UserId};

/// A room record as persisted at `room:data:<roomId>`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RoomRecord {
    /// This room's id, duplicated into the payload for lookups that only
    /// have the serialized record in hand.
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
    /// The unordered pair of participants.
    pub users: [UserId; 2],
    /// Creation time, ms since the Unix epoch.
    #[serde(rename = "createdAt")]
    pub created_at_millis: u64,
    /// Always `"active"` while the key exists - closing a room deletes the
    /// key outright rather than flipping this field.
    pub status: RoomStatus,
}

impl RoomRecord {
    /// The other participant, given one of the two. `None` if `user` is not
    /// actually a participant of this room.
    #[must_use]
    pub fn peer_of(&self, user: UserId) -> Option<UserId> {
        match self.users {
            [a, b] if a == user => Some(b),
            [a, b] if b == user => Some(a),
            _ => None,
        }
    }
}

/// Lifecycle status embedded in a room's stored payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// The room exists and has a live key in the store.
    Active,
}

/// Result of an `Enqueue` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The user was added to the queue.
    Enqueued {
        /// 1-based queue size immediately after this enqueue.
        position: u64,
    },
    /// The user was already queued; no change made.
    AlreadyQueued,
    /// The user is already a room participant; no change made.
    AlreadyInRoom,
}

/// Aggregate counters for `Stats()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// Number of rooms currently in `rooms:active`.
    pub active_rooms: u64,
    /// Number of entries currently in `queue:waiting`.
    pub queue_size: u64,
    /// Monotonically increasing count of rooms ever created.
    pub total_rooms: u64,
}

/// Shared State Store primitives, one method per key shape the store owns.
///
/// Implementations must be cheap to clone (e.g. an `Arc`-backed connection
/// pool or handle) since a clone is handed to every connection's Matcher.
#[async_trait::async_trait]
pub trait SharedStore: Clone + Send + Sync + 'static {
    /// `ZADD queue:waiting <timestamp_ms> <userId>`, after checking the user
    /// is not already queued or in a room.
    async fn enqueue(&self, user: UserId, now_millis: u64) -> Result<EnqueueOutcome, StoreError>;

    /// `ZSCORE queue:waiting <userId>` (existence check only): is `user`
    /// currently a member of the waiting queue?
    async fn is_queued(&self, user: UserId) -> Result<bool, StoreError>;

    /// `ZPOPMIN queue:waiting` - atomically remove and return the
    /// lowest-score (oldest) entry, along with its enqueue timestamp.
    async fn dequeue_oldest(&self) -> Result<Option<(UserId, u64)>, StoreError>;

    /// `ZREM queue:waiting <userId>`. Idempotent: returns `false` if the
    /// user was not present.
    async fn remove_from_queue(&self, user: UserId) -> Result<bool, StoreError>;

    /// `SET room:data:<roomId> EX 3600`.
    async fn put_room(&self, room: &RoomRecord) -> Result<(), StoreError>;

    /// `GET room:data:<roomId>`.
    async fn get_room(&self, room_id: RoomId) -> Result<Option<RoomRecord>, StoreError>;

    /// `DEL room:data:<roomId>`. Idempotent: returns `false` if absent.
    async fn delete_room(&self, room_id: RoomId) -> Result<bool, StoreError>;

    /// `SET user:room:<userId> <roomId> EX 3600`.
    async fn put_user_room(&self, user: UserId, room_id: RoomId) -> Result<(), StoreError>;

    /// `GET user:room:<userId>`.
    async fn get_user_room(&self, user: UserId) -> Result<Option<RoomId>, StoreError>;

    /// `DEL user:room:<userId>`. Idempotent: returns `false` if absent.
    async fn delete_user_room(&self, user: UserId) -> Result<bool, StoreError>;

    /// `SADD rooms:active <roomId>`.
    async fn add_active_room(&self, room_id: RoomId) -> Result<(), StoreError>;

    /// `SREM rooms:active <roomId>`.
    async fn remove_active_room(&self, room_id: RoomId) -> Result<(), StoreError>;

    /// `HINCRBY stats:global totalRooms 1`.
    async fn increment_total_rooms(&self) -> Result<(), StoreError>;

    /// Read `{activeRooms, queueSize, totalRooms}` for `Stats()`.
    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

/// Runtime store selection: either backend implements [`SharedStore`] by
/// delegating to the chosen variant, so the rest of the server (Matcher,
/// session tasks) stays generic over `S: SharedStore` while `main` only
/// has to pick one concrete value at startup.
#[derive(Clone)]
pub enum AnyStore {
    /// In-process store - used for the dev profile and for tests.
    Memory(MemoryStore),
    /// Redis-backed store - the production backend.
    Redis(RedisStore),
}

#[async_trait::async_trait]
impl SharedStore for AnyStore {
    async fn enqueue(&self, user: UserId, now_millis: u64) -> Result<EnqueueOutcome, StoreError> {
        match self {
            Self::Memory(s) => s.enqueue(user, now_millis).await,
            Self::Redis(s) => s.enqueue(user, now_millis).await,
        }
    }

    async fn is_queued(&self, user: UserId) -> Result<bool, StoreError> {
        match self {
            Self::Memory(s) => s.is_queued(user).await,
            Self::Redis(s) => s.is_queued(user).await,
        }
    }

    async fn dequeue_oldest(&self) -> Result<Option<(UserId, u64)>, StoreError> {
        match self {
            Self::Memory(s) => s.dequeue_oldest().await,
            Self::Redis(s) => s.dequeue_oldest().await,
        }
    }

    async fn remove_from_queue(&self, user: UserId) -> Result<bool, StoreError> {
        match self {
            Self::Memory(s) => s.remove_from_queue(user).await,
            Self::Redis(s) => s.remove_from_queue(user).await,
        }
    }

    async fn put_room(&self, room: &RoomRecord) -> Result<(), StoreError> {
        match self {
            Self::Memory(s) => s.put_room(room).await,
            Self::Redis(s) => s.put_room(room).await,
        }
    }

    async fn get_room(&self, room_id: RoomId) -> Result<Option<RoomRecord>, StoreError> {
        match self {
            Self::Memory(s) => s.get_room(room_id).await,
            Self::Redis(s) => s.get_room(room_id).await,
        }
    }

    async fn delete_room(&self, room_id: RoomId) -> Result<bool, StoreError> {
        match self {
            Self::Memory(s) => s.delete_room(room_id).await,
            Self::Redis(s) => s.delete_room(room_id).await,
        }
    }

    async fn put_user_room(&self, user: UserId, room_id: RoomId) -> Result<(), StoreError> {
        match self {
            Self::Memory(s) => s.put_user_room(user, room_id).await,
            Self::Redis(s) => s.put_user_room(user, room_id).await,
        }
    }

    async fn get_user_room(&self, user: UserId) -> Result<Option<RoomId>, StoreError> {
        match self {
            Self::Memory(s) => s.get_user_room(user).await,
            Self::Redis(s) => s.get_user_room(user).await,
        }
    }

    async fn delete_user_room(&self, user: UserId) -> Result<bool, StoreError> {
        match self {
            Self::Memory(s) => s.delete_user_room(user).await,
            Self::Redis(s) => s.delete_user_room(user).await,
        }
    }

    async fn add_active_room(&self, room_id: RoomId) -> Result<(), StoreError> {
        match self {
            Self::Memory(s) => s.add_active_room(room_id).await,
            Self::Redis(s) => s.add_active_room(room_id).await,
        }
    }

    async fn remove_active_room(&self, room_id: RoomId) -> Result<(), StoreError> {
        match self {
            Self::Memory(s) => s.remove_active_room(room_id).await,
            Self::Redis(s) => s.remove_active_room(room_id).await,
        }
    }

    async fn increment_total_rooms(&self) -> Result<(), StoreError> {
        match self {
            Self::Memory(s) => s.increment_total_rooms().await,
            Self::Redis(s) => s.increment_total_rooms().await,
        }
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        match self {
            Self::Memory(s) => s.stats().await,
            Self::Redis(s) => s.stats().await,
        }
    }
}
