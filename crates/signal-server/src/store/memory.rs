//! In-process `SharedStore` implementation.
//!
//! Backs the dev profile and every test in this crate. Mirrors the exact
//! semantics of the Redis-keyed production store (FIFO by `(timestamp,
//! insertion order)`, TTL-less since process lifetime already bounds it)
//! without needing a running Redis instance.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex},
};

use signal_proto::{RoomId, UserId};

use super::{EnqueueOutcome, RoomRecord, SharedStore, StoreError, StoreStats};

#[derive(Default)]
struct Inner {
    /// Ordered by `(timestamp_ms, insertion_seq)` so that same-millisecond
    /// enqueues still break ties by arrival order, which a bare timestamp
    /// score cannot guarantee.
    queue: BTreeMap<(u64, u64), UserId>,
    queue_index: HashMap<UserId, (u64, u64)>,
    next_seq: u64,
    rooms: HashMap<RoomId, RoomRecord>,
    user_room: HashMap<UserId, RoomId>,
    active_rooms: HashSet<RoomId>,
    total_rooms: u64,
}

/// In-memory `SharedStore`. Cheap to clone; clones share the same state via
/// an internal `Arc<Mutex<_>>`.
#[derive(Clone, Default)]
pub struct MemoryStore(Arc<Mutex<Inner>>);

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::unwrap_used)] // intra-process mutex; poisoning means a prior panic, unrecoverable anyway
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.0.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl SharedStore for MemoryStore {
    async fn enqueue(&self, user: UserId, now_millis: u64) -> Result<EnqueueOutcome, StoreError> {
        let mut inner = self.lock();

        if inner.user_room.contains_key(&user) {
            return Ok(EnqueueOutcome::AlreadyInRoom);
        }
        if inner.queue_index.contains_key(&user) {
            return Ok(EnqueueOutcome::AlreadyQueued);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let key = (now_millis, seq);
        inner.queue.insert(key, user);
        inner.queue_index.insert(user, key);

        Ok(EnqueueOutcome::Enqueued { position: inner.queue.len() as u64 })
    }

    async fn is_queued(&self, user: UserId) -> Result<bool, StoreError> {
        Ok(self.lock().queue_index.contains_key(&user))
    }

    async fn dequeue_oldest(&self) -> Result<Option<(UserId, u64)>, StoreError> {
        let mut inner = self.lock();
        let Some((&(timestamp, seq), &user)) = inner.queue.iter().next() else {
            return Ok(None);
        };
        inner.queue.remove(&(timestamp, seq));
        inner.queue_index.remove(&user);
        Ok(Some((user, timestamp)))
    }

    async fn remove_from_queue(&self, user: UserId) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(key) = inner.queue_index.remove(&user) else {
            return Ok(false);
        };
        inner.queue.remove(&key);
        Ok(true)
    }

    async fn put_room(&self, room: &RoomRecord) -> Result<(), StoreError> {
        self.lock().rooms.insert(room.room_id, room.clone());
        Ok(())
    }

    async fn get_room(&self, room_id: RoomId) -> Result<Option<RoomRecord>, StoreError> {
        Ok(self.lock().rooms.get(&room_id).cloned())
    }

    async fn delete_room(&self, room_id: RoomId) -> Result<bool, StoreError> {
        Ok(self.lock().rooms.remove(&room_id).is_some())
    }

    async fn put_user_room(&self, user: UserId, room_id: RoomId) -> Result<(), StoreError> {
        self.lock().user_room.insert(user, room_id);
        Ok(())
    }

    async fn get_user_room(&self, user: UserId) -> Result<Option<RoomId>, StoreError> {
        Ok(self.lock().user_room.get(&user).copied())
    }

    async fn delete_user_room(&self, user: UserId) -> Result<bool, StoreError> {
        Ok(self.lock().user_room.remove(&user).is_some())
    }

    async fn add_active_room(&self, room_id: RoomId) -> Result<(), StoreError> {
        self.lock().active_rooms.insert(room_id);
        Ok(())
    }

    async fn remove_active_room(&self, room_id: RoomId) -> Result<(), StoreError> {
        self.lock().active_rooms.remove(&room_id);
        Ok(())
    }

    async fn increment_total_rooms(&self) -> Result<(), StoreError> {
        self.lock().total_rooms += 1;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let inner = self.lock();
        Ok(StoreStats {
            active_rooms: inner.active_rooms.len() as u64,
            queue_size: inner.queue.len() as u64,
            total_rooms: inner.total_rooms,
        })
    }
}
