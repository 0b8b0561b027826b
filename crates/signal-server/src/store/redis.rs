//! Redis-backed `SharedStore` - the production Shared State Store adapter.
//!
//! Key shapes: `queue:waiting` is a sorted set scored by enqueue timestamp,
//! `rooms:active` is a plain set, and
//! `room:data:<roomId>` / `user:room:<userId>` are TTL'd strings so a
//! crashed server doesn't pin rooms open forever.

use std::time::Duration;

use redis::{aio::ConnectionManager, AsyncCommands};
use signal_proto::{RoomId, UserId};

use super::{EnqueueOutcome, RoomRecord, SharedStore, StoreError, StoreStats};

const ROOM_TTL_SECS: u64 = 3600;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const OP_TIMEOUT: Duration = Duration::from_secs(5);

const QUEUE_KEY: &str = "queue:waiting";
const ROOMS_ACTIVE_KEY: &str = "rooms:active";
const STATS_KEY: &str = "stats:global";

fn room_data_key(room_id: RoomId) -> String {
    format!("room:data:{room_id}")
}

fn user_room_key(user: UserId) -> String {
    format!("user:room:{user}")
}

async fn with_timeout<T>(
    fut: impl std::future::Future<Output = redis::RedisResult<T>>,
) -> Result<T, StoreError> {
    tokio::time::timeout(OP_TIMEOUT, fut).await.map_err(|_| StoreError::Timeout)?.map_err(|e| StoreError::Connection(e.to_string()))
}

/// Redis-backed store. Cheap to clone: [`ConnectionManager`] is itself a
/// handle that multiplexes over a single reconnecting connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to `redis_url`, failing fast if the initial handshake takes
    /// longer than the 2s connect budget.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = tokio::time::timeout(CONNECT_TIMEOUT, client.get_connection_manager())
            .await
            .map_err(|_| StoreError::Timeout)?
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait::async_trait]
impl SharedStore for RedisStore {
    async fn enqueue(&self, user: UserId, now_millis: u64) -> Result<EnqueueOutcome, StoreError> {
        let mut conn = self.conn.clone();

        let already_in_room: bool =
            with_timeout(conn.exists(user_room_key(user))).await?;
        if already_in_room {
            return Ok(EnqueueOutcome::AlreadyInRoom);
        }

        // `ZADD ... NX` only inserts if the member is absent; the plain
        // `zadd`/`zadd_multiple` helpers on `AsyncCommands` always overwrite,
        // so the `NX` option form is reached through the raw command builder.
        let added: i64 = with_timeout(
            redis::cmd("ZADD")
                .arg(QUEUE_KEY)
                .arg("NX")
                .arg(now_millis as f64)
                .arg(user.to_string())
                .query_async(&mut conn),
        )
        .await?;
        if added == 0 {
            return Ok(EnqueueOutcome::AlreadyQueued);
        }

        let position: i64 = with_timeout(conn.zcard(QUEUE_KEY)).await?;
        Ok(EnqueueOutcome::Enqueued { position: position.max(0) as u64 })
    }

    async fn is_queued(&self, user: UserId) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let score: Option<f64> = with_timeout(conn.zscore(QUEUE_KEY, user.to_string())).await?;
        Ok(score.is_some())
    }

    async fn dequeue_oldest(&self) -> Result<Option<(UserId, u64)>, StoreError> {
        let mut conn = self.conn.clone();
        let popped: Vec<(String, f64)> = with_timeout(conn.zpopmin(QUEUE_KEY, 1)).await?;
        let Some((member, score)) = popped.into_iter().next() else {
            return Ok(None);
        };
        let user = member
            .parse::<u64>()
            .map(UserId)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Some((user, score as u64)))
    }

    async fn remove_from_queue(&self, user: UserId) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = with_timeout(conn.zrem(QUEUE_KEY, user.to_string())).await?;
        Ok(removed > 0)
    }

    async fn put_room(&self, room: &RoomRecord) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let payload =
            serde_json::to_string(room).map_err(|e| StoreError::Serialization(e.to_string()))?;
        with_timeout(conn.set_ex(room_data_key(room.room_id), payload, ROOM_TTL_SECS)).await
    }

    async fn get_room(&self, room_id: RoomId) -> Result<Option<RoomRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = with_timeout(conn.get(room_data_key(room_id))).await?;
        raw.map(|s| serde_json::from_str(&s).map_err(|e| StoreError::Serialization(e.to_string())))
            .transpose()
    }

    async fn delete_room(&self, room_id: RoomId) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = with_timeout(conn.del(room_data_key(room_id))).await?;
        Ok(removed > 0)
    }

    async fn put_user_room(&self, user: UserId, room_id: RoomId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        with_timeout(conn.set_ex(user_room_key(user), room_id.to_string(), ROOM_TTL_SECS)).await
    }

    async fn get_user_room(&self, user: UserId) -> Result<Option<RoomId>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = with_timeout(conn.get(user_room_key(user))).await?;
        raw.map(|s| s.parse().map_err(|e: uuid::Error| StoreError::Serialization(e.to_string())))
            .transpose()
    }

    async fn delete_user_room(&self, user: UserId) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = with_timeout(conn.del(user_room_key(user))).await?;
        Ok(removed > 0)
    }

    async fn add_active_room(&self, room_id: RoomId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        with_timeout(conn.sadd(ROOMS_ACTIVE_KEY, room_id.to_string())).await
    }

    async fn remove_active_room(&self, room_id: RoomId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        with_timeout(conn.srem(ROOMS_ACTIVE_KEY, room_id.to_string())).await
    }

    async fn increment_total_rooms(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        with_timeout(conn.hincr(STATS_KEY, "totalRooms", 1_i64)).await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let mut conn = self.conn.clone();
        let active_rooms: i64 = with_timeout(conn.scard(ROOMS_ACTIVE_KEY)).await?;
        let queue_size: i64 = with_timeout(conn.zcard(QUEUE_KEY)).await?;
        let total_rooms: Option<i64> = with_timeout(conn.hget(STATS_KEY, "totalRooms")).await?;
        Ok(StoreStats {
            active_rooms: active_rooms.max(0) as u64,
            queue_size: queue_size.max(0) as u64,
            total_rooms: total_rooms.unwrap_or(0).max(0) as u64,
        })
    }
}
