//! Analytics Store (AS) adapter - durable, best-effort audit of room
//! lifecycle. Never allowed to block or fail signaling: every write here is
//! fire-and-forget.

use signal_proto::{RoomId, UserId};
use tracing::warn;

/// Room-lifecycle audit sink. Methods are synchronous from the caller's
/// point of view - implementations spawn their own detached task and
/// swallow failures (logged, never surfaced).
pub trait AnalyticsSink: Clone + Send + Sync + 'static {
    /// Record that a room was opened.
    fn record_room_opened(&self, room_id: RoomId, user_a: UserId, user_b: UserId);
    /// Record that a room was closed.
    fn record_room_closed(&self, room_id: RoomId);
}

/// No-op sink: the default when `AS_ENABLED` is unset or false.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAnalytics;

impl AnalyticsSink for NullAnalytics {
    fn record_room_opened(&self, _room_id: RoomId, _user_a: UserId, _user_b: UserId) {}
    fn record_room_closed(&self, _room_id: RoomId) {}
}

/// Postgres-backed sink via `sqlx`. Every call spawns a detached task
/// against the shared pool; a failure is logged at `warn` and otherwise
/// has no visible effect on signaling.
#[derive(Clone)]
pub struct PostgresAnalytics {
    pool: sqlx::PgPool,
}

impl PostgresAnalytics {
    /// Connect to `database_url`, eagerly, failing the caller if Postgres
    /// can't be reached at startup (contrast with per-write fire-and-forget
    /// failures afterwards, which are swallowed).
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = sqlx::postgres::PgPoolOptions::new().max_connections(5).connect(database_url).await?;
        Ok(Self { pool })
    }
}

impl AnalyticsSink for PostgresAnalytics {
    fn record_room_opened(&self, room_id: RoomId, user_a: UserId, user_b: UserId) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let result = sqlx::query(
                "INSERT INTO rooms (id, user1, user2, status, created_at) \
                 VALUES ($1, $2, $3, 'active', now())",
            )
            .bind(room_id.as_u128().to_string())
            .bind(user_a.0.to_string())
            .bind(user_b.0.to_string())
            .execute(&pool)
            .await;

            if let Err(err) = result {
                warn!(%room_id, error = %err, "analytics: failed to record room open");
            }
        });
    }

    fn record_room_closed(&self, room_id: RoomId) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let result = sqlx::query(
                "UPDATE rooms SET status = 'closed', closed_at = now() WHERE id = $1",
            )
            .bind(room_id.as_u128().to_string())
            .execute(&pool)
            .await;

            if let Err(err) = result {
                warn!(%room_id, error = %err, "analytics: failed to record room close");
            }
        });
    }
}

/// Runtime sink selection, mirroring [`crate::store::AnyStore`]: `main`
/// picks one concrete value at startup (`AS_ENABLED`), the Matcher stays
/// generic over `A: AnalyticsSink`.
#[derive(Clone)]
pub enum AnySink {
    /// `AS_ENABLED=false` or unset: the default.
    Null(NullAnalytics),
    /// `AS_ENABLED=true`: durable audit via Postgres.
    Postgres(PostgresAnalytics),
}

impl AnalyticsSink for AnySink {
    fn record_room_opened(&self, room_id: RoomId, user_a: UserId, user_b: UserId) {
        match self {
            Self::Null(s) => s.record_room_opened(room_id, user_a, user_b),
            Self::Postgres(s) => s.record_room_opened(room_id, user_a, user_b),
        }
    }

    fn record_room_closed(&self, room_id: RoomId) {
        match self {
            Self::Null(s) => s.record_room_closed(room_id),
            Self::Postgres(s) => s.record_room_closed(room_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_analytics_is_a_true_no_op() {
        let sink = NullAnalytics;
        sink.record_room_opened(RoomId::from_u128(1), UserId(1), UserId(2));
        sink.record_room_closed(RoomId::from_u128(1));
    }
}
