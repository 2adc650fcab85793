//! Trade store
//!
//! Append-only PostgreSQL record of execution events for the analytics
//! boundary. The engine's in-memory state is the source of truth; rows
//! here are an at-least-once, eventually-consistent copy. Fill events are
//! write-once: the unique fill id index turns redelivery into a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::ExecutionEvent;
use crate::error::Result;

/// A stored execution event row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredExecutionEvent {
    pub id: i64,
    pub event_type: String,
    pub account_id: String,
    pub symbol: String,
    pub order_id: Uuid,
    pub signal_id: String,
    pub fill_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TradeStore {
    pool: PgPool,
}

impl TradeStore {
    /// Create a new trade store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a trade store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Append an execution event. Returns the row id, or None when a
    /// redelivered fill hit the write-once guard.
    pub async fn append(&self, event: &ExecutionEvent) -> Result<Option<i64>> {
        let payload = serde_json::to_value(event)?;

        let row = sqlx::query(
            r#"
            INSERT INTO execution_events (
                event_type, account_id, symbol, order_id, signal_id, fill_id, payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (fill_id) WHERE fill_id IS NOT NULL DO NOTHING
            RETURNING id
            "#,
        )
        .bind(event.event_type())
        .bind(event.account_id())
        .bind(event.symbol())
        .bind(event.order_id())
        .bind(event.signal_id())
        .bind(event.fill_id())
        .bind(&payload)
        .fetch_optional(&self.pool)
        .await?;

        let id = row.map(|r| r.get::<i64, _>("id"));
        match id {
            Some(id) => debug!(
                id,
                event = event.event_type(),
                order_id = %event.order_id(),
                "execution event stored"
            ),
            None => debug!(
                order_id = %event.order_id(),
                "duplicate fill event skipped"
            ),
        }
        Ok(id)
    }

    /// All events for one order, oldest first.
    pub async fn events_for_order(&self, order_id: Uuid) -> Result<Vec<StoredExecutionEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, account_id, symbol, order_id, signal_id,
                   fill_id, payload, created_at
            FROM execution_events
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_event).collect())
    }

    /// Most recent events, newest first.
    pub async fn recent_events(&self, limit: i64) -> Result<Vec<StoredExecutionEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, account_id, symbol, order_id, signal_id,
                   fill_id, payload, created_at
            FROM execution_events
            ORDER BY id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_event).collect())
    }

    /// Signal ids that produced events since `since`, newest occurrence
    /// per id. Used to warm the deduplicator after a restart.
    pub async fn recent_signal_ids(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, DateTime<Utc>)>> {
        let rows = sqlx::query(
            r#"
            SELECT signal_id, MAX(created_at) as seen_at
            FROM execution_events
            WHERE created_at >= $1
            GROUP BY signal_id
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| (r.get("signal_id"), r.get("seen_at")))
            .collect())
    }

    /// Count stored events for an account.
    pub async fn count_for_account(&self, account_id: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM execution_events
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("count"))
    }
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> StoredExecutionEvent {
    StoredExecutionEvent {
        id: row.get("id"),
        event_type: row.get("event_type"),
        account_id: row.get("account_id"),
        symbol: row.get("symbol"),
        order_id: row.get("order_id"),
        signal_id: row.get("signal_id"),
        fill_id: row.get("fill_id"),
        payload: row.get("payload"),
        created_at: row.get("created_at"),
    }
}
