//! Sync Queue Persistence
//!
//! Rows of `sync_queue` reference a record by payload type and id. The unique
//! index on `(payload_type, record_id)` keeps at most one item per record, and
//! `leased_until` stops two drains from delivering the same item at once.

use super::{from_millis, to_millis, LocalDatabase, Result, StoreError};
use crate::shared::{PayloadType, QueueState, SyncQueueItem};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

const ITEM_COLUMNS: &str =
    "id, payload_type, record_id, attempts, created_at, state, next_attempt_at, last_error";

/// Result of an enqueue
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueOutcome {
    pub item: SyncQueueItem,
    /// False when an item for the record already existed
    pub created: bool,
}

/// Queue depth by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: u64,
    pub exhausted: u64,
    pub rejected: u64,
}

impl QueueCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.exhausted + self.rejected
    }
}

fn decode_item(row: &SqliteRow) -> Result<SyncQueueItem> {
    let id: String = row.try_get("id")?;
    let payload_type: String = row.try_get("payload_type")?;
    let state: String = row.try_get("state")?;
    let attempts: i64 = row.try_get("attempts")?;
    let next_attempt_at: Option<i64> = row.try_get("next_attempt_at")?;

    Ok(SyncQueueItem {
        id: Uuid::parse_str(&id).map_err(|e| StoreError::InvalidValue(e.to_string()))?,
        payload_type: payload_type
            .parse()
            .map_err(|e: crate::shared::SharedError| StoreError::InvalidValue(e.to_string()))?,
        record_id: row.try_get("record_id")?,
        attempts: attempts.max(0) as u32,
        created_at: from_millis(row.try_get("created_at")?)?,
        state: state
            .parse()
            .map_err(|e: crate::shared::SharedError| StoreError::InvalidValue(e.to_string()))?,
        next_attempt_at: next_attempt_at.map(from_millis).transpose()?,
        last_error: row.try_get("last_error")?,
    })
}

impl LocalDatabase {
    /// Add a queue item for a record unless one already exists.
    pub async fn enqueue(&self, payload_type: PayloadType, record_id: &str) -> Result<EnqueueOutcome> {
        let id = Uuid::new_v4();
        let result = sqlx::query(
            "INSERT INTO sync_queue (id, payload_type, record_id, attempts, created_at, state)
             VALUES (?, ?, ?, 0, ?, 'pending')
             ON CONFLICT(payload_type, record_id) DO NOTHING",
        )
        .bind(id.to_string())
        .bind(payload_type.as_str())
        .bind(record_id)
        .bind(to_millis(Utc::now()))
        .execute(&self.pool)
        .await?;

        let item = self
            .queue_item_for_record(payload_type, record_id)
            .await?
            .ok_or_else(|| StoreError::InvalidValue(format!("queue item for {} vanished", record_id)))?;

        Ok(EnqueueOutcome {
            item,
            created: result.rows_affected() == 1,
        })
    }

    pub async fn queue_item(&self, id: Uuid) -> Result<Option<SyncQueueItem>> {
        let sql = format!("SELECT {} FROM sync_queue WHERE id = ?", ITEM_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_item).transpose()
    }

    pub async fn queue_item_for_record(
        &self,
        payload_type: PayloadType,
        record_id: &str,
    ) -> Result<Option<SyncQueueItem>> {
        let sql = format!(
            "SELECT {} FROM sync_queue WHERE payload_type = ? AND record_id = ?",
            ITEM_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(payload_type.as_str())
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_item).transpose()
    }

    /// Items in the given state, oldest first
    pub async fn queue_items(&self, state: QueueState) -> Result<Vec<SyncQueueItem>> {
        let sql = format!(
            "SELECT {} FROM sync_queue WHERE state = ? ORDER BY created_at, rowid",
            ITEM_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(state.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_item).collect()
    }

    /// Pending items whose retry time has come and which nobody holds a
    /// lease on, oldest first
    pub async fn due_queue_items(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<SyncQueueItem>> {
        let now = to_millis(now);
        let sql = format!(
            "SELECT {} FROM sync_queue
             WHERE state = 'pending'
               AND (next_attempt_at IS NULL OR next_attempt_at <= ?)
               AND (leased_until IS NULL OR leased_until <= ?)
             ORDER BY created_at, rowid
             LIMIT ?",
            ITEM_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_item).collect()
    }

    /// Try to take the delivery lease on an item until `until`.
    ///
    /// Returns the item as it stands under the lease, or `None` when another
    /// drain holds a live lease, the item is waiting out a retry delay, or it
    /// is no longer pending.
    pub async fn lease_queue_item(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Option<SyncQueueItem>> {
        let now = to_millis(now);
        let sql = format!(
            "UPDATE sync_queue SET leased_until = ?
             WHERE id = ? AND state = 'pending'
               AND (next_attempt_at IS NULL OR next_attempt_at <= ?)
               AND (leased_until IS NULL OR leased_until <= ?)
             RETURNING {}",
            ITEM_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(to_millis(until))
            .bind(id.to_string())
            .bind(now)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_item).transpose()
    }

    /// Drop the lease without recording an attempt
    pub async fn release_queue_item(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE sync_queue SET leased_until = NULL WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Store the outcome of a failed attempt and release the lease
    pub async fn record_queue_failure(
        &self,
        id: Uuid,
        attempts: u32,
        state: QueueState,
        next_attempt_at: Option<DateTime<Utc>>,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sync_queue
             SET attempts = ?, state = ?, next_attempt_at = ?, last_error = ?, leased_until = NULL
             WHERE id = ?",
        )
        .bind(i64::from(attempts))
        .bind(state.as_str())
        .bind(next_attempt_at.map(to_millis))
        .bind(error)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove an item after the server acknowledged it
    pub async fn resolve_queue_item(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sync_queue WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Make an exhausted or rejected item eligible again with a fresh
    /// attempt budget. Pending items are left alone.
    pub async fn reset_queue_item(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE sync_queue
             SET attempts = 0, state = 'pending', next_attempt_at = NULL,
                 last_error = NULL, leased_until = NULL
             WHERE id = ? AND state != 'pending'",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn queue_counts(&self) -> Result<QueueCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM sync_queue GROUP BY state")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = QueueCounts::default();
        for (state, count) in rows {
            let count = count.max(0) as u64;
            match state.parse::<QueueState>() {
                Ok(QueueState::Pending) => counts.pending = count,
                Ok(QueueState::Exhausted) => counts.exhausted = count,
                Ok(QueueState::Rejected) => counts.rejected = count,
                Err(e) => tracing::warn!(error = %e, "ignoring queue rows with unknown state"),
            }
        }
        Ok(counts)
    }
}
