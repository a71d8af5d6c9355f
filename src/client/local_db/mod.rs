//! # Local Database Module
//!
//! Durable on-device storage for the field client. Every piece of persisted
//! state (cached jobs, time logs, media, parts usage and the sync queue) lives
//! here; other components only hold record identifiers.
//!
//! ## Architecture
//!
//! - **Record tables**: `jobs`, `time_logs`, `media`, `parts_usage`, accessed
//!   through the generic [`Record`] contract (`put`, `get`, `get_all`, `delete`)
//! - **Sync queue**: `sync_queue`, with idempotent enqueue and per-item leases
//! - **HTTP cache**: `http_cache`, used by the caching strategy engine
//! - **Metadata**: `sync_metadata` key/value pairs (last sync time)
//!
//! ## Key Components
//!
//! - `LocalDatabase`: connection pool, schema migrations, quota accounting
//! - `schema.rs`: versioned migrations
//! - `records.rs`: the generic record contract and per-record bindings
//! - `sync_queue.rs`: queue persistence
//! - `media.rs`: media retention
//! - `http_cache.rs`: cached responses for the caching strategy engine
//!
//! ## Degraded mode
//!
//! If the on-disk database cannot be opened, [`LocalDatabase::open_or_degrade`]
//! falls back to an in-memory database. Nothing survives a restart in that
//! mode and the client delivers every record immediately.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fieldops::client::local_db::{IndexQuery, LocalDatabase};
//! use fieldops::shared::TimeLog;
//!
//! # async fn example() -> Result<(), fieldops::client::local_db::StoreError> {
//! let db = LocalDatabase::open_or_degrade(&LocalDatabase::default_path()).await?;
//! let logs: Vec<TimeLog> = db.get_all(IndexQuery::ByJob("JOB-1".into())).await?;
//! # Ok(())
//! # }
//! ```

pub mod http_cache;
pub mod media;
pub mod records;
pub mod schema;
pub mod sync_queue;

pub use records::{IndexQuery, Record, Table};
pub use http_cache::CachedResponse;
pub use sync_queue::{EnqueueOutcome, QueueCounts};

use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Local store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("local store unavailable: {0}")]
    Unavailable(String),
    #[error("local store failed integrity check: {0}")]
    Corrupt(String),
    #[error("storage quota exceeded: {used} bytes used, {requested} requested, quota {quota}")]
    QuotaExceeded { used: u64, requested: u64, quota: u64 },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid stored value: {0}")]
    InvalidValue(String),
}

/// Result type for local database operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Whether the store survives a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// On-disk database
    Durable,
    /// In-memory fallback after the on-disk database failed to open
    Ephemeral,
}

/// Local database connection manager
///
/// Cheap to clone; clones share the same pool.
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
    mode: StorageMode,
}

impl LocalDatabase {
    /// Open or create the on-disk database at `path` and bring its schema up
    /// to date. Fails if the file cannot be opened or is corrupt.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let db = Self {
            pool,
            mode: StorageMode::Durable,
        };
        db.check_integrity().await?;
        db.init_schema().await?;

        tracing::info!(path = %path.display(), "opened local database");
        Ok(db)
    }

    /// Open a fresh in-memory database.
    ///
    /// The pool holds exactly one connection for its whole lifetime; a second
    /// connection would see a different, empty database.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let db = Self {
            pool,
            mode: StorageMode::Ephemeral,
        };
        db.init_schema().await?;
        Ok(db)
    }

    /// Open the on-disk database, degrading to an in-memory store when it
    /// cannot be opened. Only fails if even the in-memory store is unusable.
    pub async fn open_or_degrade(path: &Path) -> Result<Self> {
        match Self::open(path).await {
            Ok(db) => Ok(db),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "local database unavailable, continuing without durable storage"
                );
                Self::open_in_memory().await
            }
        }
    }

    /// Get database file path
    ///
    /// Returns the platform-specific path for the local database file.
    pub fn default_path() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("fieldops");
        path.push("field.db");
        path
    }

    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    pub fn is_durable(&self) -> bool {
        self.mode == StorageMode::Durable
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every connection. Later operations fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn check_integrity(&self) -> Result<()> {
        let (result,): (String,) = sqlx::query_as("PRAGMA quick_check")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        if result != "ok" {
            return Err(StoreError::Corrupt(result));
        }
        Ok(())
    }

    /// Initialize database schema
    ///
    /// Creates the migrations table and applies any pending migrations.
    async fn init_schema(&self) -> Result<()> {
        self.migrate_to(schema::CURRENT_SCHEMA_VERSION).await
    }

    async fn migrate_to(&self, target: i32) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let current = self.schema_version().await?;
        if !schema::needs_migration(current) {
            return Ok(());
        }

        for (version, statements) in schema::get_pending_migrations(current) {
            if version > target {
                break;
            }
            let mut tx = self.pool.begin().await?;
            for statement in statements {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(Utc::now().to_rfc3339())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            tracing::info!(version, "applied local schema migration");
        }

        Ok(())
    }

    /// Highest applied schema version, 0 for a new database
    pub async fn schema_version(&self) -> Result<i32> {
        let (version,): (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;
        Ok(version)
    }

    /// Get database statistics
    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let mut counts = [0u64; 4];
        for (slot, table) in counts.iter_mut().zip(Table::ALL) {
            let sql = format!("SELECT COUNT(*) FROM {}", table.name());
            let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
            *slot = count as u64;
        }

        let (unsynced,): (i64,) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM time_logs WHERE synced = 0)
                  + (SELECT COUNT(*) FROM media WHERE synced = 0)
                  + (SELECT COUNT(*) FROM parts_usage WHERE synced = 0)",
        )
        .fetch_one(&self.pool)
        .await?;

        let (queued,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&self.pool)
            .await?;

        Ok(DatabaseStats {
            job_count: counts[0],
            time_log_count: counts[1],
            media_count: counts[2],
            parts_usage_count: counts[3],
            unsynced_records: unsynced as u64,
            queued_items: queued as u64,
            usage_bytes: self.usage_bytes().await?,
        })
    }

    /// Bytes taken by stored records, media payloads and cached responses
    pub async fn usage_bytes(&self) -> Result<u64> {
        let (bytes,): (i64,) = sqlx::query_as(
            "SELECT
                (SELECT COALESCE(SUM(LENGTH(data) + COALESCE(LENGTH(blob), 0)), 0) FROM jobs)
              + (SELECT COALESCE(SUM(LENGTH(data) + COALESCE(LENGTH(blob), 0)), 0) FROM time_logs)
              + (SELECT COALESCE(SUM(LENGTH(data) + COALESCE(LENGTH(blob), 0)), 0) FROM media)
              + (SELECT COALESCE(SUM(LENGTH(data) + COALESCE(LENGTH(blob), 0)), 0) FROM parts_usage)
              + (SELECT COALESCE(SUM(LENGTH(body)), 0) FROM http_cache)",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(bytes.max(0) as u64)
    }

    /// Fail with [`StoreError::QuotaExceeded`] if writing `requested` more
    /// bytes would go over `quota`.
    pub async fn ensure_capacity(&self, requested: u64, quota: u64) -> Result<()> {
        let used = self.usage_bytes().await?;
        if used.saturating_add(requested) > quota {
            return Err(StoreError::QuotaExceeded {
                used,
                requested,
                quota,
            });
        }
        Ok(())
    }

    /// Set sync metadata
    pub async fn set_sync_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_metadata (key, value, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get sync metadata
    pub async fn get_sync_metadata(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM sync_metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    /// Get last successful sync timestamp
    pub async fn get_last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        match self.get_sync_metadata("last_sync_time").await? {
            Some(value) => DateTime::parse_from_rfc3339(&value)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(|e| StoreError::InvalidValue(e.to_string())),
            None => Ok(None),
        }
    }

    /// Set last successful sync timestamp
    pub async fn set_last_sync_time(&self, at: DateTime<Utc>) -> Result<()> {
        self.set_sync_metadata("last_sync_time", &at.to_rfc3339()).await
    }
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::InvalidValue(format!("timestamp out of range: {}", millis)))
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    pub job_count: u64,
    pub time_log_count: u64,
    pub media_count: u64,
    pub parts_usage_count: u64,
    /// Records not yet acknowledged by the server
    pub unsynced_records: u64,
    /// Items in the sync queue, whatever their state
    pub queued_items: u64,
    pub usage_bytes: u64,
}
