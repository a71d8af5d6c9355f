//! Record Operations
//!
//! The store contract shared by every record table: `put`, `get`, `get_all`
//! and `delete`, each a single statement. The table and the indexed columns
//! come from the record type through [`Record`].

use super::{to_millis, LocalDatabase, Result, StoreError};
use crate::shared::{Job, Media, PartsUsage, TimeLog};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

/// Record tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Jobs,
    TimeLogs,
    Media,
    PartsUsage,
}

impl Table {
    pub const ALL: [Table; 4] = [Table::Jobs, Table::TimeLogs, Table::Media, Table::PartsUsage];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Jobs => "jobs",
            Table::TimeLogs => "time_logs",
            Table::Media => "media",
            Table::PartsUsage => "parts_usage",
        }
    }
}

/// Index used by [`LocalDatabase::get_all`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexQuery {
    All,
    ByJob(String),
    BySynced(bool),
    ByStatus(String),
}

/// A value stored in one of the record tables.
///
/// The JSON form of the record goes in the `data` column; the accessor
/// methods fill the indexed columns next to it.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + Unpin {
    const TABLE: Table;

    /// Primary key
    fn key(&self) -> String;

    /// Creation time, used for ordering
    fn created_at(&self) -> DateTime<Utc>;

    fn job_ref(&self) -> Option<&str> {
        None
    }

    fn status_index(&self) -> Option<String> {
        None
    }

    fn synced_flag(&self) -> Option<bool> {
        None
    }

    /// Binary payload stored outside the JSON body
    fn blob(&self) -> Option<&[u8]> {
        None
    }

    /// Restore the binary payload after loading
    fn attach_blob(&mut self, _blob: Vec<u8>) {}
}

impl Record for Job {
    const TABLE: Table = Table::Jobs;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    fn status_index(&self) -> Option<String> {
        Some(self.status.as_str().to_string())
    }
}

impl Record for TimeLog {
    const TABLE: Table = Table::TimeLogs;

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn job_ref(&self) -> Option<&str> {
        Some(&self.job_id)
    }

    fn status_index(&self) -> Option<String> {
        Some(self.action.as_str().to_string())
    }

    fn synced_flag(&self) -> Option<bool> {
        Some(self.synced)
    }
}

impl Record for Media {
    const TABLE: Table = Table::Media;

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    fn job_ref(&self) -> Option<&str> {
        Some(&self.job_id)
    }

    fn synced_flag(&self) -> Option<bool> {
        Some(self.synced)
    }

    fn blob(&self) -> Option<&[u8]> {
        if self.payload.is_empty() {
            None
        } else {
            Some(&self.payload)
        }
    }

    fn attach_blob(&mut self, blob: Vec<u8>) {
        self.payload = blob;
    }
}

impl Record for PartsUsage {
    const TABLE: Table = Table::PartsUsage;

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn job_ref(&self) -> Option<&str> {
        Some(&self.job_id)
    }

    fn synced_flag(&self) -> Option<bool> {
        Some(self.synced)
    }
}

async fn upsert<'e, R, E>(executor: E, record: &R) -> Result<()>
where
    R: Record,
    E: Executor<'e, Database = Sqlite>,
{
    let data = serde_json::to_string(record)?;
    let sql = format!(
        "INSERT INTO {} (id, job_id, status, synced, created_at, data, blob)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            job_id = excluded.job_id,
            status = excluded.status,
            synced = excluded.synced,
            created_at = excluded.created_at,
            data = excluded.data,
            blob = excluded.blob",
        R::TABLE.name()
    );

    sqlx::query(&sql)
        .bind(record.key())
        .bind(record.job_ref())
        .bind(record.status_index())
        .bind(record.synced_flag())
        .bind(to_millis(record.created_at()))
        .bind(data)
        .bind(record.blob())
        .execute(executor)
        .await?;
    Ok(())
}

fn decode<R: Record>(row: &SqliteRow) -> Result<R> {
    let data: String = row.try_get("data")?;
    let mut record: R = serde_json::from_str(&data)?;
    let blob: Option<Vec<u8>> = row.try_get("blob")?;
    if let Some(blob) = blob {
        record.attach_blob(blob);
    }
    Ok(record)
}

impl LocalDatabase {
    /// Insert or replace a record
    pub async fn put<R: Record>(&self, record: &R) -> Result<()> {
        upsert(&self.pool, record).await
    }

    /// Get a record by key
    pub async fn get<R: Record>(&self, key: &str) -> Result<Option<R>> {
        let sql = format!("SELECT data, blob FROM {} WHERE id = ?", R::TABLE.name());
        let row = sqlx::query(&sql).bind(key).fetch_optional(&self.pool).await?;
        row.as_ref().map(decode::<R>).transpose()
    }

    /// Get all records matching an index, oldest first
    pub async fn get_all<R: Record>(&self, query: IndexQuery) -> Result<Vec<R>> {
        let table = R::TABLE.name();
        let rows = match &query {
            IndexQuery::All => {
                let sql = format!("SELECT data, blob FROM {} ORDER BY created_at, rowid", table);
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
            IndexQuery::ByJob(job_id) => {
                let sql = format!(
                    "SELECT data, blob FROM {} WHERE job_id = ? ORDER BY created_at, rowid",
                    table
                );
                sqlx::query(&sql).bind(job_id).fetch_all(&self.pool).await?
            }
            IndexQuery::BySynced(synced) => {
                let sql = format!(
                    "SELECT data, blob FROM {} WHERE synced = ? ORDER BY created_at, rowid",
                    table
                );
                sqlx::query(&sql).bind(*synced).fetch_all(&self.pool).await?
            }
            IndexQuery::ByStatus(status) => {
                let sql = format!(
                    "SELECT data, blob FROM {} WHERE status = ? ORDER BY created_at, rowid",
                    table
                );
                sqlx::query(&sql).bind(status).fetch_all(&self.pool).await?
            }
        };

        rows.iter().map(decode::<R>).collect()
    }

    /// Delete a record by key. Returns whether a row was removed.
    pub async fn delete<R: Record>(&self, key: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", R::TABLE.name());
        let result = sqlx::query(&sql).bind(key).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set individual fields of a stored record in one statement, leaving the
    /// rest of its body and its binary payload as they are in the table.
    ///
    /// A `synced` field also updates the indexed column. Returns false when
    /// no record has the key.
    pub async fn patch_fields<R: Record>(&self, key: &str, fields: &[(&str, Value)]) -> Result<bool> {
        if fields.is_empty() {
            return Ok(true);
        }
        if let Some((name, _)) = fields
            .iter()
            .find(|(name, _)| name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        {
            return Err(StoreError::InvalidValue(format!("bad field name '{}'", name)));
        }

        let paths: Vec<String> = fields
            .iter()
            .map(|(name, _)| format!("'$.{}', json(?)", name))
            .collect();
        let synced = fields
            .iter()
            .find(|(name, _)| *name == "synced")
            .and_then(|(_, value)| value.as_bool());
        let sql = format!(
            "UPDATE {} SET data = json_set(data, {}){} WHERE id = ?",
            R::TABLE.name(),
            paths.join(", "),
            if synced.is_some() { ", synced = ?" } else { "" }
        );

        let mut query = sqlx::query(&sql);
        for (_, value) in fields {
            query = query.bind(value.to_string());
        }
        if let Some(synced) = synced {
            query = query.bind(synced);
        }
        let result = query.bind(key).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Upsert a pull from the server by job id in one transaction.
    ///
    /// Cached jobs the server no longer lists are kept.
    pub async fn upsert_jobs(&self, jobs: &[Job]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for job in jobs {
            upsert(&mut *tx, job).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Count records not yet acknowledged by the server
    pub async fn count_unsynced<R: Record>(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE synced = 0", R::TABLE.name());
        let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(count as u64)
    }
}
