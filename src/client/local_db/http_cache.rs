//! Cached HTTP responses, keyed by URL.

use super::{from_millis, to_millis, LocalDatabase, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::Row;

/// A stored response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub stored_at: DateTime<Utc>,
}

impl LocalDatabase {
    /// Store a complete response, replacing any previous copy in one statement
    pub async fn cache_response(&self, response: &CachedResponse) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO http_cache (url, status, content_type, body, stored_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&response.url)
        .bind(i64::from(response.status))
        .bind(&response.content_type)
        .bind(response.body.as_ref())
        .bind(to_millis(response.stored_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn cached_response(&self, url: &str) -> Result<Option<CachedResponse>> {
        let row = sqlx::query(
            "SELECT url, status, content_type, body, stored_at FROM http_cache WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let status: i64 = row.try_get("status")?;
                let body: Vec<u8> = row.try_get("body")?;
                Ok(Some(CachedResponse {
                    url: row.try_get("url")?,
                    status: u16::try_from(status).unwrap_or(200),
                    content_type: row.try_get("content_type")?,
                    body: Bytes::from(body),
                    stored_at: from_millis(row.try_get("stored_at")?)?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Remove every cached response. Returns how many were removed.
    pub async fn purge_http_cache(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM http_cache").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
