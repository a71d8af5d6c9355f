//! Media Retention
//!
//! Synced media keep their record but give up the local payload once they are
//! older than the retention window.

use super::{to_millis, LocalDatabase, Result};
use crate::shared::Media;
use chrono::{DateTime, Utc};

impl LocalDatabase {
    /// Drop the payload of synced media captured before `cutoff`.
    ///
    /// Returns how many payloads were evicted.
    pub async fn evict_synced_media(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT data FROM media
             WHERE synced = 1 AND blob IS NOT NULL AND created_at < ?
             ORDER BY created_at, rowid",
        )
        .bind(to_millis(cutoff))
        .fetch_all(&self.pool)
        .await?;

        let mut evicted = 0;
        for (data,) in rows {
            let mut media: Media = serde_json::from_str(&data)?;
            media.evicted = true;
            let result = sqlx::query("UPDATE media SET blob = NULL, data = ? WHERE id = ?")
                .bind(serde_json::to_string(&media)?)
                .bind(media.id.to_string())
                .execute(&self.pool)
                .await?;
            evicted += result.rows_affected();
        }

        if evicted > 0 {
            tracing::info!(evicted, "evicted synced media payloads");
        }
        Ok(evicted)
    }
}
