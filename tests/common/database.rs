//! Database test fixtures and utilities
//!
//! Every fixture lives in its own temporary directory, removed when the
//! fixture is dropped.

use fieldops::client::local_db::LocalDatabase;
use fieldops::client::offline::SyncQueueManager;
use fieldops::client::remote::RemoteApi;
use fieldops::client::sync::ConnectivityMonitor;
use fieldops::shared::{AppConfig, PartsUsage};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

/// A durable database in a temporary directory
pub struct TestDatabase {
    pub db: LocalDatabase,
    pub dir: TempDir,
}

impl TestDatabase {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db = LocalDatabase::open(&dir.path().join("field.db"))
            .await
            .expect("Failed to open test database");
        Self { db, dir }
    }
}

/// Configuration with retries due immediately
pub fn test_config() -> AppConfig {
    AppConfig::builder()
        .retry(Duration::ZERO, 3)
        .build()
        .expect("Invalid test config")
}

/// Manager over `db`, starting online or offline
pub fn manager(db: &LocalDatabase, remote: Arc<dyn RemoteApi>, online: bool) -> SyncQueueManager {
    SyncQueueManager::new(db.clone(), remote, ConnectivityMonitor::new(online), &test_config())
}

/// Commit a parts usage record
pub async fn committed_usage(db: &LocalDatabase, code: &str) -> PartsUsage {
    let usage = PartsUsage {
        id: Uuid::new_v4(),
        job_id: "JOB-1".to_string(),
        code: code.to_string(),
        quantity: 1.0,
        notes: None,
        timestamp: Utc::now(),
        synced: false,
        attempts: 0,
        part: None,
    };
    db.put(&usage).await.expect("Failed to store usage");
    usage
}
