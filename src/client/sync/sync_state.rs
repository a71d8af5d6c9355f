//! # Sync State
//!
//! Snapshot of delivery state for display.

use crate::client::local_db::QueueCounts;
use crate::client::sync::network_monitor::NetworkStatus;
use crate::shared::SyncQueueItem;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct SyncState {
    pub network_status: NetworkStatus,
    pub counts: QueueCounts,
    /// Exhausted and rejected items
    pub problems: Vec<SyncQueueItem>,
    pub last_sync: Option<DateTime<Utc>>,
    /// False when records are kept in memory only
    pub durable: bool,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            network_status: NetworkStatus::Offline,
            counts: QueueCounts::default(),
            problems: Vec::new(),
            last_sync: None,
            durable: true,
        }
    }
}

impl SyncState {
    /// Items not yet delivered, whatever their state
    pub fn unsynced(&self) -> u64 {
        self.counts.total()
    }
}
