//! # Sync Metrics
//!
//! Counters for background sync runs.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct SyncMetrics {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub average_run_duration: Duration,
    pub total_items_synced: u64,
    pub last_run_duration: Option<Duration>,
    last_run_start: Option<Instant>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            total_runs: 0,
            successful_runs: 0,
            failed_runs: 0,
            average_run_duration: Duration::ZERO,
            total_items_synced: 0,
            last_run_duration: None,
            last_run_start: None,
        }
    }

    pub fn record_sync_start(&mut self) {
        self.last_run_start = Some(Instant::now());
        self.total_runs += 1;
    }

    pub fn record_sync_success(&mut self, items_synced: u64) {
        if let Some(start) = self.last_run_start.take() {
            let duration = start.elapsed();
            self.last_run_duration = Some(duration);
            self.successful_runs += 1;
            self.total_items_synced += items_synced;

            // Rolling average
            let runs = u32::try_from(self.successful_runs).unwrap_or(u32::MAX);
            let total = self.average_run_duration * (runs - 1) + duration;
            self.average_run_duration = total / runs;
        }
    }

    pub fn record_sync_failure(&mut self) {
        self.last_run_start = None;
        self.failed_runs += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            self.successful_runs as f64 / self.total_runs as f64
        }
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}
