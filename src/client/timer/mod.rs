//! # Time Tracking
//!
//! Work timer with break accounting.
//!
//! ## Key Components
//!
//! - `machine.rs`: the pure state machine and the [`Clock`] seam
//! - [`TimeTracker`]: runs the machine, commits every [`TimeLog`] to the local
//!   store, submits it for delivery and publishes a [`TimerSnapshot`] once a
//!   second
//!
//! A transition only takes effect once its log is committed; a failed write
//! leaves the timer where it was.

pub mod machine;

pub use machine::{Clock, ManualClock, SystemClock, TimerMachine, TimerSnapshot, TimerState};

use crate::client::local_db::{IndexQuery, LocalDatabase, StoreError};
use crate::client::offline::SyncQueueManager;
use crate::shared::{BreakKind, PayloadType, TimeAction, TimeLog};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("cannot {action} while {from}")]
    InvalidTransition { from: TimerState, action: TimeAction },
    #[error("no job selected")]
    NoJob,
    #[error("a reason is required")]
    MissingReason,
    #[error("invalid duration: {0} seconds")]
    InvalidDuration(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Timer service
#[derive(Clone)]
pub struct TimeTracker {
    machine: Arc<Mutex<TimerMachine>>,
    clock: Arc<dyn Clock>,
    db: LocalDatabase,
    sync: SyncQueueManager,
    snapshots: watch::Sender<TimerSnapshot>,
}

impl TimeTracker {
    pub fn new(db: LocalDatabase, sync: SyncQueueManager, clock: Arc<dyn Clock>) -> Self {
        let (snapshots, _) = watch::channel(TimerSnapshot::default());
        Self {
            machine: Arc::new(Mutex::new(TimerMachine::new())),
            clock,
            db,
            sync,
            snapshots,
        }
    }

    /// Live counters, refreshed every second by [`TimeTracker::spawn_ticker`]
    pub fn watch(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshots.subscribe()
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        self.machine.lock().await.snapshot(self.clock.now())
    }

    pub async fn state(&self) -> TimerState {
        self.machine.lock().await.state()
    }

    /// Apply a transition to a copy of the machine, commit its log, then
    /// keep the copy.
    async fn transition<F>(&self, apply: F) -> Result<TimeLog, TimerError>
    where
        F: FnOnce(&mut TimerMachine, DateTime<Utc>) -> Result<TimeLog, TimerError>,
    {
        let mut machine = self.machine.lock().await;
        let now = self.clock.now();
        let mut next = machine.clone();
        let log = apply(&mut next, now)?;

        self.db.put(&log).await?;
        *machine = next;
        self.snapshots.send_replace(machine.snapshot(now));
        drop(machine);

        tracing::info!(job_id = %log.job_id, action = %log.action, work_secs = log.work_secs, "timer transition");
        if let Err(e) = self.sync.submit(PayloadType::TimeLog, &log.id.to_string()).await {
            tracing::error!(log_id = %log.id, error = %e, "time log saved but not queued for sync");
        }
        Ok(log)
    }

    pub async fn start(&self, job_id: &str) -> Result<TimeLog, TimerError> {
        self.transition(|m, now| m.start(job_id, now)).await
    }

    pub async fn pause(&self) -> Result<TimeLog, TimerError> {
        self.transition(|m, now| m.pause(now)).await
    }

    pub async fn resume(&self) -> Result<TimeLog, TimerError> {
        self.transition(|m, now| m.resume(now)).await
    }

    pub async fn start_break(&self, kind: BreakKind, reason: Option<String>) -> Result<TimeLog, TimerError> {
        self.transition(|m, now| m.start_break(kind, reason, now)).await
    }

    pub async fn end_break(&self) -> Result<TimeLog, TimerError> {
        self.transition(|m, now| m.end_break(now)).await
    }

    pub async fn stop(&self) -> Result<TimeLog, TimerError> {
        self.transition(|m, now| m.stop(now)).await
    }

    pub async fn manual_entry(
        &self,
        duration: Duration,
        reason: &str,
        job_id: Option<&str>,
    ) -> Result<TimeLog, TimerError> {
        let secs = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);
        self.transition(|m, now| m.manual_entry(secs, reason, job_id, now)).await
    }

    /// Resume the most recent unfinished session from the local store.
    ///
    /// Returns the restored state. Writes nothing.
    pub async fn restore(&self) -> Result<TimerState, TimerError> {
        let logs: Vec<TimeLog> = self.db.get_all(IndexQuery::All).await?;

        let mut by_job: HashMap<String, Vec<TimeLog>> = HashMap::new();
        for log in logs {
            by_job.entry(log.job_id.clone()).or_default().push(log);
        }

        let latest_open = by_job
            .into_values()
            .filter_map(|job_logs| {
                let last_at = job_logs.last()?.timestamp;
                let restored = TimerMachine::restore(&job_logs);
                (restored.state() != TimerState::Stopped).then_some((last_at, restored))
            })
            .max_by_key(|(last_at, _)| *last_at)
            .map(|(_, machine)| machine);

        let mut machine = self.machine.lock().await;
        if let Some(restored) = latest_open {
            tracing::info!(job_id = ?restored.job_id(), state = %restored.state(), "restored running timer");
            *machine = restored;
        }
        self.snapshots.send_replace(machine.snapshot(self.clock.now()));
        Ok(machine.state())
    }

    /// Publish a snapshot every second until the task is aborted
    pub fn spawn_ticker(&self) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                let snapshot = tracker.snapshot().await;
                tracker.snapshots.send_replace(snapshot);
            }
        })
    }
}
