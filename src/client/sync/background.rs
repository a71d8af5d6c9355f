//! # Background Sync Agent
//!
//! Drains the sync queue independently of the UI.
//!
//! ## Architecture
//!
//! - [`TaskScheduler`] keeps named sync tasks. Registering a tag that is
//!   already registered does nothing. A task whose run fails is retried after
//!   30s, 60s and 300s, then dropped until it is registered again.
//! - [`BackgroundSyncAgent`] runs on its own tokio task with its own
//!   [`SyncQueueManager`] over the shared database. It runs due tasks when
//!   the device is online and after connectivity returns, and registers the
//!   sync task on a periodic timer.
//! - Progress goes out as [`AgentMessage`]s on a broadcast channel.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fieldops::client::sync::background::{BackgroundSyncAgent, TaskScheduler, SYNC_TAG};
//! # fn example(agent: BackgroundSyncAgent, scheduler: TaskScheduler) {
//! let mut messages = agent.subscribe();
//! let handle = agent.spawn();
//! scheduler.register(SYNC_TAG);
//! # }
//! ```

use crate::client::local_db::LocalDatabase;
use crate::client::offline::{DrainReport, SyncError, SyncNotice, SyncQueueManager};
use crate::client::remote::RemoteApi;
use crate::client::sync::metrics::SyncMetrics;
use crate::client::sync::network_monitor::{ConnectivityEvent, ConnectivityMonitor};
use crate::shared::{AppConfig, PayloadType, QueueState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Tag of the field data sync task
pub const SYNC_TAG: &str = "sync-field-data";

/// Delays before re-running a failed task
pub const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(30),
    Duration::from_secs(60),
    Duration::from_secs(300),
];

/// Runs of a task before it is dropped
pub const MAX_TASK_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy)]
struct Registration {
    failures: u32,
    not_before: Option<Instant>,
}

#[derive(Debug, Default)]
struct SchedulerInner {
    tasks: Mutex<HashMap<String, Registration>>,
    wake: Notify,
}

/// Named background tasks awaiting a run
#[derive(Debug, Clone, Default)]
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, HashMap<String, Registration>> {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a task. Returns false if the tag was already registered.
    pub fn register(&self, tag: &str) -> bool {
        let created = {
            let mut tasks = self.tasks();
            if tasks.contains_key(tag) {
                false
            } else {
                tasks.insert(
                    tag.to_string(),
                    Registration {
                        failures: 0,
                        not_before: None,
                    },
                );
                true
            }
        };
        if created {
            tracing::debug!(tag, "background task registered");
            self.inner.wake.notify_one();
        }
        created
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.tasks().contains_key(tag)
    }

    /// Tags ready to run at `now`
    pub fn due(&self, now: Instant) -> Vec<String> {
        let mut due: Vec<String> = self
            .tasks()
            .iter()
            .filter(|(_, reg)| reg.not_before.map_or(true, |at| at <= now))
            .map(|(tag, _)| tag.clone())
            .collect();
        due.sort();
        due
    }

    /// Earliest time a waiting task becomes due
    pub fn next_due(&self) -> Option<Instant> {
        self.tasks().values().filter_map(|reg| reg.not_before).min()
    }

    /// Record the result of a run. Successful tasks are removed; failed ones
    /// are re-scheduled until they run out of attempts.
    pub fn complete(&self, tag: &str, succeeded: bool, now: Instant) {
        let mut tasks = self.tasks();
        if succeeded {
            tasks.remove(tag);
            return;
        }
        let Some(reg) = tasks.get_mut(tag) else {
            return;
        };
        reg.failures += 1;
        if reg.failures >= MAX_TASK_ATTEMPTS {
            tasks.remove(tag);
            tracing::warn!(tag, "background task failed {} times, giving up", MAX_TASK_ATTEMPTS);
        } else {
            let delay = RETRY_DELAYS[(reg.failures as usize - 1).min(RETRY_DELAYS.len() - 1)];
            reg.not_before = Some(now + delay);
            tracing::debug!(tag, failures = reg.failures, ?delay, "background task re-scheduled");
        }
    }

    /// Wait until a task is registered
    pub async fn notified(&self) {
        self.inner.wake.notified().await;
    }
}

/// Progress reported by the agent
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    ItemSynced {
        item_id: Uuid,
        payload_type: PayloadType,
        record_id: String,
    },
    ItemFailed {
        item_id: Uuid,
        record_id: String,
        state: QueueState,
        error: String,
    },
    DrainFinished(DrainReport),
}

impl From<SyncNotice> for AgentMessage {
    fn from(notice: SyncNotice) -> Self {
        match notice {
            SyncNotice::Synced {
                item_id,
                payload_type,
                record_id,
            } => AgentMessage::ItemSynced {
                item_id,
                payload_type,
                record_id,
            },
            SyncNotice::NeedsAttention {
                item_id,
                record_id,
                state,
                error,
                ..
            } => AgentMessage::ItemFailed {
                item_id,
                record_id,
                state,
                error,
            },
        }
    }
}

/// Queue drainer running apart from the UI
pub struct BackgroundSyncAgent {
    manager: SyncQueueManager,
    scheduler: TaskScheduler,
    connectivity: ConnectivityMonitor,
    messages: broadcast::Sender<AgentMessage>,
    interval: Duration,
    metrics: Arc<Mutex<SyncMetrics>>,
}

impl BackgroundSyncAgent {
    pub fn new(
        db: LocalDatabase,
        remote: Arc<dyn RemoteApi>,
        connectivity: ConnectivityMonitor,
        scheduler: TaskScheduler,
        config: &AppConfig,
    ) -> Self {
        let manager = SyncQueueManager::new(db, remote, connectivity.clone(), config);
        let (messages, _) = broadcast::channel(64);
        Self {
            manager,
            scheduler,
            connectivity,
            messages,
            interval: config.sync_interval,
            metrics: Arc::new(Mutex::new(SyncMetrics::new())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentMessage> {
        self.messages.subscribe()
    }

    /// Shared view of the agent's counters
    pub fn metrics(&self) -> Arc<Mutex<SyncMetrics>> {
        Arc::clone(&self.metrics)
    }

    fn with_metrics(&self, update: impl FnOnce(&mut SyncMetrics)) {
        let mut metrics = self.metrics.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        update(&mut metrics);
    }

    /// Drain the queue once, forwarding per-item progress
    pub async fn run_once(&self) -> Result<DrainReport, SyncError> {
        let mut notices = self.manager.subscribe();
        self.with_metrics(SyncMetrics::record_sync_start);

        let result = self.manager.drain().await;

        while let Ok(notice) = notices.try_recv() {
            let _ = self.messages.send(notice.into());
        }

        match &result {
            Ok(report) => {
                let report = report.clone();
                self.with_metrics(|m| m.record_sync_success(report.synced as u64));
                let _ = self.messages.send(AgentMessage::DrainFinished(report));
            }
            Err(e) => {
                self.with_metrics(SyncMetrics::record_sync_failure);
                tracing::error!(error = %e, "background sync run failed");
            }
        }
        result
    }

    /// Run every due task once. A run ending offline counts as failed.
    async fn run_due(&self) {
        if !self.connectivity.is_online() {
            return;
        }
        for tag in self.scheduler.due(Instant::now()) {
            let succeeded = match self.run_once().await {
                Ok(report) => !report.stopped_offline,
                Err(_) => false,
            };
            self.scheduler.complete(&tag, succeeded, Instant::now());
        }
    }

    /// Start the agent on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut connectivity = self.connectivity.subscribe();
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(interval = ?self.interval, "background sync agent started");

            loop {
                let idle = Instant::now() + self.interval;
                let next_due = if self.connectivity.is_online() {
                    self.scheduler.next_due().unwrap_or(idle)
                } else {
                    idle
                };

                tokio::select! {
                    _ = ticker.tick() => {
                        if self.connectivity.is_online() {
                            self.scheduler.register(SYNC_TAG);
                        }
                    }
                    _ = self.scheduler.notified() => {}
                    _ = tokio::time::sleep_until(next_due) => {}
                    event = connectivity.recv() => match event {
                        Ok(ConnectivityEvent::WentOnline) => {
                            self.scheduler.register(SYNC_TAG);
                        }
                        Ok(ConnectivityEvent::WentOffline) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }

                self.run_due().await;
            }
            tracing::info!("background sync agent stopped");
        })
    }
}
