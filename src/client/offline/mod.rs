//! # Offline Delivery
//!
//! Delivers locally committed records to the server once it is reachable.
//!
//! ## Architecture
//!
//! - Records are committed to the local store first, then a queue item
//!   naming the record is enqueued. The queue never holds payloads.
//! - [`SyncQueueManager::drain`] walks due items oldest first, takes a lease
//!   on each, reloads the record and delivers it with a bounded timeout.
//! - A successful delivery marks the record synced, then deletes the item.
//! - Failures are scheduled by the [`RetryPolicy`]; a lost connection ends
//!   the sweep and leaves the remaining items untouched.
//!
//! Delivery is at least once. The server de-duplicates by record id.
//!
//! ## Key Components
//!
//! - `retry.rs`: retry policy and backoff
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fieldops::client::offline::SyncQueueManager;
//! use fieldops::shared::PayloadType;
//!
//! # async fn example(manager: SyncQueueManager) -> Result<(), fieldops::client::offline::SyncError> {
//! manager.submit(PayloadType::TimeLog, "0f8e...").await?;
//! let report = manager.drain().await?;
//! println!("synced {} items", report.synced);
//! # Ok(())
//! # }
//! ```

pub mod retry;

pub use retry::{BackoffStrategy, RetryDecision, RetryPolicy};

use crate::client::local_db::{LocalDatabase, QueueCounts, StoreError};
use crate::client::remote::{DeliveryError, RemoteApi};
use crate::client::sync::background::{TaskScheduler, SYNC_TAG};
use crate::client::sync::network_monitor::ConnectivityMonitor;
use crate::shared::{AppConfig, Job, Media, PartsUsage, PayloadType, QueueState, SyncQueueItem, TimeLog};
use chrono::Utc;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

/// Extra lease time on top of the delivery timeout
const LEASE_MARGIN: Duration = Duration::from_secs(30);

/// Items examined per drain
const DRAIN_BATCH: u32 = 500;

/// Sync queue errors
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error("queue item {0} not found")]
    ItemNotFound(Uuid),
    #[error("queue item {0} is still pending")]
    StillPending(Uuid),
}

/// What happened to one queue item
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// Delivered and removed from the queue
    Synced,
    /// Failed; will be retried automatically
    Retrying { attempts: u32 },
    /// Failed too often; waits for a manual retry
    Exhausted { error: String },
    /// Refused by the server
    Rejected { error: String },
    /// Not attempted because the device is offline
    Deferred,
    /// Another drain holds the item, or it is not pending
    Skipped,
    /// The record no longer exists locally; the item was removed
    Dropped,
}

/// Summary of one drain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub attempted: usize,
    pub synced: usize,
    pub retrying: usize,
    pub exhausted: usize,
    pub rejected: usize,
    pub dropped: usize,
    /// The sweep ended early on a lost connection
    pub stopped_offline: bool,
}

impl DrainReport {
    fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Synced => self.synced += 1,
            ItemOutcome::Retrying { .. } => self.retrying += 1,
            ItemOutcome::Exhausted { .. } => self.exhausted += 1,
            ItemOutcome::Rejected { .. } => self.rejected += 1,
            ItemOutcome::Dropped => self.dropped += 1,
            ItemOutcome::Deferred => self.stopped_offline = true,
            ItemOutcome::Skipped => return,
        }
        self.attempted += 1;
    }
}

/// Notices for the UI
#[derive(Debug, Clone, PartialEq)]
pub enum SyncNotice {
    Synced {
        item_id: Uuid,
        payload_type: PayloadType,
        record_id: String,
    },
    /// An item stopped retrying and needs attention
    NeedsAttention {
        item_id: Uuid,
        payload_type: PayloadType,
        record_id: String,
        state: QueueState,
        error: String,
    },
}

/// Delivers queued records
#[derive(Clone)]
pub struct SyncQueueManager {
    db: LocalDatabase,
    remote: Arc<dyn RemoteApi>,
    connectivity: ConnectivityMonitor,
    policy: RetryPolicy,
    request_timeout: Duration,
    upload_timeout: Duration,
    drain_lock: Arc<Mutex<()>>,
    notices: broadcast::Sender<SyncNotice>,
    scheduler: Option<TaskScheduler>,
}

impl std::fmt::Debug for SyncQueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueueManager")
            .field("policy", &self.policy)
            .field("online", &self.connectivity.is_online())
            .finish_non_exhaustive()
    }
}

impl SyncQueueManager {
    pub fn new(
        db: LocalDatabase,
        remote: Arc<dyn RemoteApi>,
        connectivity: ConnectivityMonitor,
        config: &AppConfig,
    ) -> Self {
        let (notices, _) = broadcast::channel(64);
        Self {
            db,
            remote,
            connectivity,
            policy: RetryPolicy::new(config.retry_base_delay, config.max_attempts),
            request_timeout: config.request_timeout,
            upload_timeout: config.upload_timeout,
            drain_lock: Arc::new(Mutex::new(())),
            notices,
            scheduler: None,
        }
    }

    /// Register the background task with `scheduler` whenever delivery has
    /// to wait for connectivity
    pub fn with_scheduler(mut self, scheduler: TaskScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotice> {
        self.notices.subscribe()
    }

    pub fn database(&self) -> &LocalDatabase {
        &self.db
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Without durable storage nothing survives a restart, so every
    /// delivery is attempted right away.
    fn should_attempt(&self) -> bool {
        self.connectivity.is_online() || !self.db.is_durable()
    }

    /// Enqueue a record, idempotently
    pub async fn enqueue(&self, payload_type: PayloadType, record_id: &str) -> Result<SyncQueueItem, SyncError> {
        let outcome = self.db.enqueue(payload_type, record_id).await?;
        if outcome.created {
            tracing::debug!(item_id = %outcome.item.id, %payload_type, record_id, "enqueued");
        }
        Ok(outcome.item)
    }

    /// Enqueue a committed record and try to deliver it now. When offline the
    /// background task is registered instead.
    pub async fn submit(&self, payload_type: PayloadType, record_id: &str) -> Result<ItemOutcome, SyncError> {
        let item = self.enqueue(payload_type, record_id).await?;

        let outcome = if self.should_attempt() {
            self.process(item).await?
        } else {
            ItemOutcome::Deferred
        };

        if matches!(outcome, ItemOutcome::Deferred | ItemOutcome::Retrying { .. }) {
            self.register_background();
        }
        Ok(outcome)
    }

    fn register_background(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.register(SYNC_TAG);
        }
    }

    /// Deliver every due item, oldest first
    pub async fn drain(&self) -> Result<DrainReport, SyncError> {
        let _guard = self.drain_lock.lock().await;
        let mut report = DrainReport::default();

        if !self.should_attempt() {
            report.stopped_offline = true;
            return Ok(report);
        }

        let items = self.db.due_queue_items(Utc::now(), DRAIN_BATCH).await?;
        for item in items {
            let outcome = self.process(item).await?;
            report.record(&outcome);
            if outcome == ItemOutcome::Deferred {
                tracing::info!("connection lost, stopping sync sweep");
                break;
            }
        }

        if report.synced > 0 {
            self.db.set_last_sync_time(Utc::now()).await?;
        }
        if report.attempted > 0 {
            tracing::info!(
                synced = report.synced,
                retrying = report.retrying,
                exhausted = report.exhausted,
                rejected = report.rejected,
                "sync sweep finished"
            );
        }
        Ok(report)
    }

    /// Lease and deliver one item
    async fn process(&self, item: SyncQueueItem) -> Result<ItemOutcome, SyncError> {
        let now = Utc::now();
        let lease = chrono::Duration::from_std(self.upload_timeout + LEASE_MARGIN)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        // The leased row carries the attempt count as of now, which another
        // context may have moved since `item` was read.
        let Some(item) = self.db.lease_queue_item(item.id, now, now + lease).await? else {
            return Ok(ItemOutcome::Skipped);
        };

        let result = match item.payload_type {
            PayloadType::TimeLog => self.deliver_time_log(&item.record_id).await?,
            PayloadType::Media => self.deliver_media(&item.record_id).await?,
            PayloadType::PartsUsage => self.deliver_parts_usage(&item.record_id).await?,
        };

        match result {
            None => {
                tracing::warn!(item_id = %item.id, record_id = %item.record_id, "queued record missing, dropping item");
                self.db.resolve_queue_item(item.id).await?;
                Ok(ItemOutcome::Dropped)
            }
            Some(Ok(())) => {
                self.db.resolve_queue_item(item.id).await?;
                tracing::debug!(item_id = %item.id, record_id = %item.record_id, "delivered");
                let _ = self.notices.send(SyncNotice::Synced {
                    item_id: item.id,
                    payload_type: item.payload_type,
                    record_id: item.record_id.clone(),
                });
                Ok(ItemOutcome::Synced)
            }
            Some(Err(error)) => self.handle_failure(item, error).await,
        }
    }

    async fn handle_failure(&self, item: SyncQueueItem, error: DeliveryError) -> Result<ItemOutcome, SyncError> {
        if error.is_connectivity() {
            self.db.release_queue_item(item.id).await?;
            self.connectivity.report_probe(false);
            return Ok(ItemOutcome::Deferred);
        }

        let attempts = item.attempts + 1;
        let message = error.to_string();
        let outcome = match self.policy.decide(attempts, &error, Utc::now()) {
            RetryDecision::RetryAt(at) => {
                self.db
                    .record_queue_failure(item.id, attempts, QueueState::Pending, Some(at), &message)
                    .await?;
                tracing::debug!(item_id = %item.id, attempts, error = %message, "delivery failed, will retry");
                ItemOutcome::Retrying { attempts }
            }
            RetryDecision::Exhausted => {
                self.db
                    .record_queue_failure(item.id, attempts, QueueState::Exhausted, None, &message)
                    .await?;
                tracing::warn!(item_id = %item.id, attempts, error = %message, "delivery attempts exhausted");
                ItemOutcome::Exhausted { error: message.clone() }
            }
            RetryDecision::Rejected => {
                self.db
                    .record_queue_failure(item.id, attempts, QueueState::Rejected, None, &message)
                    .await?;
                tracing::warn!(item_id = %item.id, error = %message, "delivery rejected by server");
                ItemOutcome::Rejected { error: message.clone() }
            }
        };

        self.note_attempts(item.payload_type, &item.record_id, attempts).await?;

        let state = match outcome {
            ItemOutcome::Exhausted { .. } => Some(QueueState::Exhausted),
            ItemOutcome::Rejected { .. } => Some(QueueState::Rejected),
            _ => None,
        };
        if let Some(state) = state {
            let _ = self.notices.send(SyncNotice::NeedsAttention {
                item_id: item.id,
                payload_type: item.payload_type,
                record_id: item.record_id,
                state,
                error: message,
            });
        }
        Ok(outcome)
    }

    /// Mirror the attempt count onto records that carry one
    async fn note_attempts(&self, payload_type: PayloadType, record_id: &str, attempts: u32) -> Result<(), SyncError> {
        let fields = [("attempts", json!(attempts))];
        match payload_type {
            PayloadType::Media => {
                self.db.patch_fields::<Media>(record_id, &fields).await?;
            }
            PayloadType::PartsUsage => {
                self.db.patch_fields::<PartsUsage>(record_id, &fields).await?;
            }
            PayloadType::TimeLog => {}
        }
        Ok(())
    }

    async fn deliver_time_log(&self, record_id: &str) -> Result<Option<Result<(), DeliveryError>>, SyncError> {
        let Some(log) = self.db.get::<TimeLog>(record_id).await? else {
            return Ok(None);
        };
        match bounded(self.request_timeout, self.remote.send_time_log(&log)).await {
            Ok(ack) => {
                let server_timestamp = ack.server_timestamp.unwrap_or_else(Utc::now);
                self.db
                    .patch_fields::<TimeLog>(
                        record_id,
                        &[("synced", json!(true)), ("server_timestamp", json!(server_timestamp))],
                    )
                    .await?;
                Ok(Some(Ok(())))
            }
            Err(e) => Ok(Some(Err(e))),
        }
    }

    async fn deliver_media(&self, record_id: &str) -> Result<Option<Result<(), DeliveryError>>, SyncError> {
        let Some(media) = self.db.get::<Media>(record_id).await? else {
            return Ok(None);
        };
        if media.payload.is_empty() {
            return Ok(Some(Err(DeliveryError::Permanent {
                status: 0,
                message: "media payload is no longer stored on this device".to_string(),
            })));
        }
        match bounded(self.upload_timeout, self.remote.upload_media(&media)).await {
            Ok(url) => {
                self.db
                    .patch_fields::<Media>(record_id, &[("synced", json!(true)), ("remote_url", json!(url))])
                    .await?;
                Ok(Some(Ok(())))
            }
            Err(e) => Ok(Some(Err(e))),
        }
    }

    async fn deliver_parts_usage(&self, record_id: &str) -> Result<Option<Result<(), DeliveryError>>, SyncError> {
        let Some(usage) = self.db.get::<PartsUsage>(record_id).await? else {
            return Ok(None);
        };
        match bounded(self.request_timeout, self.remote.send_parts_usage(&usage)).await {
            Ok(()) => {
                self.db
                    .patch_fields::<PartsUsage>(record_id, &[("synced", json!(true))])
                    .await?;
                Ok(Some(Ok(())))
            }
            Err(e) => Ok(Some(Err(e))),
        }
    }

    /// Reset an exhausted or rejected item and try again if online
    pub async fn retry(&self, item_id: Uuid) -> Result<ItemOutcome, SyncError> {
        let item = self
            .db
            .queue_item(item_id)
            .await?
            .ok_or(SyncError::ItemNotFound(item_id))?;
        if item.state == QueueState::Pending {
            return Err(SyncError::StillPending(item_id));
        }
        if !self.db.reset_queue_item(item_id).await? {
            return Err(SyncError::StillPending(item_id));
        }
        let item = self
            .db
            .queue_item(item_id)
            .await?
            .ok_or(SyncError::ItemNotFound(item_id))?;

        if self.should_attempt() {
            let _guard = self.drain_lock.lock().await;
            self.process(item).await
        } else {
            self.register_background();
            Ok(ItemOutcome::Deferred)
        }
    }

    /// Dismiss an exhausted or rejected item. The record stays local and
    /// unsynced.
    pub async fn acknowledge(&self, item_id: Uuid) -> Result<(), SyncError> {
        let item = self
            .db
            .queue_item(item_id)
            .await?
            .ok_or(SyncError::ItemNotFound(item_id))?;
        if item.state == QueueState::Pending {
            return Err(SyncError::StillPending(item_id));
        }
        self.db.resolve_queue_item(item_id).await?;
        tracing::info!(item_id = %item_id, record_id = %item.record_id, "queue item dismissed");
        Ok(())
    }

    /// Items waiting for delivery
    pub async fn pending(&self) -> Result<Vec<SyncQueueItem>, SyncError> {
        Ok(self.db.queue_items(QueueState::Pending).await?)
    }

    /// Exhausted and rejected items, oldest first
    pub async fn problems(&self) -> Result<Vec<SyncQueueItem>, SyncError> {
        let mut items = self.db.queue_items(QueueState::Exhausted).await?;
        items.extend(self.db.queue_items(QueueState::Rejected).await?);
        items.sort_by_key(|item| item.created_at);
        Ok(items)
    }

    pub async fn counts(&self) -> Result<QueueCounts, SyncError> {
        Ok(self.db.queue_counts().await?)
    }

    /// Fetch assigned jobs and upsert them into the local cache
    pub async fn pull_jobs(&self) -> Result<Vec<Job>, SyncError> {
        let jobs = match bounded(self.request_timeout, self.remote.fetch_jobs()).await {
            Ok(jobs) => jobs,
            Err(e) => {
                if e.is_connectivity() {
                    self.connectivity.report_probe(false);
                }
                return Err(e.into());
            }
        };
        self.db.upsert_jobs(&jobs).await?;
        self.db
            .set_sync_metadata("last_job_pull", &Utc::now().to_rfc3339())
            .await?;
        tracing::info!(count = jobs.len(), "refreshed assigned jobs");
        Ok(jobs)
    }
}

/// Run a remote call with a timeout
async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, DeliveryError>
where
    F: Future<Output = Result<T, DeliveryError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(DeliveryError::Timeout),
    }
}
