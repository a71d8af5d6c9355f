//! # Barcode/Part Resolution
//!
//! Scans part codes and records parts used on a job. The usage record is
//! saved and queued straight away; the catalogue lookup only decorates the
//! local copy and never holds up sync.

pub mod scanner;

pub use scanner::{BarcodeDecoder, ScannedCode, Symbology};

use crate::client::local_db::{LocalDatabase, StoreError};
use crate::client::offline::SyncQueueManager;
use crate::client::remote::RemoteApi;
use crate::shared::{AppConfig, PartInfo, PartsUsage, PayloadType};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no barcode decoder available")]
    Unavailable,
    #[error("scanner failure: {0}")]
    Device(String),
    #[error("part code is empty")]
    EmptyCode,
    #[error("invalid quantity: {0}")]
    InvalidQuantity(f64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Scanned(ScannedCode),
    /// Nothing decoded; the user types the code instead
    ManualEntryRequired { reason: String },
}

/// Scanner and parts usage recorder
#[derive(Clone)]
pub struct PartsService {
    decoder: Option<Arc<dyn BarcodeDecoder>>,
    remote: Arc<dyn RemoteApi>,
    db: LocalDatabase,
    sync: SyncQueueManager,
    scan_window: Duration,
    lookup_timeout: Duration,
}

impl PartsService {
    pub fn new(
        decoder: Option<Arc<dyn BarcodeDecoder>>,
        remote: Arc<dyn RemoteApi>,
        db: LocalDatabase,
        sync: SyncQueueManager,
        config: &AppConfig,
    ) -> Self {
        Self {
            decoder,
            remote,
            db,
            sync,
            scan_window: config.scan_window,
            lookup_timeout: config.lookup_timeout,
        }
    }

    /// Wait up to the scan window for a code
    pub async fn scan(&self) -> ScanOutcome {
        let Some(decoder) = &self.decoder else {
            return ScanOutcome::ManualEntryRequired {
                reason: ScanError::Unavailable.to_string(),
            };
        };

        match tokio::time::timeout(self.scan_window, decoder.decode(&Symbology::ALL)).await {
            Ok(Ok(scanned)) => {
                tracing::debug!(code = %scanned.code, symbology = %scanned.symbology, "barcode scanned");
                ScanOutcome::Scanned(scanned)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "scanner failed, falling back to manual entry");
                ScanOutcome::ManualEntryRequired { reason: e.to_string() }
            }
            Err(_) => ScanOutcome::ManualEntryRequired {
                reason: format!("no code read within {}s", self.scan_window.as_secs()),
            },
        }
    }

    /// Save a parts usage record and queue it for delivery
    pub async fn record_usage(
        &self,
        job_id: &str,
        code: &str,
        quantity: f64,
        notes: Option<String>,
    ) -> Result<PartsUsage, ScanError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ScanError::EmptyCode);
        }
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(ScanError::InvalidQuantity(quantity));
        }

        let usage = PartsUsage {
            id: Uuid::new_v4(),
            job_id: job_id.to_string(),
            code: code.to_string(),
            quantity,
            notes: notes.filter(|n| !n.trim().is_empty()),
            timestamp: Utc::now(),
            synced: false,
            attempts: 0,
            part: None,
        };
        self.db.put(&usage).await?;
        tracing::info!(usage_id = %usage.id, job_id, code, quantity, "parts usage recorded");

        if let Err(e) = self.sync.submit(PayloadType::PartsUsage, &usage.id.to_string()).await {
            tracing::error!(usage_id = %usage.id, error = %e, "parts usage saved but not queued for sync");
        }

        if self.sync.connectivity().is_online() {
            self.spawn_lookup(usage.id, usage.code.clone());
        }
        Ok(usage)
    }

    fn spawn_lookup(&self, usage_id: Uuid, code: String) {
        let remote = Arc::clone(&self.remote);
        let db = self.db.clone();
        let timeout = self.lookup_timeout;

        tokio::spawn(async move {
            let part = match tokio::time::timeout(timeout, remote.lookup_part(&code)).await {
                Ok(Ok(Some(part))) => part,
                Ok(Ok(None)) => {
                    tracing::debug!(code, "part not in catalogue");
                    return;
                }
                Ok(Err(e)) => {
                    tracing::debug!(code, error = %e, "part lookup failed");
                    return;
                }
                Err(_) => {
                    tracing::debug!(code, "part lookup timed out");
                    return;
                }
            };
            if let Err(e) = annotate(&db, usage_id, part).await {
                tracing::warn!(%usage_id, error = %e, "could not store part details");
            }
        });
    }
}

/// Only the `part` field is written, so a concurrent delivery marking the
/// record synced is not overwritten.
async fn annotate(db: &LocalDatabase, usage_id: Uuid, part: PartInfo) -> Result<(), StoreError> {
    let part = serde_json::to_value(&part)?;
    let found = db
        .patch_fields::<PartsUsage>(&usage_id.to_string(), &[("part", part)])
        .await?;
    if !found {
        tracing::debug!(%usage_id, "usage removed before lookup finished");
    }
    Ok(())
}
