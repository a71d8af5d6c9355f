//! Client Error Types
//!
//! Each component has its own error enum; [`FieldError`] folds them together
//! for the composition root and the desktop shell.

use crate::client::cache::CacheError;
use crate::client::local_db::StoreError;
use crate::client::media::MediaError;
use crate::client::offline::SyncError;
use crate::client::parts::ScanError;
use crate::client::remote::DeliveryError;
use crate::client::timer::TimerError;
use crate::shared::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
    #[error("timer error: {0}")]
    Timer(#[from] TimerError),
    #[error("media error: {0}")]
    Media(#[from] MediaError),
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

impl FieldError {
    /// Whether the user can fix this by trying again later
    pub fn is_transient(&self) -> bool {
        match self {
            FieldError::Delivery(e) => e.is_retryable(),
            FieldError::Sync(SyncError::Delivery(e)) => e.is_retryable(),
            FieldError::Cache(CacheError::Network(_)) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FieldError>;
