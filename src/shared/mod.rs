//! Shared Module
//!
//! Records, validated configuration and error types used by every part of
//! the field client. Nothing in here touches storage, the network or devices.

/// Field data records
pub mod models;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{AppConfig, AppConfigBuilder, CacheSettings, ConfigError};
pub use error::SharedError;
pub use models::{
    Break, BreakKind, Job, JobStatus, Media, MediaKind, MediaMetadata, PartInfo, PartsUsage,
    PayloadType, Priority, QueueState, SyncQueueItem, TimeAction, TimeLog,
};
