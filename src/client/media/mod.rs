//! # Media Capture & Upload Pipeline
//!
//! Photos and videos taken on a job.
//!
//! ## Flow
//!
//! 1. A [`CaptureSession`] is opened on the [`Camera`] and confirmed. The
//!    device is released however the session ends.
//! 2. Photos are downscaled and re-encoded as JPEG; oversized videos are
//!    flagged and handed to the [`VideoCompressor`].
//! 3. The record is checked against the storage quota, saved, and submitted
//!    to the sync queue.
//!
//! A device error surfaces immediately and nothing is saved or queued.

pub mod camera;
pub mod compress;

pub use camera::{
    Camera, CameraDevice, CaptureMode, CaptureSession, CapturedBlob, DeviceError, Facing, Frame, UnavailableCamera,
};
pub use compress::{downscale_photo, EncodedPhoto, NoopCompressor, VideoCompressor};

use crate::client::local_db::{LocalDatabase, StoreError};
use crate::client::offline::SyncQueueManager;
use crate::shared::{AppConfig, Job, Media, MediaKind, MediaMetadata, PayloadType};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("storage quota exceeded: {used} of {quota} bytes used, {requested} more needed")]
    Quota { used: u64, requested: u64, quota: u64 },
    #[error("could not encode media: {0}")]
    Encode(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for MediaError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::QuotaExceeded {
                used,
                requested,
                quota,
            } => MediaError::Quota {
                used,
                requested,
                quota,
            },
            other => MediaError::Store(other),
        }
    }
}

#[derive(Debug, Clone)]
struct MediaSettings {
    max_photo_dimension: u32,
    photo_quality: u8,
    video_compress_threshold: u64,
    storage_quota: u64,
    retention_days: u32,
}

/// Capture, store and queue media
#[derive(Clone)]
pub struct MediaPipeline {
    camera: Arc<dyn Camera>,
    compressor: Arc<dyn VideoCompressor>,
    db: LocalDatabase,
    sync: SyncQueueManager,
    settings: MediaSettings,
}

impl MediaPipeline {
    pub fn new(camera: Arc<dyn Camera>, db: LocalDatabase, sync: SyncQueueManager, config: &AppConfig) -> Self {
        Self {
            camera,
            compressor: Arc::new(NoopCompressor),
            db,
            sync,
            settings: MediaSettings {
                max_photo_dimension: config.max_photo_dimension,
                photo_quality: config.photo_quality,
                video_compress_threshold: config.video_compress_threshold_bytes,
                storage_quota: config.storage_quota_bytes,
                retention_days: config.media_retention_days,
            },
        }
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn VideoCompressor>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Open the camera for preview. The caller confirms or drops the session.
    pub async fn open_session(&self, mode: CaptureMode, facing: Facing) -> Result<CaptureSession, MediaError> {
        Ok(CaptureSession::open(self.camera.as_ref(), mode, facing).await?)
    }

    pub async fn capture_photo(&self, job: &Job, facing: Facing) -> Result<Media, MediaError> {
        let session = self.open_session(CaptureMode::Photo, facing).await?;
        let blob = session.confirm().await?;
        self.save_photo(job, blob.bytes).await
    }

    pub async fn capture_video(&self, job: &Job, facing: Facing) -> Result<Media, MediaError> {
        let session = self.open_session(CaptureMode::Video, facing).await?;
        let blob = session.confirm().await?;
        self.save_video(job, blob.bytes, &blob.mime_type).await
    }

    /// Downscale, store and queue a photo
    pub async fn save_photo(&self, job: &Job, raw: Vec<u8>) -> Result<Media, MediaError> {
        let max_dimension = self.settings.max_photo_dimension;
        let quality = self.settings.photo_quality;
        let photo = tokio::task::spawn_blocking(move || downscale_photo(&raw, max_dimension, quality))
            .await
            .map_err(|e| MediaError::Encode(e.to_string()))??;

        let mut media = new_media(job, MediaKind::Photo, photo.jpeg, "image/jpeg");
        media.metadata.width = Some(photo.width);
        media.metadata.height = Some(photo.height);
        self.save(media).await
    }

    /// Store and queue a video, compressing it first if it is oversized
    pub async fn save_video(&self, job: &Job, raw: Vec<u8>, mime_type: &str) -> Result<Media, MediaError> {
        let threshold = self.settings.video_compress_threshold;
        let payload = if raw.len() as u64 > threshold {
            tracing::debug!(size = raw.len(), threshold, "video over compression threshold");
            self.compressor.compress(raw, mime_type).await?
        } else {
            raw
        };

        let mut media = new_media(job, MediaKind::Video, payload, mime_type);
        media.needs_compression = media.size_bytes > threshold;
        self.save(media).await
    }

    async fn save(&self, media: Media) -> Result<Media, MediaError> {
        self.reserve(media.size_bytes).await?;
        self.db.put(&media).await?;
        tracing::info!(media_id = %media.id, job_id = %media.job_id, kind = ?media.kind, size = media.size_bytes, "media saved");

        if let Err(e) = self.sync.submit(PayloadType::Media, &media.id.to_string()).await {
            tracing::error!(media_id = %media.id, error = %e, "media saved but not queued for sync");
        }
        Ok(media)
    }

    /// Check the quota, evicting every synced payload once before giving up
    async fn reserve(&self, bytes: u64) -> Result<(), MediaError> {
        match self.db.ensure_capacity(bytes, self.settings.storage_quota).await {
            Err(StoreError::QuotaExceeded { .. }) => {
                let evicted = self.db.evict_synced_media(Utc::now()).await?;
                tracing::warn!(evicted, requested = bytes, "storage quota reached");
                Ok(self.db.ensure_capacity(bytes, self.settings.storage_quota).await?)
            }
            other => Ok(other?),
        }
    }

    /// Drop payloads of synced media older than the retention period
    pub async fn evict_expired(&self) -> Result<u64, MediaError> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(self.settings.retention_days));
        Ok(self.db.evict_synced_media(cutoff).await?)
    }
}

fn new_media(job: &Job, kind: MediaKind, payload: Vec<u8>, mime_type: &str) -> Media {
    Media {
        id: Uuid::new_v4(),
        job_id: job.id.clone(),
        kind,
        size_bytes: payload.len() as u64,
        payload,
        mime_type: mime_type.to_string(),
        captured_at: Utc::now(),
        synced: false,
        attempts: 0,
        remote_url: None,
        needs_compression: false,
        metadata: MediaMetadata {
            job_title: Some(job.title.clone()),
            customer: job.customer.clone(),
            vehicle: job.vehicle.clone(),
            width: None,
            height: None,
        },
        evicted: false,
    }
}
