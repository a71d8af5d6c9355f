//! Application configuration module
//!
//! Provides the validated settings shared by every client component and a
//! builder to assemble them. Source resolution (file, environment) lives in
//! `client::config`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default server URL
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";

/// Caching rules as declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Path prefixes served network-first (dynamic data)
    pub data_prefixes: Vec<String>,
    /// File extensions served cache-first (immutable bundled assets)
    pub asset_extensions: Vec<String>,
    /// Path prefixes never cached (sync RPCs, auth)
    pub passthrough_prefixes: Vec<String>,
    /// Body returned for document requests when offline with no cached copy
    pub offline_page: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            data_prefixes: vec!["/api/resource/".to_string(), "/api/method/fieldops.api.get_".to_string()],
            asset_extensions: ["js", "css", "png", "jpg", "svg", "woff2", "ico", "json"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            passthrough_prefixes: vec![
                "/api/method/fieldops.api.sync_".to_string(),
                "/api/method/login".to_string(),
                "/api/method/logout".to_string(),
            ],
            offline_page: "<!doctype html><title>Offline</title><p>You are offline. Your work is saved on this device and will sync when the connection returns.</p>".to_string(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// ERP server base URL
    pub server_url: String,
    /// API key half of the token credentials
    pub api_key: Option<String>,
    /// API secret half of the token credentials
    pub api_secret: Option<String>,
    /// Directory holding the local database
    pub data_dir: Option<PathBuf>,
    /// Interval between connectivity probes
    pub heartbeat_interval: Duration,
    /// Timeout of a single connectivity probe
    pub heartbeat_timeout: Duration,
    /// Timeout of a single data RPC
    pub request_timeout: Duration,
    /// Timeout of a single media upload
    pub upload_timeout: Duration,
    /// Periodic background sweep interval
    pub sync_interval: Duration,
    /// Base delay multiplied by the attempt count between retries
    pub retry_base_delay: Duration,
    /// Attempts before a queue item waits for a manual retry
    pub max_attempts: u32,
    /// Local storage budget for records and media
    pub storage_quota_bytes: u64,
    /// Longest photo edge after downscaling
    pub max_photo_dimension: u32,
    /// JPEG quality of stored photos (1-100)
    pub photo_quality: u8,
    /// Videos larger than this are flagged for compression
    pub video_compress_threshold_bytes: u64,
    /// Synced media payloads older than this are evicted
    pub media_retention_days: u32,
    /// How long a barcode scan waits for a decode
    pub scan_window: Duration,
    /// Timeout of the part lookup enrichment
    pub lookup_timeout: Duration,
    /// Caching rules
    pub cache: CacheSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            api_key: None,
            api_secret: None,
            data_dir: None,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(20),
            upload_timeout: Duration::from_secs(120),
            sync_interval: Duration::from_secs(60),
            retry_base_delay: Duration::from_secs(5),
            max_attempts: 3,
            storage_quota_bytes: 512 * 1024 * 1024,
            max_photo_dimension: 1920,
            photo_quality: 80,
            video_compress_threshold_bytes: 50 * 1024 * 1024,
            media_retention_days: 30,
            scan_window: Duration::from_secs(15),
            lookup_timeout: Duration::from_secs(5),
            cache: CacheSettings::default(),
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.server_url.clone()));
        }
        if self.api_key.is_some() != self.api_secret.is_some() {
            return Err(ConfigError::MissingValue("api_key and api_secret must be set together"));
        }
        let intervals = [
            ("heartbeat_interval", self.heartbeat_interval),
            ("heartbeat_timeout", self.heartbeat_timeout),
            ("request_timeout", self.request_timeout),
            ("upload_timeout", self.upload_timeout),
            ("sync_interval", self.sync_interval),
            ("scan_window", self.scan_window),
        ];
        for (name, value) in intervals {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: name,
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        if !(1..=100).contains(&self.photo_quality) {
            return Err(ConfigError::InvalidValue {
                field: "photo_quality",
                message: format!("{} is outside 1-100", self.photo_quality),
            });
        }
        if self.max_photo_dimension < 64 {
            return Err(ConfigError::InvalidValue {
                field: "max_photo_dimension",
                message: "must be at least 64 pixels".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the token credentials
    pub fn credentials(mut self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self.config.api_secret = Some(secret.into());
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = Some(dir.into());
        self
    }

    pub fn heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self.config.heartbeat_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn upload_timeout(mut self, timeout: Duration) -> Self {
        self.config.upload_timeout = timeout;
        self
    }

    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.config.sync_interval = interval;
        self
    }

    /// Set the retry policy: `base_delay × attempts`, at most `max_attempts`
    pub fn retry(mut self, base_delay: Duration, max_attempts: u32) -> Self {
        self.config.retry_base_delay = base_delay;
        self.config.max_attempts = max_attempts;
        self
    }

    pub fn storage_quota_bytes(mut self, bytes: u64) -> Self {
        self.config.storage_quota_bytes = bytes;
        self
    }

    pub fn photo(mut self, max_dimension: u32, quality: u8) -> Self {
        self.config.max_photo_dimension = max_dimension;
        self.config.photo_quality = quality;
        self
    }

    pub fn video_compress_threshold_bytes(mut self, bytes: u64) -> Self {
        self.config.video_compress_threshold_bytes = bytes;
        self
    }

    pub fn media_retention_days(mut self, days: u32) -> Self {
        self.config.media_retention_days = days;
        self
    }

    pub fn scan_window(mut self, window: Duration) -> Self {
        self.config.scan_window = window;
        self
    }

    pub fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.config.lookup_timeout = timeout;
        self
    }

    pub fn cache(mut self, cache: CacheSettings) -> Self {
        self.config.cache = cache;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
    #[error("failed to read config file {path}: {message}")]
    File { path: String, message: String },
}
