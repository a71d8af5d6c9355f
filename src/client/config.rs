//! Client configuration
//!
//! Resolves [`AppConfig`] from its sources. Later sources win:
//! built-in defaults, then the TOML file (`$FIELDOPS_CONFIG` or
//! `<data dir>/fieldops/config.toml`), then `FIELDOPS_*` environment variables.

use crate::shared::config::{AppConfig, AppConfigBuilder, CacheSettings, ConfigError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_CONFIG_FILE: &str = "FIELDOPS_CONFIG";
const ENV_SERVER_URL: &str = "FIELDOPS_SERVER_URL";
const ENV_API_KEY: &str = "FIELDOPS_API_KEY";
const ENV_API_SECRET: &str = "FIELDOPS_API_SECRET";
const ENV_DATA_DIR: &str = "FIELDOPS_DATA_DIR";

/// Settings as written in the config file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    server_url: Option<String>,
    api_key: Option<String>,
    api_secret: Option<String>,
    data_dir: Option<PathBuf>,
    heartbeat_interval_secs: Option<u64>,
    heartbeat_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    upload_timeout_secs: Option<u64>,
    sync_interval_secs: Option<u64>,
    retry_base_delay_secs: Option<u64>,
    max_attempts: Option<u32>,
    storage_quota_mb: Option<u64>,
    max_photo_dimension: Option<u32>,
    photo_quality: Option<u8>,
    video_compress_threshold_mb: Option<u64>,
    media_retention_days: Option<u32>,
    scan_window_secs: Option<u64>,
    lookup_timeout_secs: Option<u64>,
    cache: Option<CacheSettings>,
}

impl FileConfig {
    fn apply(self, mut builder: AppConfigBuilder) -> AppConfigBuilder {
        let defaults = AppConfig::default();
        let secs = Duration::from_secs;

        if let Some(url) = self.server_url {
            builder = builder.server_url(url);
        }
        if let (Some(key), Some(secret)) = (self.api_key, self.api_secret) {
            builder = builder.credentials(key, secret);
        }
        if let Some(dir) = self.data_dir {
            builder = builder.data_dir(dir);
        }
        if self.heartbeat_interval_secs.is_some() || self.heartbeat_timeout_secs.is_some() {
            builder = builder.heartbeat(
                self.heartbeat_interval_secs.map(secs).unwrap_or(defaults.heartbeat_interval),
                self.heartbeat_timeout_secs.map(secs).unwrap_or(defaults.heartbeat_timeout),
            );
        }
        if let Some(s) = self.request_timeout_secs {
            builder = builder.request_timeout(secs(s));
        }
        if let Some(s) = self.upload_timeout_secs {
            builder = builder.upload_timeout(secs(s));
        }
        if let Some(s) = self.sync_interval_secs {
            builder = builder.sync_interval(secs(s));
        }
        if self.retry_base_delay_secs.is_some() || self.max_attempts.is_some() {
            builder = builder.retry(
                self.retry_base_delay_secs.map(secs).unwrap_or(defaults.retry_base_delay),
                self.max_attempts.unwrap_or(defaults.max_attempts),
            );
        }
        if let Some(mb) = self.storage_quota_mb {
            builder = builder.storage_quota_bytes(mb * 1024 * 1024);
        }
        if self.max_photo_dimension.is_some() || self.photo_quality.is_some() {
            builder = builder.photo(
                self.max_photo_dimension.unwrap_or(defaults.max_photo_dimension),
                self.photo_quality.unwrap_or(defaults.photo_quality),
            );
        }
        if let Some(mb) = self.video_compress_threshold_mb {
            builder = builder.video_compress_threshold_bytes(mb * 1024 * 1024);
        }
        if let Some(days) = self.media_retention_days {
            builder = builder.media_retention_days(days);
        }
        if let Some(s) = self.scan_window_secs {
            builder = builder.scan_window(secs(s));
        }
        if let Some(s) = self.lookup_timeout_secs {
            builder = builder.lookup_timeout(secs(s));
        }
        if let Some(cache) = self.cache {
            builder = builder.cache(cache);
        }
        builder
    }
}

/// Application configuration wrapper.
#[derive(Debug, Clone, Default)]
pub struct Config {
    app: AppConfig,
}

impl Config {
    /// Load configuration from the config file and process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(ENV_CONFIG_FILE)
            .map(PathBuf::from)
            .or_else(default_config_path);

        let contents = match path {
            Some(ref path) if path.exists() => Some(read_file(path)?),
            _ => None,
        };

        Self::from_sources(contents.as_deref(), |name| std::env::var(name).ok())
    }

    /// Resolve configuration from file contents and an environment lookup.
    pub fn from_sources<F>(file: Option<&str>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = AppConfig::builder();

        if let Some(contents) = file {
            let parsed: FileConfig = toml::from_str(contents).map_err(|e| ConfigError::File {
                path: "config.toml".to_string(),
                message: e.to_string(),
            })?;
            builder = parsed.apply(builder);
        }

        if let Some(url) = env(ENV_SERVER_URL) {
            builder = builder.server_url(url);
        }
        if let (Some(key), Some(secret)) = (env(ENV_API_KEY), env(ENV_API_SECRET)) {
            builder = builder.credentials(key, secret);
        }
        if let Some(dir) = env(ENV_DATA_DIR) {
            builder = builder.data_dir(dir);
        }

        Self::with_builder(builder)
    }

    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        Ok(Self { app: builder.build()? })
    }

    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    pub fn server_url(&self) -> &str {
        &self.app.server_url
    }

    /// Get the full URL of a field RPC
    pub fn api_url(&self, rpc: &str) -> String {
        format!("{}/api/method/fieldops.api.{}", self.server_url(), rpc)
    }

    /// `Authorization` header value, if credentials are configured
    pub fn auth_header(&self) -> Option<String> {
        match (&self.app.api_key, &self.app.api_secret) {
            (Some(key), Some(secret)) => Some(format!("token {}:{}", key, secret)),
            _ => None,
        }
    }

    /// Directory holding the local database
    pub fn data_dir(&self) -> PathBuf {
        self.app.data_dir.clone().unwrap_or_else(|| {
            let mut dir = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
            dir.push("fieldops");
            dir
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("field.db")
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fieldops").join("config.toml"))
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::File {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
