//! Remote API
//!
//! The ERP endpoints the client talks to, behind the [`RemoteApi`] trait so
//! the sync machinery can run against an in-process double. [`HttpRemote`]
//! is the real implementation over `reqwest`.
//!
//! Every call is `POST {server}/api/method/fieldops.api.<rpc>` with
//! `Authorization: token <key>:<secret>`; the server wraps replies as
//! `{"message": ...}`. Records carry their device-generated id, which the
//! server uses to ignore repeated deliveries.

use crate::client::config::Config;
use crate::shared::{Job, Media, MediaKind, PartInfo, PartsUsage, TimeLog};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

/// Why a delivery did not go through
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Server or transport trouble that may clear up
    #[error("transient failure: {0}")]
    Transient(String),
    /// The server refused the record as invalid
    #[error("rejected by server ({status}): {message}")]
    Permanent { status: u16, message: String },
    /// The record or its job no longer exists on the server
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("request timed out")]
    Timeout,
    /// The server could not be reached at all
    #[error("offline: {0}")]
    Offline(String),
}

impl DeliveryError {
    /// Whether another attempt might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeliveryError::Transient(_) | DeliveryError::Timeout | DeliveryError::Offline(_)
        )
    }

    /// Whether the failure means the device has no connection
    pub fn is_connectivity(&self) -> bool {
        matches!(self, DeliveryError::Offline(_))
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DeliveryError::Timeout
        } else if e.is_connect() {
            DeliveryError::Offline(e.to_string())
        } else if e.is_decode() {
            DeliveryError::Transient(format!("unreadable response: {}", e))
        } else {
            DeliveryError::Transient(e.to_string())
        }
    }
}

/// Map a non-success HTTP status to a delivery error
pub fn classify_status(status: StatusCode, body: &str) -> DeliveryError {
    let message = if body.is_empty() {
        status.to_string()
    } else {
        body.chars().take(500).collect()
    };

    match status {
        StatusCode::NOT_FOUND | StatusCode::CONFLICT | StatusCode::GONE => {
            DeliveryError::Conflict(message)
        }
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => DeliveryError::Transient(message),
        s if s.is_client_error() => DeliveryError::Permanent {
            status: s.as_u16(),
            message,
        },
        _ => DeliveryError::Transient(message),
    }
}

/// Server acknowledgement of a time log
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TimeLogAck {
    #[serde(default)]
    pub server_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    message: T,
}

#[derive(Debug, Deserialize)]
struct MediaAck {
    file_url: String,
}

/// ERP endpoints used by the field client
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn send_time_log(&self, log: &TimeLog) -> Result<TimeLogAck, DeliveryError>;

    /// Upload a photo or video, returning its URL on the server
    async fn upload_media(&self, media: &Media) -> Result<String, DeliveryError>;

    async fn send_parts_usage(&self, usage: &PartsUsage) -> Result<(), DeliveryError>;

    /// Jobs assigned to the signed-in technician
    async fn fetch_jobs(&self) -> Result<Vec<Job>, DeliveryError>;

    async fn lookup_part(&self, code: &str) -> Result<Option<PartInfo>, DeliveryError>;

    /// Cheap reachability probe
    async fn ping(&self) -> Result<(), DeliveryError>;
}

/// [`RemoteApi`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpRemote {
    config: Config,
    client: Client,
}

impl HttpRemote {
    pub fn new(config: Config) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(config.app().request_timeout)
            .build()
            .map_err(|e| DeliveryError::Transient(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn post(&self, rpc: &str) -> RequestBuilder {
        let request = self.client.post(self.config.api_url(rpc));
        match self.config.auth_header() {
            Some(token) => request.header("Authorization", token),
            None => request,
        }
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, DeliveryError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        let envelope: Envelope<T> = response.json().await?;
        Ok(envelope.message)
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn send_time_log(&self, log: &TimeLog) -> Result<TimeLogAck, DeliveryError> {
        let request = self
            .post("sync_time_log")
            .header("X-Idempotency-Key", log.id.to_string())
            .json(log);
        let ack: Option<TimeLogAck> = self.call(request).await?;
        Ok(ack.unwrap_or_default())
    }

    async fn upload_media(&self, media: &Media) -> Result<String, DeliveryError> {
        let extension = match media.kind {
            MediaKind::Photo => "jpg",
            MediaKind::Video => "mp4",
        };
        let metadata = serde_json::to_string(&media.metadata)
            .map_err(|e| DeliveryError::Permanent {
                status: 0,
                message: e.to_string(),
            })?;
        let file = Part::bytes(media.payload.clone()).file_name(format!("{}.{}", media.id, extension));
        let form = Form::new()
            .text("media_id", media.id.to_string())
            .text("job_id", media.job_id.clone())
            .text("kind", extension.to_string())
            .text("mime_type", media.mime_type.clone())
            .text("captured_at", media.captured_at.to_rfc3339())
            .text("metadata", metadata)
            .part("file", file);

        let request = self
            .post("upload_media")
            .header("X-Idempotency-Key", media.id.to_string())
            .timeout(self.config.app().upload_timeout)
            .multipart(form);
        let ack: MediaAck = self.call(request).await?;
        Ok(ack.file_url)
    }

    async fn send_parts_usage(&self, usage: &PartsUsage) -> Result<(), DeliveryError> {
        let request = self
            .post("sync_parts_usage")
            .header("X-Idempotency-Key", usage.id.to_string())
            .json(usage);
        let _: serde_json::Value = self.call(request).await?;
        Ok(())
    }

    async fn fetch_jobs(&self) -> Result<Vec<Job>, DeliveryError> {
        self.call(self.post("get_assigned_jobs")).await
    }

    async fn lookup_part(&self, code: &str) -> Result<Option<PartInfo>, DeliveryError> {
        let request = self
            .post("lookup_part")
            .json(&serde_json::json!({ "code": code }));
        match self.call(request).await {
            Err(DeliveryError::Conflict(_)) => Ok(None),
            other => other,
        }
    }

    async fn ping(&self) -> Result<(), DeliveryError> {
        let url = format!("{}/api/method/ping", self.config.server_url());
        let response = self
            .client
            .get(url)
            .timeout(self.config.app().heartbeat_timeout)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(classify_status(status, ""))
        }
    }
}
