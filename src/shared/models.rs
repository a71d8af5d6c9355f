//! Field Data Records
//!
//! Records created or cached by the field client. Every device-created record
//! carries a v4 UUID generated on the device; that identifier doubles as the
//! idempotency key the server uses to de-duplicate repeated deliveries.
//!
//! # Records
//!
//! - [`Job`] - assigned work, pulled from the server and cached read-only
//! - [`TimeLog`] - one event of the work timer (append-only)
//! - [`Media`] - a captured photo or video
//! - [`PartsUsage`] - a scanned or typed part code consumed on a job
//! - [`SyncQueueItem`] - a pending delivery of one of the above

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::shared::error::SharedError;

/// Server-owned job status.
///
/// Unknown server values are kept verbatim so a newer server never breaks the
/// offline cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Open,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
    Other(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Open => "open",
            JobStatus::InProgress => "in_progress",
            JobStatus::OnHold => "on_hold",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Other(value) => value,
        }
    }
}

impl From<String> for JobStatus {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().replace(' ', "_").as_str() {
            "open" => JobStatus::Open,
            "in_progress" => JobStatus::InProgress,
            "on_hold" => JobStatus::OnHold,
            "completed" => JobStatus::Completed,
            "cancelled" => JobStatus::Cancelled,
            _ => JobStatus::Other(value),
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Job priority as assigned by the workshop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// A unit of assigned work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Server identifier (e.g. `JOB-2024-00017`)
    pub id: String,
    pub title: String,
    /// Customer reference
    pub customer: Option<String>,
    /// Vehicle reference (plate or fleet number)
    pub vehicle: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub priority: Priority,
    /// When this copy was fetched from the server
    #[serde(default = "Utc::now")]
    pub fetched_at: DateTime<Utc>,
}

/// Action recorded by a [`TimeLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeAction {
    Start,
    Pause,
    Resume,
    BreakStart,
    BreakEnd,
    Stop,
    ManualEntry,
}

impl TimeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeAction::Start => "start",
            TimeAction::Pause => "pause",
            TimeAction::Resume => "resume",
            TimeAction::BreakStart => "break_start",
            TimeAction::BreakEnd => "break_end",
            TimeAction::Stop => "stop",
            TimeAction::ManualEntry => "manual_entry",
        }
    }
}

impl fmt::Display for TimeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of break taken during a work session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BreakKind {
    Lunch,
    Prayer,
    #[default]
    Rest,
    Other,
}

/// A break inside a work session. `ended_at` is `None` while the break is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Break {
    pub kind: BreakKind,
    pub reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Break {
    /// Duration of the break, measured up to `now` while it is still open.
    pub fn duration_secs(&self, now: DateTime<Utc>) -> i64 {
        let end = self.ended_at.unwrap_or(now);
        (end - self.started_at).num_seconds().max(0)
    }
}

/// Immutable record of one timer transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeLog {
    pub id: Uuid,
    pub job_id: String,
    pub action: TimeAction,
    pub timestamp: DateTime<Utc>,
    /// Cumulative elapsed seconds of the session at this event
    pub elapsed_secs: i64,
    /// Cumulative work seconds (elapsed minus breaks) at this event
    pub work_secs: i64,
    /// Total break seconds at this event
    pub break_secs: i64,
    /// Snapshot of the session's breaks at this event
    #[serde(default)]
    pub breaks: Vec<Break>,
    /// Justification for manual entries, reason for breaks
    pub reason: Option<String>,
    #[serde(default)]
    pub synced: bool,
    pub server_timestamp: Option<DateTime<Utc>>,
}

/// Kind of captured media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

/// Snapshot of job context kept with media for offline display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MediaMetadata {
    pub job_title: Option<String>,
    pub customer: Option<String>,
    pub vehicle: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A captured photo or video.
///
/// The binary payload is stored in its own column and never serialized into
/// the JSON body of the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub id: Uuid,
    pub job_id: String,
    pub kind: MediaKind,
    #[serde(skip)]
    pub payload: Vec<u8>,
    pub size_bytes: u64,
    pub mime_type: String,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub synced: bool,
    #[serde(default)]
    pub attempts: u32,
    pub remote_url: Option<String>,
    #[serde(default)]
    pub needs_compression: bool,
    #[serde(default)]
    pub metadata: MediaMetadata,
    /// Payload dropped locally by the retention policy after sync
    #[serde(default)]
    pub evicted: bool,
}

/// Display enrichment returned by the part lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartInfo {
    pub code: String,
    pub name: String,
    pub price: Option<f64>,
    pub stock: Option<f64>,
}

/// A part consumed on a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartsUsage {
    pub id: Uuid,
    pub job_id: String,
    /// Barcode or part code as scanned or typed
    pub code: String,
    pub quantity: f64,
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub synced: bool,
    #[serde(default)]
    pub attempts: u32,
    /// Optional lookup result, display only
    #[serde(default)]
    pub part: Option<PartInfo>,
}

/// Discriminates what a queue item delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadType {
    TimeLog,
    Media,
    PartsUsage,
}

impl PayloadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadType::TimeLog => "time_log",
            PayloadType::Media => "media",
            PayloadType::PartsUsage => "parts_usage",
        }
    }
}

impl FromStr for PayloadType {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time_log" => Ok(PayloadType::TimeLog),
            "media" => Ok(PayloadType::Media),
            "parts_usage" => Ok(PayloadType::PartsUsage),
            other => Err(SharedError::validation(
                "payload_type",
                format!("unknown payload type '{}'", other),
            )),
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery state of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Eligible for delivery once `next_attempt_at` has passed
    Pending,
    /// Attempt budget used up; waits for a manual retry
    Exhausted,
    /// Refused by the server (validation or conflict); needs user attention
    Rejected,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueState::Pending => "pending",
            QueueState::Exhausted => "exhausted",
            QueueState::Rejected => "rejected",
        }
    }
}

impl FromStr for QueueState {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueState::Pending),
            "exhausted" => Ok(QueueState::Exhausted),
            "rejected" => Ok(QueueState::Rejected),
            other => Err(SharedError::validation(
                "state",
                format!("unknown queue state '{}'", other),
            )),
        }
    }
}

/// A not-yet-acknowledged delivery of one local record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    pub id: Uuid,
    pub payload_type: PayloadType,
    /// Identifier of the record in its own table
    pub record_id: String,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub state: QueueState,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
