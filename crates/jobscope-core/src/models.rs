//! Normalized queue/job entities shared by every broker adapter.
//!
//! These types are the adapter contract's vocabulary: a broker adapter
//! translates its native storage layout into them, and the HTTP/SSE layer
//! serializes them without further mapping. Timestamps are UTC and
//! serialize as ISO-8601 (RFC 3339).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Error;

// =============================================================================
// JOB STATUS
// =============================================================================

/// Closed enumeration of job states.
///
/// `Waiting`/`Active` are queue-position states, `Completed`/`Failed` are
/// terminal history states, `Delayed` is a scheduled-future state. `Paused`
/// is a queue-level flag reported on [`QueueSummary`] only — jobs never
/// carry it, and listing or fetching by `Paused` is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
    Paused,
}

impl JobStatus {
    /// The five statuses that map onto broker index structures.
    pub const INDEXED: [JobStatus; 5] = [
        JobStatus::Waiting,
        JobStatus::Active,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Delayed,
    ];

    /// Lowercase wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Delayed => "delayed",
            JobStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(JobStatus::Waiting),
            "active" => Ok(JobStatus::Active),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "delayed" => Ok(JobStatus::Delayed),
            "paused" => Ok(JobStatus::Paused),
            other => Err(Error::InvalidArgument(format!(
                "unknown job status: {other}"
            ))),
        }
    }
}

// =============================================================================
// QUEUES
// =============================================================================

/// Broker endpoint descriptor captured at connect time. Purely diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    /// Broker database index (Redis logical db).
    pub db: i64,
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Snapshot of one discovered queue.
///
/// Counts are captured at the moment of discovery and never cached; two
/// `discover_queues` calls may disagree under concurrent broker mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSummary {
    pub name: String,
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
    /// Queue-level pause flag from the broker's queue meta record.
    pub paused: bool,
    /// Originating broker endpoint.
    pub connection: ConnectionInfo,
}

// =============================================================================
// JOBS
// =============================================================================

/// Terminal error record of a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    /// Failure reason as recorded by the broker.
    pub message: String,
    /// Stack trace lines, most recent failure first.
    #[serde(default)]
    pub stack: Vec<String>,
}

/// A normalized job, identified by `(queue, id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub queue: String,
    pub status: JobStatus,
    /// Creator-defined payload. When the broker-side JSON is malformed the
    /// raw string is surfaced here instead of failing the fetch, so callers
    /// can inspect broken jobs.
    pub payload: JsonValue,
    /// Return value of a completed job, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    /// Terminal error record; present whenever `status` is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    /// Processing attempts made so far.
    pub attempts: u32,
    /// Configured attempt bound, when the producer set one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// When processing started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Scheduled release time; only meaningful for delayed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delayed_until: Option<DateTime<Utc>>,
}

// =============================================================================
// METRICS
// =============================================================================

/// Per-queue rolling metrics snapshot.
///
/// Computed over the newest N terminal jobs (the sampling horizon,
/// default [`crate::defaults::METRICS_SAMPLE_SIZE`]), not the full history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMetrics {
    /// Jobs terminated (completed + failed) within the last hour, counted
    /// over the sample. Boundary is inclusive.
    pub throughput: u64,
    /// Failed fraction of the sampled terminal population, in `[0, 1]`.
    /// Zero when the sample is empty.
    pub failure_rate: f64,
    /// Mean `finished - started` over the sampled completed jobs with both
    /// timestamps present, in milliseconds. Zero when no valid sample.
    pub avg_processing_ms: f64,
}

impl QueueMetrics {
    /// All-zero snapshot for a queue with no terminal history.
    pub fn zero() -> Self {
        Self {
            throughput: 0,
            failure_rate: 0.0,
            avg_processing_ms: 0.0,
        }
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// Semantic kind of a job-lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobEventKind {
    /// Job record was created or mutated.
    Updated,
    /// Job record was deleted.
    Removed,
    /// A job entered the wait list.
    Waiting,
    /// A job left the wait list.
    Dequeued,
    /// A job entered the active list.
    Active,
    /// A job was added to the completed set.
    Completed,
    /// A job was added to the failed set.
    Failed,
    /// A job was added to the delayed set.
    Delayed,
}

impl JobEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobEventKind::Updated => "updated",
            JobEventKind::Removed => "removed",
            JobEventKind::Waiting => "waiting",
            JobEventKind::Dequeued => "dequeued",
            JobEventKind::Active => "active",
            JobEventKind::Completed => "completed",
            JobEventKind::Failed => "failed",
            JobEventKind::Delayed => "delayed",
        }
    }
}

impl fmt::Display for JobEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One translated job-state-change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub kind: JobEventKind,
    pub queue: String,
    /// Empty for queue-index events that do not carry the id inline.
    pub job_id: String,
    pub timestamp: DateTime<Utc>,
}
