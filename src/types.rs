//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

/// Unique identifier for a download job
///
/// For jobs executed by the local worker backend this is a freshly generated
/// UUID. For jobs handed to the distributed queue backend it is the task id
/// returned by the broker, so status lookups need no translation table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job id (UUID v4)
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl PartialEq<str> for JobId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for JobId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

/// Lifecycle state of a download job
///
/// The only legal transitions are `Queued -> InProgress` and
/// `{Queued, InProgress} -> {Finished, Failed}`. Terminal states are frozen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted and waiting for an execution slot
    Queued,
    /// A worker is actively fetching the media
    InProgress,
    /// Fetch completed and the artifact was located
    Finished,
    /// Fetch failed, timed out, or the artifact could not be located
    Failed,
}

impl JobState {
    /// Whether this state is terminal (Finished or Failed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed)
    }

    /// Canonical wire name for this state
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::InProgress => "in_progress",
            JobState::Finished => "finished",
            JobState::Failed => "failed",
        }
    }

    /// Map an external queue backend's task state onto the job lifecycle
    ///
    /// The broker vocabulary (PENDING/STARTED/SUCCESS/FAILURE) never leaks
    /// past the adapter; unknown states map to `None` so the caller can log
    /// and leave the record untouched.
    pub fn from_broker_state(state: &str) -> Option<Self> {
        match state.to_ascii_uppercase().as_str() {
            "PENDING" => Some(JobState::Queued),
            "STARTED" => Some(JobState::InProgress),
            "SUCCESS" => Some(JobState::Finished),
            "FAILURE" => Some(JobState::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A download job record
///
/// Owned by the [`JobStore`](crate::store::JobStore); callers only ever see
/// cloned snapshots. Invariants maintained by the store:
/// - `artifact_path` is `Some` iff `state == Finished`
/// - `error` is `Some` iff `state == Failed`
/// - `progress` is within `[0.0, 100.0]` and never decreases
#[derive(Clone, Debug)]
pub struct Job {
    /// Unique job id
    pub id: JobId,
    /// Source media URL
    pub url: String,
    /// Requested format selector (e.g. "best", "mp4", "mp3")
    pub format: String,
    /// Caller-supplied output filename, if any
    pub filename: Option<String>,
    /// Current lifecycle state
    pub state: JobState,
    /// Download progress percentage (0.0 to 100.0)
    pub progress: f32,
    /// Path of the produced artifact (set when Finished)
    pub artifact_path: Option<PathBuf>,
    /// Failure message (set when Failed)
    pub error: Option<String>,
    /// Task id at the external queue backend, when executed remotely
    pub remote_task_id: Option<String>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the record was last modified
    pub updated_at: DateTime<Utc>,
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job accepted and recorded
    Queued {
        /// Job id
        id: JobId,
        /// Source URL
        url: String,
    },

    /// A worker started fetching the job
    Started {
        /// Job id
        id: JobId,
    },

    /// Progress update from the fetcher
    Progress {
        /// Job id
        id: JobId,
        /// Progress percentage (0.0 to 100.0)
        percent: f32,
    },

    /// Job finished and the artifact was located
    Finished {
        /// Job id
        id: JobId,
        /// Path of the produced artifact
        artifact_path: PathBuf,
    },

    /// Job failed
    Failed {
        /// Job id
        id: JobId,
        /// Failure message
        error: String,
    },

    /// Service is shutting down
    Shutdown,
}

/// Request body for submitting a download
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitRequest {
    /// Media URL to download
    pub url: String,

    /// Format selector (default: "best")
    #[serde(default = "default_format")]
    pub format: String,

    /// Optional output filename (an output template is derived from the job
    /// id when omitted)
    #[serde(default)]
    pub filename: Option<String>,
}

fn default_format() -> String {
    "best".to_string()
}

/// Request body for previewing media metadata
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PreviewRequest {
    /// Media URL to inspect
    pub url: String,
}

/// Response body for an accepted download submission
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    /// Id to poll for status and retrieve the artifact
    pub download_id: JobId,
    /// Always "queued" on acceptance
    pub status: String,
}

/// Detailed job state reported alongside the lifecycle state
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    /// Lifecycle state (repeated here to keep the info object self-contained)
    pub status: JobState,

    /// Progress percentage (0.0 to 100.0)
    pub progress_percent: f32,

    /// Path of the produced artifact, once Finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Failure message, once Failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&Job> for JobInfo {
    fn from(job: &Job) -> Self {
        Self {
            status: job.state,
            progress_percent: job.progress,
            file_path: job.artifact_path.clone(),
            message: job.error.clone(),
        }
    }
}

/// Response body for a status query
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Job id
    pub download_id: JobId,
    /// Lifecycle state
    pub state: JobState,
    /// Detailed state information
    pub info: JobInfo,
}

/// A selectable media format discovered during preview
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormatOption {
    /// Extractor-specific format id
    pub format_id: String,
    /// File extension
    pub ext: String,
    /// Quality label ("1080p", "128K", "audio only", ...)
    pub resolution: String,
    /// File size in bytes, when the extractor reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
}

/// Media metadata returned by a preview request
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreviewInfo {
    /// Extractor-specific media id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The URL the preview was requested for
    pub url: String,
    /// Media title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Thumbnail URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Downloadable formats, filtered and sorted for selection
    pub formats: Vec<FormatOption>,
}

/// Service health report
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// Overall status ("ok")
    pub status: String,
    /// Crate version
    pub version: String,
    /// Selected execution backend ("local" or "remote")
    pub backend: String,
    /// Whether the media fetcher binary was found
    pub fetcher_available: bool,
    /// Broker reachability ("ok" or an error description); absent on the
    /// local backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker: Option<String>,
}
