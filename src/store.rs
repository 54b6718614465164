//! In-memory job store
//!
//! Holds every job record for the lifetime of the process. Records live in a
//! single map behind an async RwLock; each mutation takes the write lock for
//! the whole read-modify-write, so observers never see a partially updated
//! record. State is process-local by design: a restart forgets all jobs and
//! clients receive 404 for ids issued before the restart.
//!
//! Lifecycle rules enforced here, on every path that mutates a record:
//! - `Queued -> InProgress -> {Finished, Failed}`; terminal states are frozen
//! - re-asserting the terminal outcome a job already has is a no-op, a
//!   contradicting terminal write is an [`InvalidTransition`](crate::error::JobError) error
//! - progress is clamped to `[0, 100]` and never decreases
//! - `artifact_path` is set exactly when Finished, `error` exactly when Failed

use crate::error::{JobError, Result};
use crate::types::{Job, JobId, JobState};
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Process-local store of download job records
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new queued job with a generated id
    pub async fn create(&self, url: String, format: String, filename: Option<String>) -> Job {
        let job = new_job(JobId::generate(), url, format, filename, None);
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id.clone(), job.clone());
        job
    }

    /// Create a queued job tracked under a broker task id
    ///
    /// The job id and the remote task id are the same string, so status
    /// lookups need no translation step. If the broker hands out a task id
    /// this process already tracks, the existing record wins.
    pub async fn create_remote(
        &self,
        task_id: String,
        url: String,
        format: String,
        filename: Option<String>,
    ) -> Job {
        let mut jobs = self.jobs.write().await;
        jobs.entry(JobId::from(task_id.clone()))
            .or_insert_with(|| {
                new_job(
                    JobId::from(task_id.clone()),
                    url,
                    format,
                    filename,
                    Some(task_id),
                )
            })
            .clone()
    }

    /// Get a snapshot of a job record
    pub async fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Mark a queued job as running
    ///
    /// Calling this on a job that is already running is a no-op; calling it
    /// on a terminal job is an error.
    pub async fn transition_to_running(&self, id: &JobId) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound { id: id.clone() })?;

        match job.state {
            JobState::Queued => {
                job.state = JobState::InProgress;
                job.updated_at = Utc::now();
                Ok(())
            }
            JobState::InProgress => Ok(()),
            from @ (JobState::Finished | JobState::Failed) => Err(JobError::InvalidTransition {
                id: id.clone(),
                from,
                to: JobState::InProgress,
            }
            .into()),
        }
    }

    /// Record a progress report for a job
    ///
    /// Reports are advisory: values are clamped to `[0, 100]`, non-increasing
    /// values are dropped, and reports for terminal or unknown jobs are
    /// ignored. Late reports from a worker that lost the race with a terminal
    /// write land here harmlessly.
    pub async fn record_progress(&self, id: &JobId, percent: f32) {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(id) {
            Some(job) if !job.state.is_terminal() => {
                let clamped = percent.clamp(0.0, 100.0);
                if clamped > job.progress {
                    job.progress = clamped;
                    job.updated_at = Utc::now();
                }
            }
            Some(_) => debug!(%id, percent, "Dropping progress report for terminal job"),
            None => debug!(%id, percent, "Dropping progress report for unknown job"),
        }
    }

    /// Mark a job as finished with the artifact it produced
    ///
    /// Progress snaps to 100. Completing an already finished job is a no-op
    /// that keeps the original artifact; completing a failed job is an error.
    pub async fn complete(&self, id: &JobId, artifact_path: PathBuf) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound { id: id.clone() })?;

        match job.state {
            JobState::Finished => Ok(()),
            JobState::Failed => Err(JobError::InvalidTransition {
                id: id.clone(),
                from: JobState::Failed,
                to: JobState::Finished,
            }
            .into()),
            _ => {
                job.state = JobState::Finished;
                job.artifact_path = Some(artifact_path);
                job.error = None;
                job.progress = 100.0;
                job.updated_at = Utc::now();
                Ok(())
            }
        }
    }

    /// Mark a job as failed with a descriptive message
    ///
    /// Failing an already failed job is a no-op that keeps the first message;
    /// failing a finished job is an error.
    pub async fn fail(&self, id: &JobId, message: impl Into<String>) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound { id: id.clone() })?;

        match job.state {
            JobState::Failed => Ok(()),
            JobState::Finished => Err(JobError::InvalidTransition {
                id: id.clone(),
                from: JobState::Finished,
                to: JobState::Failed,
            }
            .into()),
            _ => {
                job.state = JobState::Failed;
                job.error = Some(message.into());
                job.artifact_path = None;
                job.updated_at = Utc::now();
                Ok(())
            }
        }
    }

    /// Remove terminal jobs whose last update is older than `ttl`
    ///
    /// Queued and running jobs are never removed regardless of age. Returns
    /// the removed records so the caller can log them.
    pub async fn remove_expired(&self, ttl: Duration) -> Vec<Job> {
        let cutoff = Utc::now() - chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let mut jobs = self.jobs.write().await;
        let mut removed = Vec::new();
        jobs.retain(|_, job| {
            let expired = job.state.is_terminal() && job.updated_at < cutoff;
            if expired {
                removed.push(job.clone());
            }
            !expired
        });
        removed
    }

    /// Number of tracked jobs
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Whether the store tracks no jobs
    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

fn new_job(
    id: JobId,
    url: String,
    format: String,
    filename: Option<String>,
    remote_task_id: Option<String>,
) -> Job {
    let now = Utc::now();
    Job {
        id,
        url,
        format,
        filename,
        state: JobState::Queued,
        progress: 0.0,
        artifact_path: None,
        error: None,
        remote_task_id,
        created_at: now,
        updated_at: now,
    }
}
