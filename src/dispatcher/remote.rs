//! Remote execution backend: submits jobs to an external task broker.
//!
//! The broker is a small HTTP gateway in front of the worker fleet. Jobs
//! submitted here run on workers that share the download volume with this
//! service, so artifact paths reported back are directly readable. Task
//! state is polled on demand (status requests), never pushed.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{BrokerError, Result};

/// Name of the broker task that performs a download
const DOWNLOAD_TASK: &str = "download_media";

/// Timeout applied to submit and status calls (the probe has its own,
/// much shorter limit from config)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the task broker
#[derive(Clone, Debug)]
pub(crate) struct BrokerClient {
    base_url: String,
    client: reqwest::Client,
}

/// Response to a task submission
#[derive(Debug, Deserialize)]
struct SubmittedTask {
    #[serde(alias = "taskId", alias = "id")]
    task_id: Option<String>,
}

/// Remote task state as reported by the broker
#[derive(Debug, Deserialize)]
pub(crate) struct TaskStatus {
    pub(crate) state: String,
    pub(crate) info: Option<TaskInfo>,
}

/// Task metadata attached to a state report
///
/// Workers fill in different subsets depending on the state: progress while
/// running, a file path on success, a message on failure.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct TaskInfo {
    pub(crate) progress: Option<f32>,
    #[serde(alias = "filePath")]
    pub(crate) file_path: Option<String>,
    pub(crate) message: Option<String>,
}

impl BrokerClient {
    /// Connect to the broker, verifying it answers a health probe
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ProbeFailed`] when the broker does not answer
    /// within `probe_timeout` or answers with a non-success status. The
    /// caller treats any error as "run locally instead".
    pub(crate) async fn connect(base_url: &str, probe_timeout: Duration) -> Result<Self> {
        let broker = Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        };
        broker.probe(probe_timeout).await?;
        Ok(broker)
    }

    async fn probe(&self, probe_timeout: Duration) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = tokio::time::timeout(probe_timeout, self.client.get(&url).send())
            .await
            .map_err(|_| {
                BrokerError::ProbeFailed(format!(
                    "no response within {} ms",
                    probe_timeout.as_millis()
                ))
            })?
            .map_err(|e| BrokerError::ProbeFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BrokerError::ProbeFailed(format!(
                "health endpoint returned {}",
                response.status()
            ))
            .into());
        }
        Ok(())
    }

    /// Submit a download task, returning the broker's task id
    ///
    /// The task id doubles as the job id on this side, so no translation
    /// table is needed between the two systems.
    pub(crate) async fn submit_task(
        &self,
        url: &str,
        format: &str,
        filename: Option<&str>,
    ) -> Result<String> {
        let body = serde_json::json!({
            "task": DOWNLOAD_TASK,
            "args": {
                "url": url,
                "format": format,
                "filename": filename,
            },
        });

        let response = self
            .client
            .post(format!("{}/tasks", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| BrokerError::SubmitFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(
                BrokerError::SubmitFailed(format!("broker returned {}", response.status())).into(),
            );
        }

        let submitted: SubmittedTask = response
            .json()
            .await
            .map_err(|e| BrokerError::InvalidResponse(e.to_string()))?;
        submitted.task_id.ok_or_else(|| {
            BrokerError::InvalidResponse("response missing task id".to_string()).into()
        })
    }

    /// Fetch the current state of a task
    pub(crate) async fn task_status(&self, task_id: &str) -> Result<TaskStatus> {
        let response = self
            .client
            .get(format!("{}/tasks/{}", self.base_url, task_id))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| BrokerError::StatusFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(
                BrokerError::StatusFailed(format!("broker returned {}", response.status())).into(),
            );
        }

        response
            .json()
            .await
            .map_err(|e| BrokerError::InvalidResponse(e.to_string()).into())
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }
}
