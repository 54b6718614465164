//! Job dispatch and execution backends.
//!
//! The `Dispatcher` owns the job store, the media fetcher, and whichever
//! execution backend startup probing selected:
//! - [`local`] - In-process fetches behind a concurrency gate
//! - [`remote`] - Submission to an external task broker
//! - [`task`] - Fetch execution for the local backend
//! - [`cleanup`] - Periodic record and artifact expiry

mod cleanup;
mod local;
mod remote;
mod task;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, FetchError, JobError, Result};
use crate::fetcher::{MediaFetcher, YtDlpFetcher};
use crate::store::JobStore;
use crate::types::{Event, HealthStatus, Job, JobId, JobState, PreviewInfo, SubmitRequest};
use crate::validation;

use local::LocalBackend;
use remote::{BrokerClient, TaskStatus};

/// How long shutdown waits for active fetches to record a final state
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Execution backend, chosen once per process
///
/// The choice is made at startup and never revisited: a broker that comes
/// up later is not adopted until restart, and one that goes away later
/// surfaces as failed status refreshes rather than silent rerouting.
pub(crate) enum Backend {
    /// Fetches run in this process
    Local(LocalBackend),
    /// Fetches run on remote workers reached through a task broker
    Remote(BrokerClient),
}

impl Backend {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Backend::Local(_) => "local",
            Backend::Remote(_) => "remote",
        }
    }
}

/// Main dispatcher instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Dispatcher {
    /// Job records, process-local (lost on restart by design)
    pub(crate) store: Arc<JobStore>,
    /// Media fetcher used for local execution and previews
    pub(crate) fetcher: Arc<dyn MediaFetcher>,
    /// Execution backend selected at startup
    pub(crate) backend: Arc<Backend>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Flag cleared during shutdown so no new jobs are accepted
    pub(crate) accepting_new: Arc<AtomicBool>,
}

/// Probe for the configured broker, falling back to local execution
async fn select_backend(config: &Config) -> Backend {
    if let Some(url) = &config.broker.url {
        match BrokerClient::connect(url, config.probe_timeout()).await {
            Ok(client) => {
                tracing::info!(broker = %url, "Task broker selected for execution");
                return Backend::Remote(client);
            }
            Err(e) => {
                tracing::warn!(broker = %url, error = %e, "Task broker unreachable, using local execution");
            }
        }
    }
    Backend::Local(LocalBackend::new(config.download.max_concurrent_fetches))
}

impl Dispatcher {
    /// Create a dispatcher with the default yt-dlp fetcher
    ///
    /// This initializes all core components:
    /// - Creates the download directory
    /// - Locates the fetcher binary
    /// - Probes for the task broker and selects the execution backend
    /// - Starts the cleanup task (when enabled)
    ///
    /// A missing fetcher binary is not an error; the service starts and
    /// reports the condition through its health endpoint while every local
    /// fetch fails with a tool-missing message.
    pub async fn new(config: Config) -> Result<Self> {
        let fetcher: Arc<dyn MediaFetcher> = Arc::new(YtDlpFetcher::new(&config.tools));
        Self::with_fetcher(config, fetcher).await
    }

    /// Create a dispatcher with a custom [`MediaFetcher`] implementation
    pub async fn with_fetcher(config: Config, fetcher: Arc<dyn MediaFetcher>) -> Result<Self> {
        tokio::fs::create_dir_all(config.download_dir())
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download_dir().display(),
                        e
                    ),
                ))
            })?;

        // Create broadcast channel with buffer size of 1000 events
        // This allows multiple subscribers to receive all events independently
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        tracing::info!(
            fetcher = fetcher.name(),
            available = fetcher.is_available(),
            "Media fetcher initialized"
        );
        if !fetcher.is_available() {
            tracing::warn!("Fetcher binary not found; downloads will fail until it is installed");
        }

        let backend = select_backend(&config).await;
        tracing::info!(
            backend = backend.name(),
            max_concurrent = config.download.max_concurrent_fetches,
            "Execution backend selected"
        );

        let dispatcher = Self {
            store: Arc::new(JobStore::new()),
            fetcher,
            backend: Arc::new(backend),
            event_tx,
            config: Arc::new(config),
            accepting_new: Arc::new(AtomicBool::new(true)),
        };

        if dispatcher.config.cleanup.enabled {
            dispatcher.start_cleanup_task();
        }

        Ok(dispatcher)
    }

    /// Accept a new download job
    ///
    /// Validation failures surface synchronously, before any record exists;
    /// everything after acceptance is reported through the job record. The
    /// returned job is the freshly created Queued snapshot, already carrying
    /// the id a client polls with.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Job> {
        validation::validate_url(&request.url)?;
        if let Some(name) = request.filename.as_deref() {
            validation::validate_filename(name)?;
        }
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let SubmitRequest {
            url,
            format,
            filename,
        } = request;
        let job = match self.backend.as_ref() {
            Backend::Local(local) => {
                let job = self.store.create(url, format, filename).await;
                // Queued goes out before the task spawns so subscribers
                // never see Started first
                self.emit_event(Event::Queued {
                    id: job.id.clone(),
                    url: job.url.clone(),
                });
                local.execute(self, &job).await;
                job
            }
            Backend::Remote(broker) => {
                let task_id = broker.submit_task(&url, &format, filename.as_deref()).await?;
                let job = self.store.create_remote(task_id, url, format, filename).await;
                self.emit_event(Event::Queued {
                    id: job.id.clone(),
                    url: job.url.clone(),
                });
                job
            }
        };

        tracing::info!(download_id = %job.id, backend = self.backend.name(), "Download accepted");
        Ok(job)
    }

    /// Current snapshot of a job
    ///
    /// On the remote backend the broker is polled first so the snapshot
    /// reflects worker-side state; every mapping goes through the store,
    /// which enforces the lifecycle rules either way.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] when no record exists for `id`.
    pub async fn status(&self, id: &JobId) -> Result<Job> {
        if let Backend::Remote(broker) = self.backend.as_ref() {
            self.refresh_remote(broker, id).await;
        }
        self.store
            .get(id)
            .await
            .ok_or_else(|| JobError::NotFound { id: id.clone() }.into())
    }

    async fn refresh_remote(&self, broker: &BrokerClient, id: &JobId) {
        let Some(job) = self.store.get(id).await else {
            return;
        };
        // Terminal records are frozen; skip the round trip
        if job.state.is_terminal() {
            return;
        }
        let Some(task_id) = job.remote_task_id.clone() else {
            return;
        };

        match broker.task_status(&task_id).await {
            Ok(status) => self.apply_remote_status(id, job.state, status).await,
            Err(e) => {
                tracing::warn!(download_id = %id, error = %e, "Could not refresh remote task status");
            }
        }
    }

    /// Fold a broker state report into the job record
    async fn apply_remote_status(&self, id: &JobId, prior: JobState, status: TaskStatus) {
        let info = status.info.unwrap_or_default();
        match JobState::from_broker_state(&status.state) {
            Some(JobState::Queued) => {}
            Some(JobState::InProgress) => {
                if self.store.transition_to_running(id).await.is_ok() && prior == JobState::Queued {
                    self.emit_event(Event::Started { id: id.clone() });
                }
                if let Some(percent) = info.progress {
                    self.store.record_progress(id, percent).await;
                }
            }
            Some(JobState::Finished) => match info.file_path {
                Some(path) => {
                    let path = PathBuf::from(path);
                    match self.store.complete(id, path.clone()).await {
                        Ok(()) => self.emit_event(Event::Finished {
                            id: id.clone(),
                            artifact_path: path,
                        }),
                        Err(e) => {
                            tracing::warn!(download_id = %id, error = %e, "Could not record remote completion");
                        }
                    }
                }
                None => {
                    let message = "Remote worker reported success without a file path";
                    tracing::error!(download_id = %id, "{}", message);
                    if self.store.fail(id, message).await.is_ok() {
                        self.emit_event(Event::Failed {
                            id: id.clone(),
                            error: message.to_string(),
                        });
                    }
                }
            },
            Some(JobState::Failed) => {
                let message = info
                    .message
                    .unwrap_or_else(|| "Remote task failed".to_string());
                if self.store.fail(id, message.clone()).await.is_ok() {
                    self.emit_event(Event::Failed {
                        id: id.clone(),
                        error: message,
                    });
                }
            }
            None => {
                tracing::warn!(download_id = %id, state = %status.state, "Unrecognized broker task state");
            }
        }
    }

    /// Retrieve media metadata without downloading
    ///
    /// Always runs through the local fetcher, even on the remote backend;
    /// metadata extraction is cheap enough not to round-trip through the
    /// broker.
    pub async fn preview(&self, url: &str) -> Result<PreviewInfo> {
        validation::validate_url(url)?;
        tokio::time::timeout(self.config.fetch_timeout(), self.fetcher.preview(url))
            .await
            .map_err(|_| {
                Error::Fetch(FetchError::TimedOut {
                    seconds: self.config.download.fetch_timeout_secs,
                })
            })?
    }

    /// Service health summary
    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            backend: self.backend.name().to_string(),
            fetcher_available: self.fetcher.is_available(),
            broker: match self.backend.as_ref() {
                Backend::Remote(client) => Some(client.base_url().to_string()),
                Backend::Local(_) => None,
            },
        }
    }

    /// Gracefully shut down the dispatcher
    ///
    /// This performs the shutdown sequence:
    /// 1. Stops accepting new jobs
    /// 2. Cancels active local fetches via their cancellation tokens
    /// 3. Waits for them to record a final state, with a timeout
    /// 4. Emits the shutdown event
    ///
    /// Remote tasks keep running on their workers; only this process's view
    /// of them stops.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating graceful shutdown");
        self.accepting_new.store(false, Ordering::SeqCst);

        if let Backend::Local(local) = self.backend.as_ref() {
            local.cancel_all().await;
            if tokio::time::timeout(SHUTDOWN_GRACE, local.wait_idle())
                .await
                .is_err()
            {
                tracing::warn!("Timeout waiting for active downloads, proceeding with shutdown");
            }
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
    }

    /// Subscribe to job events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all
    /// events independently. Events are buffered, but a subscriber that
    /// falls behind by more than 1000 events observes a `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use media_dl::{Config, Dispatcher};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let dispatcher = Dispatcher::new(Config::default()).await?;
    ///
    ///     let mut events = dispatcher.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "job event");
    ///         }
    ///     });
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    ///
    /// The configuration is wrapped in an Arc, so this is a cheap clone.
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Read access to the job store, for embedders that want to inspect
    /// job records directly instead of going through the REST API
    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped
    /// (ok() converts Err to None). Job processing never depends on anyone
    /// listening.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Spawn the REST API server in a background task
    ///
    /// The server runs concurrently with job processing and listens on the
    /// configured bind address (default: 127.0.0.1:8000).
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let dispatcher = self.clone();
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(dispatcher, config).await })
    }
}
