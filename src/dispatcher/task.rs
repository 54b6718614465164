//! Fetch task execution: the lifecycle of a single local download.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::Config;
use crate::error::FetchError;
use crate::fetcher::{FetchRequest, MediaFetcher, resolve_produced_file};
use crate::store::JobStore;
use crate::types::{Event, JobId};

/// Failure message recorded when shutdown interrupts a job
pub(super) const CANCELLED_MESSAGE: &str = "Download cancelled by shutdown";

/// Everything a fetch task needs, bundled so the spawn site stays small
pub(crate) struct FetchTaskContext {
    pub(crate) id: JobId,
    pub(crate) url: String,
    pub(crate) format: String,
    pub(crate) filename: Option<String>,
    pub(crate) store: Arc<JobStore>,
    pub(crate) fetcher: Arc<dyn MediaFetcher>,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    pub(crate) config: Arc<Config>,
    pub(crate) active_downloads:
        Arc<tokio::sync::Mutex<HashMap<JobId, tokio_util::sync::CancellationToken>>>,
    pub(crate) cancel_token: tokio_util::sync::CancellationToken,
}

impl FetchTaskContext {
    /// Deregister this job from the active map
    pub(super) async fn remove_from_active(&self) {
        let mut active = self.active_downloads.lock().await;
        active.remove(&self.id);
    }

    /// Record the failure in the store and emit the failure event
    pub(super) async fn mark_failed(&self, error: &str) {
        match self.store.fail(&self.id, error).await {
            Ok(()) => {
                self.event_tx
                    .send(Event::Failed {
                        id: self.id.clone(),
                        error: error.to_string(),
                    })
                    .ok();
            }
            Err(e) => {
                tracing::warn!(download_id = %self.id, error = %e, "Could not record failure");
            }
        }
    }
}

/// Core fetch task: runs one download to a terminal state.
///
/// Phases:
/// 1. Transition the job to InProgress
/// 2. Forward tool progress reports into the store and event stream
/// 3. Run the fetch under the configured timeout and shutdown token
/// 4. Resolve the produced file and finalize the record
///
/// The caller holds the concurrency permit for the duration of this
/// function, so every exit path below frees a slot.
pub(crate) async fn run_fetch_task(ctx: FetchTaskContext) {
    let id = ctx.id.clone();

    // Phase 1: move to InProgress
    if let Err(e) = ctx.store.transition_to_running(&id).await {
        tracing::error!(download_id = %id, error = %e, "Could not start download");
        ctx.remove_from_active().await;
        return;
    }
    ctx.event_tx.send(Event::Started { id: id.clone() }).ok();
    tracing::info!(download_id = %id, url = %ctx.url, "Download started");

    // Phase 2: progress forwarding. The sender side lives inside the fetch
    // future, so the forwarder drains and exits once the fetch concludes.
    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel();
    {
        let store = ctx.store.clone();
        let event_tx = ctx.event_tx.clone();
        let id = id.clone();
        tokio::spawn(async move {
            while let Some(percent) = progress_rx.recv().await {
                store.record_progress(&id, percent).await;
                event_tx.send(Event::Progress { id: id.clone(), percent }).ok();
            }
        });
    }

    // Phase 3: run the fetch with timeout and cancellation. Dropping the
    // fetch future terminates the underlying tool process.
    let request = FetchRequest {
        url: ctx.url.clone(),
        format: ctx.format.clone(),
        output_dir: ctx.config.download_dir().clone(),
        output_template: ctx
            .filename
            .clone()
            .unwrap_or_else(|| format!("{id}.%(ext)s")),
    };
    let timeout = ctx.config.fetch_timeout();

    let fetch_result = tokio::select! {
        result = tokio::time::timeout(timeout, ctx.fetcher.fetch(&request, progress_tx)) => Some(result),
        () = ctx.cancel_token.cancelled() => None,
    };

    match fetch_result {
        None => {
            tracing::info!(download_id = %id, "Download cancelled");
            ctx.mark_failed(CANCELLED_MESSAGE).await;
        }
        Some(Err(_elapsed)) => {
            let message = FetchError::TimedOut {
                seconds: ctx.config.download.fetch_timeout_secs,
            }
            .to_string();
            tracing::warn!(
                download_id = %id,
                timeout_secs = ctx.config.download.fetch_timeout_secs,
                "Download timed out"
            );
            ctx.mark_failed(&message).await;
        }
        Some(Ok(Err(e))) => {
            tracing::error!(download_id = %id, error = %e, "Download failed");
            ctx.mark_failed(&e.to_string()).await;
        }
        Some(Ok(Ok(()))) => {
            // Phase 4: find what the tool actually wrote and finalize
            let expected = ctx
                .filename
                .as_ref()
                .map(|name| ctx.config.download_dir().join(name));
            let resolved = resolve_produced_file(
                expected.as_deref(),
                ctx.config.download_dir(),
                &id,
                SystemTime::now(),
            );
            match resolved {
                Ok(path) => match ctx.store.complete(&id, path.clone()).await {
                    Ok(()) => {
                        tracing::info!(download_id = %id, path = %path.display(), "Download finished");
                        ctx.event_tx
                            .send(Event::Finished {
                                id: id.clone(),
                                artifact_path: path,
                            })
                            .ok();
                    }
                    Err(e) => {
                        tracing::warn!(download_id = %id, error = %e, "Could not record completion");
                    }
                },
                Err(e) => {
                    tracing::error!(download_id = %id, error = %e, "Download produced no output");
                    ctx.mark_failed(&e.to_string()).await;
                }
            }
        }
    }

    ctx.remove_from_active().await;
}
