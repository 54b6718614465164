//! Local execution backend: in-process fetches behind a concurrency gate.

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{Job, JobId};

use super::Dispatcher;
use super::task::{CANCELLED_MESSAGE, FetchTaskContext, run_fetch_task};

/// Runs fetches in this process, bounded by a counting semaphore
///
/// Every accepted job spawns a task immediately; tasks beyond the
/// concurrency limit block on the semaphore, which is exactly the queued
/// phase of the job lifecycle. No separate queue structure is needed.
#[derive(Clone)]
pub(crate) struct LocalBackend {
    /// Semaphore bounding concurrent fetches (respects max_concurrent_fetches config)
    pub(crate) concurrent_limit: Arc<tokio::sync::Semaphore>,
    /// Map of active jobs to their cancellation tokens (for shutdown)
    pub(crate) active_downloads:
        Arc<tokio::sync::Mutex<HashMap<JobId, tokio_util::sync::CancellationToken>>>,
}

impl LocalBackend {
    pub(crate) fn new(max_concurrent: usize) -> Self {
        Self {
            concurrent_limit: Arc::new(tokio::sync::Semaphore::new(max_concurrent)),
            active_downloads: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }

    /// Spawn the fetch task for an accepted job
    ///
    /// The job record must already exist in the store. The spawned task
    /// waits its turn on the semaphore, so the caller returns immediately
    /// regardless of how busy the gate is.
    pub(crate) async fn execute(&self, dispatcher: &Dispatcher, job: &Job) {
        let cancel_token = tokio_util::sync::CancellationToken::new();

        // Register the cancellation token before the task exists so
        // shutdown never misses a job that is still waiting for a slot
        {
            let mut active = self.active_downloads.lock().await;
            active.insert(job.id.clone(), cancel_token.clone());
        }

        let ctx = FetchTaskContext {
            id: job.id.clone(),
            url: job.url.clone(),
            format: job.format.clone(),
            filename: job.filename.clone(),
            store: dispatcher.store.clone(),
            fetcher: dispatcher.fetcher.clone(),
            event_tx: dispatcher.event_tx.clone(),
            config: dispatcher.config.clone(),
            active_downloads: self.active_downloads.clone(),
            cancel_token,
        };
        let concurrent_limit = self.concurrent_limit.clone();

        tokio::spawn(async move {
            // The job stays Queued until a permit frees up
            let permit = tokio::select! {
                permit = concurrent_limit.acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => {
                        // Semaphore closed, only happens when the process is going away
                        ctx.mark_failed(CANCELLED_MESSAGE).await;
                        ctx.remove_from_active().await;
                        return;
                    }
                },
                () = ctx.cancel_token.cancelled() => {
                    ctx.mark_failed(CANCELLED_MESSAGE).await;
                    ctx.remove_from_active().await;
                    return;
                }
            };

            // Held for the whole fetch; dropping it on any exit path
            // releases the slot
            let _permit = permit;
            run_fetch_task(ctx).await;
        });
    }

    /// Cancel every active or waiting job by signaling its token
    pub(crate) async fn cancel_all(&self) {
        let active = self.active_downloads.lock().await;
        tracing::debug!(active_count = active.len(), "Cancelling all active downloads");
        for (id, token) in active.iter() {
            tracing::debug!(download_id = %id, "Signaling cancellation");
            token.cancel();
        }
    }

    /// Wait until no jobs are registered as active
    pub(crate) async fn wait_idle(&self) {
        loop {
            let active_count = {
                let active = self.active_downloads.lock().await;
                active.len()
            };
            if active_count == 0 {
                return;
            }
            tracing::debug!(active_count, "Waiting for active downloads to finish");
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }

    #[cfg(test)]
    pub(crate) async fn active_count(&self) -> usize {
        self.active_downloads.lock().await.len()
    }
}
