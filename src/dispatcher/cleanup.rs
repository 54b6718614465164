//! Periodic cleanup of finished job records and aged artifact files.

use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::config::Config;
use crate::store::JobStore;

use super::Dispatcher;

impl Dispatcher {
    /// Start the periodic cleanup task
    ///
    /// Each sweep drops terminal job records older than the configured TTL,
    /// deletes their artifacts, and removes aged files left in the download
    /// directory by earlier runs of the service.
    pub(crate) fn start_cleanup_task(&self) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.cleanup_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a fresh start
            // does not race jobs submitted right after boot.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sweep_once(&store, &config).await;
            }
        });

        tracing::info!(
            ttl_secs = self.config.cleanup.ttl_secs,
            interval_secs = self.config.cleanup.interval_secs,
            "Cleanup task started"
        );
        handle
    }
}

/// One cleanup pass over the store and the download directory
pub(crate) async fn sweep_once(store: &JobStore, config: &Config) {
    let ttl = config.cleanup_ttl();

    // Expired records first, then their files, so a file fetch racing the
    // sweep sees "unknown download" rather than a missing artifact.
    let expired = store.remove_expired(ttl).await;
    let mut removed_files = 0usize;
    for job in &expired {
        if let Some(path) = &job.artifact_path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => removed_files += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Could not delete artifact");
                }
            }
        }
    }

    removed_files += sweep_aged_files(config.download_dir(), ttl).await;

    if expired.is_empty() && removed_files == 0 {
        tracing::debug!("Cleanup sweep found nothing to remove");
    } else {
        tracing::info!(
            expired_jobs = expired.len(),
            removed_files,
            "Cleanup sweep complete"
        );
    }
}

/// Remove files in `dir` whose modification time is older than `ttl`
///
/// Covers artifacts orphaned by restarts, which no job record points to
/// anymore. Files younger than the TTL are always left alone; the TTL must
/// exceed the fetch timeout or an unusually long download could lose its
/// partial file mid-fetch.
async fn sweep_aged_files(dir: &Path, ttl: Duration) -> usize {
    let cutoff = SystemTime::now()
        .checked_sub(ttl)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Could not scan download directory");
            return 0;
        }
    };

    let mut removed = 0usize;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) else {
            continue;
        };
        if modified >= cutoff {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => {
                tracing::debug!(path = %entry.path().display(), "Removed aged file");
                removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "Could not remove aged file");
            }
        }
    }
    removed
}
