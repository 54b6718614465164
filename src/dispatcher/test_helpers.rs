//! Shared test helpers for creating Dispatcher instances in tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::FetchError;
use crate::fetcher::{FetchRequest, MediaFetcher};
use crate::types::{FormatOption, Job, JobId, PreviewInfo};

/// Scripted behavior for a [`StubFetcher`]
#[derive(Clone)]
pub(crate) enum StubBehavior {
    /// Report the given progress values, write the output file, succeed
    Produce {
        progress: Vec<f32>,
        ext: &'static str,
        delay: Duration,
    },
    /// Fail with a tool error carrying this message
    Fail { message: String },
    /// Never complete (exercises timeout and cancellation paths)
    Hang,
}

/// In-process fetcher with scripted outcomes, no binary or network needed
pub(crate) struct StubFetcher {
    pub(crate) available: bool,
    pub(crate) behavior: StubBehavior,
}

impl StubFetcher {
    pub(crate) fn produce(ext: &'static str, progress: Vec<f32>) -> Self {
        Self::produce_after(ext, progress, Duration::ZERO)
    }

    pub(crate) fn produce_after(ext: &'static str, progress: Vec<f32>, delay: Duration) -> Self {
        Self {
            available: true,
            behavior: StubBehavior::Produce {
                progress,
                ext,
                delay,
            },
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            available: true,
            behavior: StubBehavior::Fail {
                message: message.to_string(),
            },
        }
    }

    pub(crate) fn hanging() -> Self {
        Self {
            available: true,
            behavior: StubBehavior::Hang,
        }
    }
}

#[async_trait]
impl MediaFetcher for StubFetcher {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: UnboundedSender<f32>,
    ) -> crate::Result<()> {
        match &self.behavior {
            StubBehavior::Produce {
                progress: reports,
                ext,
                delay,
            } => {
                for percent in reports {
                    progress.send(*percent).ok();
                }
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                let name = request.output_template.replace("%(ext)s", ext);
                tokio::fs::write(request.output_dir.join(name), b"media")
                    .await
                    .map_err(FetchError::Io)?;
                Ok(())
            }
            StubBehavior::Fail { message } => Err(FetchError::ToolFailed {
                exit_code: Some(1),
                stderr: message.clone(),
            }
            .into()),
            StubBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    async fn preview(&self, url: &str) -> crate::Result<PreviewInfo> {
        Ok(PreviewInfo {
            id: Some("stub".to_string()),
            url: url.to_string(),
            title: Some("Stub Clip".to_string()),
            thumbnail: None,
            duration: Some(10.0),
            formats: vec![FormatOption {
                format_id: "22".to_string(),
                ext: "mp4".to_string(),
                resolution: "720p".to_string(),
                filesize: Some(1024),
            }],
        })
    }
}

/// Build a test config rooted in a temp directory
pub(crate) fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.join("downloads");
    config.download.max_concurrent_fetches = 2;
    config.download.fetch_timeout_secs = 5;
    config.tools.search_path = false;
    config.cleanup.enabled = false;
    config
}

/// Helper to create a test Dispatcher with a stubbed fetcher.
/// Returns the dispatcher and the tempdir (which must be kept alive).
pub(crate) async fn create_test_dispatcher(
    fetcher: StubFetcher,
) -> (Dispatcher, tempfile::TempDir) {
    create_test_dispatcher_with(fetcher, |_| {}).await
}

/// Like [`create_test_dispatcher`], with a hook to adjust the config first
pub(crate) async fn create_test_dispatcher_with(
    fetcher: StubFetcher,
    configure: impl FnOnce(&mut Config),
) -> (Dispatcher, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    configure(&mut config);
    let dispatcher = Dispatcher::with_fetcher(config, Arc::new(fetcher))
        .await
        .unwrap();
    (dispatcher, temp_dir)
}

/// Poll until the job reaches a terminal state, panicking after `timeout`
pub(crate) async fn wait_for_terminal(
    dispatcher: &Dispatcher,
    id: &JobId,
    timeout: Duration,
) -> Job {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = dispatcher.status(id).await.unwrap();
        if job.state.is_terminal() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} still {:?} after {:?}",
            id,
            job.state,
            timeout
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
