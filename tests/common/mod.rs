//! Common test utilities for media-dl integration tests

#![allow(dead_code)]

use media_dl::{Config, Dispatcher};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A running API server bound to an OS-assigned port
pub struct TestServer {
    pub base_url: String,
    pub dispatcher: Arc<Dispatcher>,
    pub temp_dir: TempDir,
    server_handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// Build a config rooted in a fresh temp directory.
///
/// Tool discovery is disabled so tests do not depend on a yt-dlp binary
/// being installed; enable it explicitly for live tests.
pub fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.download.download_dir = temp_dir.path().join("downloads");
    config.download.fetch_timeout_secs = 10;
    config.tools.search_path = false;
    config.cleanup.enabled = false;
    config
}

/// Start the full service (dispatcher plus HTTP API) on 127.0.0.1:0
pub async fn spawn_server(configure: impl FnOnce(&mut Config)) -> TestServer {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let mut config = test_config(&temp_dir);
    configure(&mut config);

    let dispatcher = Arc::new(Dispatcher::new(config).await.expect("dispatcher"));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let app = media_dl::api::create_router(dispatcher.clone(), dispatcher.get_config());
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .await
            .expect("serve");
    });

    TestServer {
        base_url: format!("http://{addr}"),
        dispatcher,
        temp_dir,
        server_handle,
    }
}

/// Poll the status endpoint until the reported state matches, panicking on
/// timeout. Returns the last status body.
pub async fn wait_for_state(
    client: &reqwest::Client,
    base_url: &str,
    download_id: &str,
    expected: &str,
    timeout: Duration,
) -> serde_json::Value {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let body: serde_json::Value = client
            .get(format!("{base_url}/download/status/{download_id}"))
            .send()
            .await
            .expect("status request")
            .json()
            .await
            .expect("status body");

        if body["state"] == expected {
            return body;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "download {download_id} did not reach state {expected} in time, last: {body}"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
