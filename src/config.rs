//! Configuration types for media-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Download behavior configuration (destination, concurrency, timeout)
///
/// Groups settings related to how media is fetched and stored.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Destination directory for produced files (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum concurrent fetches on the local backend (default: 2)
    ///
    /// Jobs submitted beyond this limit stay queued until a slot frees up.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_fetches: usize,

    /// Per-fetch timeout in seconds (default: 300)
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_fetches: default_max_concurrent(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

/// External tool configuration (yt-dlp binary discovery)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Whether to search PATH for the fetcher binary if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            search_path: true,
        }
    }
}

/// External queue backend configuration
///
/// When `url` is unset the service never probes a broker and runs every job
/// on the local worker backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Base URL of the task gateway (default: None = local execution only)
    #[serde(default)]
    pub url: Option<String>,

    /// Timeout for the startup availability probe in seconds (default: 1)
    ///
    /// Kept short so an unreachable broker delays startup by at most this long.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: None,
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

/// Cleanup configuration for expired artifacts
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Enable periodic cleanup of old files and job records (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Age in seconds after which artifacts are removed (default: 600)
    #[serde(default = "default_cleanup_ttl_secs")]
    pub ttl_secs: u64,

    /// Interval between cleanup sweeps in seconds (default: 300)
    #[serde(default = "default_cleanup_interval_secs")]
    pub interval_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cleanup_ttl_secs(),
            interval_secs: default_cleanup_interval_secs(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:8000)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for media-dl
///
/// Fields are organized into logical sub-configs:
/// - [`download`](DownloadConfig): destination directory, concurrency, timeout
/// - [`tools`](ToolsConfig): fetcher binary discovery
/// - [`broker`](BrokerConfig): external queue backend
/// - [`cleanup`](CleanupConfig): artifact expiry
/// - [`api`](ApiConfig): REST API server
///
/// Sub-config fields are flattened for serialization so the JSON format stays
/// flat (no nesting). [`Config::from_env`] builds a configuration from the
/// process environment, which is how the server binary is configured.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Fetcher binary discovery
    #[serde(flatten)]
    pub tools: ToolsConfig,

    /// External queue backend settings
    #[serde(flatten)]
    pub broker: BrokerConfig,

    /// Artifact expiry settings
    #[serde(flatten)]
    pub cleanup: CleanupConfig,

    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,
}

// Convenience accessors: call sites that want Durations or plain refs use
// these instead of reaching through the sub-config structs.
impl Config {
    /// Destination directory for produced files
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Per-fetch timeout
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.download.fetch_timeout_secs)
    }

    /// Broker probe timeout
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.broker.probe_timeout_secs)
    }

    /// Age after which artifacts are removed
    pub fn cleanup_ttl(&self) -> Duration {
        Duration::from_secs(self.cleanup.ttl_secs)
    }

    /// Interval between cleanup sweeps
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup.interval_secs)
    }
}

impl Config {
    /// Build a configuration from the process environment
    ///
    /// Recognized variables:
    /// - `DOWNLOAD_DIR`: destination directory
    /// - `MAX_CONCURRENT_DOWNLOADS`: local worker concurrency
    /// - `DOWNLOAD_TIMEOUT_SECS`: per-fetch timeout
    /// - `YTDLP_PATH`: explicit fetcher binary path
    /// - `BROKER_URL`: task gateway base URL (empty or unset = local only)
    /// - `BROKER_PROBE_TIMEOUT_SECS`: startup probe timeout
    /// - `TEMP_FILE_TTL_MINUTES`: artifact expiry, in minutes
    /// - `CLEANUP_INTERVAL_SECS`: sweep interval
    /// - `CLEANUP_ENABLED`: "true"/"false"
    /// - `BIND_ADDRESS`: API listen address
    /// - `SWAGGER_UI`: "true"/"false"
    ///
    /// Unset variables fall back to defaults. A variable that is set but
    /// unparseable is a configuration error, not a silent fallback.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Some(dir) = std::env::var_os("DOWNLOAD_DIR") {
            config.download.download_dir = PathBuf::from(dir);
        }
        config.download.max_concurrent_fetches = parse_env(
            "MAX_CONCURRENT_DOWNLOADS",
            config.download.max_concurrent_fetches,
        )?;
        config.download.fetch_timeout_secs =
            parse_env("DOWNLOAD_TIMEOUT_SECS", config.download.fetch_timeout_secs)?;

        if let Some(path) = std::env::var_os("YTDLP_PATH") {
            config.tools.ytdlp_path = Some(PathBuf::from(path));
        }

        config.broker.url = std::env::var("BROKER_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        config.broker.probe_timeout_secs = parse_env(
            "BROKER_PROBE_TIMEOUT_SECS",
            config.broker.probe_timeout_secs,
        )?;

        let ttl_minutes: u64 = parse_env("TEMP_FILE_TTL_MINUTES", config.cleanup.ttl_secs / 60)?;
        config.cleanup.ttl_secs = ttl_minutes * 60;
        config.cleanup.interval_secs =
            parse_env("CLEANUP_INTERVAL_SECS", config.cleanup.interval_secs)?;
        config.cleanup.enabled = parse_env("CLEANUP_ENABLED", config.cleanup.enabled)?;

        config.api.bind_address = parse_env("BIND_ADDRESS", config.api.bind_address)?;
        config.api.swagger_ui = parse_env("SWAGGER_UI", config.api.swagger_ui)?;

        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| Error::Config {
            message: format!("invalid value {raw:?} for {key}"),
            key: Some(key.to_string()),
        }),
        Err(_) => Ok(default),
    }
}

// Default value functions
fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_max_concurrent() -> usize {
    2
}

fn default_fetch_timeout_secs() -> u64 {
    300
}

fn default_probe_timeout_secs() -> u64 {
    1
}

fn default_cleanup_ttl_secs() -> u64 {
    600
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn default_true() -> bool {
    true
}
