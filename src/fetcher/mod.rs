//! Media fetching via the external yt-dlp binary
//!
//! The [`MediaFetcher`] trait is the seam between job execution and the
//! actual download tool. The production implementation shells out to
//! yt-dlp; tests substitute a stub so lifecycle behavior can be exercised
//! without network access or the binary installed.

pub mod preview;
mod progress;
mod resolve;

pub use resolve::{RECENCY_WINDOW, resolve_produced_file};

use crate::error::FetchError;
use crate::types::PreviewInfo;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Lines of process stderr kept for failure messages
const STDERR_TAIL_LINES: usize = 10;

/// A fetch assignment handed to a [`MediaFetcher`]
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Source media URL
    pub url: String,
    /// Requested format selector ("best", "mp4", "mp3", or an extractor format id)
    pub format: String,
    /// Directory the output must land in
    pub output_dir: PathBuf,
    /// Output template relative to `output_dir`, e.g. `{job id}.%(ext)s`
    pub output_template: String,
}

/// Trait for fetching media from a URL
///
/// Implementations run one fetch to completion, reporting progress through
/// the provided channel as percentages in `[0, 100]`. Dropping the returned
/// future must terminate the underlying work; the caller relies on this to
/// enforce timeouts and shutdown.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Human-readable name for logging
    fn name(&self) -> &'static str;

    /// Whether the fetcher can run at all (e.g. its binary was found)
    fn is_available(&self) -> bool;

    /// Download the requested media into `request.output_dir`
    ///
    /// Progress percentages are sent on `progress` as the tool reports them;
    /// the receiver may be dropped at any time without failing the fetch.
    ///
    /// # Errors
    ///
    /// Returns an error if the binary is missing, cannot be spawned, or
    /// exits with a failure status.
    async fn fetch(&self, request: &FetchRequest, progress: UnboundedSender<f32>)
    -> crate::Result<()>;

    /// Retrieve media metadata without downloading
    ///
    /// # Errors
    ///
    /// Returns an error if the binary is missing, the tool fails, or its
    /// metadata output cannot be parsed.
    async fn preview(&self, url: &str) -> crate::Result<PreviewInfo>;
}

/// [`MediaFetcher`] implementation that shells out to yt-dlp
///
/// The binary is located once at construction, either from an explicit
/// configured path or by searching PATH. A missing binary does not prevent
/// construction; every fetch attempt then fails with a tool-missing error
/// so the service can still start and report its state.
pub struct YtDlpFetcher {
    binary_path: Option<PathBuf>,
}

impl YtDlpFetcher {
    /// Locate the binary according to the tools configuration
    pub fn new(tools: &crate::config::ToolsConfig) -> Self {
        let binary_path = tools.ytdlp_path.clone().or_else(|| {
            if tools.search_path {
                which::which("yt-dlp").ok()
            } else {
                None
            }
        });
        Self { binary_path }
    }

    /// Create a fetcher with an explicit binary path
    pub fn with_binary(binary_path: PathBuf) -> Self {
        Self {
            binary_path: Some(binary_path),
        }
    }

    fn binary(&self) -> Result<&Path, FetchError> {
        self.binary_path
            .as_deref()
            .ok_or_else(|| FetchError::ToolMissing("yt-dlp".to_string()))
    }

    /// Translate a requested format into yt-dlp selector arguments
    ///
    /// "mp4" asks for an mp4 video+audio pair with a progressive fallback,
    /// "mp3" asks for best audio re-encoded to mp3, anything else is passed
    /// through as a selector ("best" included).
    fn format_args(format: &str) -> Vec<String> {
        match format {
            "mp4" => vec![
                "-f".to_string(),
                "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string(),
            ],
            "mp3" => vec![
                "-f".to_string(),
                "bestaudio".to_string(),
                "-x".to_string(),
                "--audio-format".to_string(),
                "mp3".to_string(),
            ],
            other => vec!["-f".to_string(), other.to_string()],
        }
    }

    fn build_args(request: &FetchRequest) -> Vec<String> {
        let output_path = request.output_dir.join(&request.output_template);
        let mut args = Self::format_args(&request.format);
        args.push("-o".to_string());
        args.push(output_path.to_string_lossy().into_owned());
        args.push("--newline".to_string());
        args.push("--progress".to_string());
        args.push(request.url.clone());
        args
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn is_available(&self) -> bool {
        self.binary_path.is_some()
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: UnboundedSender<f32>,
    ) -> crate::Result<()> {
        let binary = self.binary()?;
        let args = Self::build_args(request);
        debug!(binary = %binary.display(), ?args, "Spawning fetcher process");

        // kill_on_drop ties the child's lifetime to this future, so a
        // timeout or shutdown cancelling us also terminates the process.
        let mut child = Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(binary, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FetchError::Io(std::io::Error::other("child stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FetchError::Io(std::io::Error::other("child stderr not captured")))?;

        // Progress lines show up on either stream depending on the tool
        // version, so both are watched; stderr additionally feeds the
        // failure message tail.
        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut stdout_done = false;
        let mut stderr_done = false;

        while !(stdout_done && stderr_done) {
            tokio::select! {
                line = stdout_lines.next_line(), if !stdout_done => match line {
                    Ok(Some(line)) => {
                        if let Some(percent) = progress::parse_progress_line(&line) {
                            let _ = progress.send(percent);
                        }
                    }
                    _ => stdout_done = true,
                },
                line = stderr_lines.next_line(), if !stderr_done => match line {
                    Ok(Some(line)) => {
                        if let Some(percent) = progress::parse_progress_line(&line) {
                            let _ = progress.send(percent);
                        }
                        if !line.trim().is_empty() {
                            if stderr_tail.len() == STDERR_TAIL_LINES {
                                stderr_tail.pop_front();
                            }
                            stderr_tail.push_back(line);
                        }
                    }
                    _ => stderr_done = true,
                },
            }
        }

        let status = child.wait().await.map_err(FetchError::Io)?;
        if !status.success() {
            let stderr_text = stderr_tail.into_iter().collect::<Vec<_>>().join("\n");
            return Err(FetchError::ToolFailed {
                exit_code: status.code(),
                stderr: stderr_text,
            }
            .into());
        }
        Ok(())
    }

    async fn preview(&self, url: &str) -> crate::Result<PreviewInfo> {
        let binary = self.binary()?;

        let output = Command::new(binary)
            .args(["--dump-json", "--skip-download", url])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| spawn_error(binary, e))?;

        if !output.status.success() {
            let stderr_text = tail_of(&output.stderr);
            return Err(FetchError::ToolFailed {
                exit_code: output.status.code(),
                stderr: stderr_text,
            }
            .into());
        }

        // One JSON document per line; for playlists only the first entry
        // matters here.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let first_line = stdout
            .lines()
            .next()
            .ok_or_else(|| FetchError::InvalidMetadata("empty metadata output".to_string()))?;
        let raw: preview::RawMetadata = serde_json::from_str(first_line)
            .map_err(|e| FetchError::InvalidMetadata(e.to_string()))?;

        Ok(preview::build_preview(url, raw))
    }
}

fn spawn_error(binary: &Path, error: std::io::Error) -> FetchError {
    if error.kind() == std::io::ErrorKind::NotFound {
        FetchError::ToolMissing(binary.display().to_string())
    } else {
        FetchError::Io(error)
    }
}

fn tail_of(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolsConfig;
    use crate::error::Error;
    use tokio::sync::mpsc;

    fn request(dir: &Path) -> FetchRequest {
        FetchRequest {
            url: "https://example.com/v".to_string(),
            format: "best".to_string(),
            output_dir: dir.to_path_buf(),
            output_template: "job-1.%(ext)s".to_string(),
        }
    }

    #[test]
    fn format_args_maps_known_selectors() {
        assert_eq!(
            YtDlpFetcher::format_args("mp4"),
            vec![
                "-f",
                "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best"
            ]
        );
        assert_eq!(
            YtDlpFetcher::format_args("mp3"),
            vec!["-f", "bestaudio", "-x", "--audio-format", "mp3"]
        );
        assert_eq!(YtDlpFetcher::format_args("best"), vec!["-f", "best"]);
        assert_eq!(
            YtDlpFetcher::format_args("137+140"),
            vec!["-f", "137+140"],
            "explicit format ids pass through untouched"
        );
    }

    #[test]
    fn build_args_places_output_and_url_last() {
        let req = request(Path::new("/data/dl"));
        let args = YtDlpFetcher::build_args(&req);

        assert_eq!(
            args,
            vec![
                "-f",
                "best",
                "-o",
                "/data/dl/job-1.%(ext)s",
                "--newline",
                "--progress",
                "https://example.com/v",
            ]
        );
    }

    #[test]
    fn explicit_path_wins_over_path_search() {
        let tools = ToolsConfig {
            ytdlp_path: Some(PathBuf::from("/opt/yt-dlp")),
            search_path: true,
        };
        let fetcher = YtDlpFetcher::new(&tools);

        assert!(fetcher.is_available());
        assert_eq!(fetcher.binary_path, Some(PathBuf::from("/opt/yt-dlp")));
    }

    #[test]
    fn no_path_search_and_no_explicit_path_means_unavailable() {
        let tools = ToolsConfig {
            ytdlp_path: None,
            search_path: false,
        };
        let fetcher = YtDlpFetcher::new(&tools);

        assert!(!fetcher.is_available());
        assert_eq!(fetcher.name(), "yt-dlp");
    }

    #[test]
    fn path_search_consistency_with_which_crate() {
        let tools = ToolsConfig {
            ytdlp_path: None,
            search_path: true,
        };
        let fetcher = YtDlpFetcher::new(&tools);

        assert_eq!(
            which::which("yt-dlp").is_ok(),
            fetcher.is_available(),
            "discovery should agree with which::which()"
        );
    }

    #[tokio::test]
    async fn fetch_without_binary_is_tool_missing() {
        let tools = ToolsConfig {
            ytdlp_path: None,
            search_path: false,
        };
        let fetcher = YtDlpFetcher::new(&tools);
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = fetcher.fetch(&request(dir.path()), tx).await.unwrap_err();

        assert!(matches!(err, Error::Fetch(FetchError::ToolMissing(_))));
    }

    #[tokio::test]
    async fn fetch_with_nonexistent_binary_is_tool_missing() {
        let fetcher = YtDlpFetcher::with_binary(PathBuf::from("/nonexistent/yt-dlp"));
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = fetcher.fetch(&request(dir.path()), tx).await.unwrap_err();

        assert!(matches!(err, Error::Fetch(FetchError::ToolMissing(_))));
    }

    #[tokio::test]
    async fn preview_with_nonexistent_binary_is_tool_missing() {
        let fetcher = YtDlpFetcher::with_binary(PathBuf::from("/nonexistent/yt-dlp"));

        let err = fetcher.preview("https://example.com/v").await.unwrap_err();

        assert!(matches!(err, Error::Fetch(FetchError::ToolMissing(_))));
    }

    #[cfg(unix)]
    fn fake_binary(dir: &Path, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-ytdlp");
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn fetch_forwards_progress_from_download_lines() {
        let dir = tempfile::tempdir().unwrap();
        let script = "#!/bin/sh\n\
            echo '[download] Destination: out.mp4'\n\
            echo '[download]  10.5% of 1.00MiB at 2.00MiB/s'\n\
            echo '[youtube] unrelated 50% line'\n\
            echo '[download] 100% of 1.00MiB in 00:01'\n";
        let fetcher = YtDlpFetcher::with_binary(fake_binary(dir.path(), script));
        let (tx, mut rx) = mpsc::unbounded_channel();

        fetcher.fetch(&request(dir.path()), tx).await.unwrap();

        let mut seen = Vec::new();
        while let Ok(percent) = rx.try_recv() {
            seen.push(percent);
        }
        assert_eq!(
            seen,
            vec![10.5, 100.0],
            "only [download] percentage lines should be forwarded"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn fetch_failure_carries_exit_code_and_stderr_tail() {
        let dir = tempfile::tempdir().unwrap();
        let script = "#!/bin/sh\n\
            echo 'ERROR: Unsupported URL: https://example.com/v' >&2\n\
            exit 1\n";
        let fetcher = YtDlpFetcher::with_binary(fake_binary(dir.path(), script));
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = fetcher.fetch(&request(dir.path()), tx).await.unwrap_err();

        match err {
            Error::Fetch(FetchError::ToolFailed { exit_code, stderr }) => {
                assert_eq!(exit_code, Some(1));
                assert!(stderr.contains("Unsupported URL"));
            }
            other => panic!("expected ToolFailed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn preview_parses_metadata_from_first_json_line() {
        let dir = tempfile::tempdir().unwrap();
        let script = r##"#!/bin/sh
echo '{"id":"abc","title":"Test Clip","thumbnail":"https://i.example/t.jpg","duration":12.5,"formats":[{"format_id":"22","ext":"mp4","vcodec":"avc1","acodec":"mp4a","height":720,"filesize":1024}]}'
"##;
        let fetcher = YtDlpFetcher::with_binary(fake_binary(dir.path(), script));

        let info = fetcher.preview("https://example.com/v").await.unwrap();

        assert_eq!(info.id.as_deref(), Some("abc"));
        assert_eq!(info.url, "https://example.com/v");
        assert_eq!(info.title.as_deref(), Some("Test Clip"));
        assert_eq!(info.duration, Some(12.5));
        assert_eq!(info.formats.len(), 1);
        assert_eq!(info.formats[0].format_id, "22");
        assert_eq!(info.formats[0].resolution, "720p");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn preview_with_garbage_output_is_invalid_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let script = "#!/bin/sh\necho 'not json at all'\n";
        let fetcher = YtDlpFetcher::with_binary(fake_binary(dir.path(), script));

        let err = fetcher.preview("https://example.com/v").await.unwrap_err();

        assert!(matches!(err, Error::Fetch(FetchError::InvalidMetadata(_))));
    }
}
