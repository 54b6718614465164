//! Locating the file a fetch actually produced
//!
//! The output template hands yt-dlp a name, but the tool picks the final
//! extension itself and may merge streams into a different container, so
//! the path we asked for is not always the path on disk. Resolution walks
//! a ladder: the literal expected path, then any file named `{job id}.*`,
//! then as a last resort the newest file modified within [`RECENCY_WINDOW`].
//!
//! The recency scan can misattribute output when another job finishes in
//! the same window; id-templated output names keep resolution on the first
//! two rungs in normal operation.

use crate::error::FetchError;
use crate::types::JobId;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// How far back the last-resort recency scan looks
pub const RECENCY_WINDOW: Duration = Duration::from_secs(60);

/// Resolve the file produced for a job inside `dir`
///
/// `expected` is the literal output path when the caller fixed the name
/// (user-supplied filename); `now` anchors the recency window.
///
/// # Errors
///
/// Returns [`FetchError::OutputNotFound`] when no rung of the ladder finds
/// a file, or [`FetchError::Io`] when the directory cannot be read.
pub fn resolve_produced_file(
    expected: Option<&Path>,
    dir: &Path,
    id: &JobId,
    now: SystemTime,
) -> Result<PathBuf, FetchError> {
    if let Some(path) = expected {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
    }

    let prefix = format!("{id}.");
    let window_start = now
        .checked_sub(RECENCY_WINDOW)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let mut newest_prefixed: Option<(SystemTime, PathBuf)> = None;
    let mut newest_recent: Option<(SystemTime, PathBuf)> = None;

    for entry in fs::read_dir(dir).map_err(FetchError::Io)? {
        let Ok(entry) = entry else { continue };
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };

        let name = entry.file_name();
        if name.to_string_lossy().starts_with(&prefix)
            && newest_prefixed.as_ref().is_none_or(|(t, _)| modified > *t)
        {
            newest_prefixed = Some((modified, entry.path()));
        }
        if modified >= window_start && newest_recent.as_ref().is_none_or(|(t, _)| modified > *t) {
            newest_recent = Some((modified, entry.path()));
        }
    }

    if let Some((_, path)) = newest_prefixed {
        return Ok(path);
    }
    if let Some((_, path)) = newest_recent {
        return Ok(path);
    }
    Err(FetchError::OutputNotFound {
        id: id.clone(),
        dir: dir.to_path_buf(),
    })
}
