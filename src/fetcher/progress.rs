//! Parsing of yt-dlp progress output

use regex::Regex;
use std::sync::OnceLock;

// Literal pattern, compilation cannot fail at runtime.
#[allow(clippy::expect_used)]
fn percent_regex() -> &'static Regex {
    static PERCENT: OnceLock<Regex> = OnceLock::new();
    PERCENT.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)%").expect("valid percent pattern"))
}

/// Extract a completion percentage from one line of fetcher output
///
/// Only `[download]` lines carry download progress; percentages on other
/// lines (retry counters, format tables) are ignored. Returns `None` when
/// the line has no parseable percentage.
pub(super) fn parse_progress_line(line: &str) -> Option<f32> {
    if !line.contains("[download]") {
        return None;
    }
    let captures = percent_regex().captures(line)?;
    captures.get(1)?.as_str().parse().ok()
}
