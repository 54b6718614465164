//! Format selection for media previews
//!
//! yt-dlp reports every variant an extractor knows about, most of which are
//! noise for a download picker. This module reduces the raw format table to
//! a short list: mp4 video with both streams up to 4K, plus audio-only
//! variants, labeled, deduplicated and ordered for display.

use crate::types::FormatOption;
use serde::Deserialize;
use std::collections::HashSet;

/// Audio container extensions offered as audio-only downloads
const AUDIO_EXTS: [&str; 6] = ["m4a", "mp3", "wav", "flac", "aac", "ogg"];

/// Tallest video variant offered (2160p / 4K)
const MAX_HEIGHT: f64 = 2160.0;

/// Metadata document as emitted by `yt-dlp --dump-json`
#[derive(Debug, Deserialize)]
pub(super) struct RawMetadata {
    pub id: Option<String>,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,
}

/// One entry of the raw format table
///
/// Every field is optional; extractors fill in different subsets and a
/// single odd entry must not fail the whole preview.
#[derive(Debug, Deserialize)]
pub(super) struct RawFormat {
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub height: Option<f64>,
    pub resolution: Option<String>,
    pub abr: Option<f64>,
    pub tbr: Option<f64>,
    pub filesize: Option<f64>,
}

/// Assemble a [`crate::types::PreviewInfo`] from raw tool metadata
pub(super) fn build_preview(url: &str, raw: RawMetadata) -> crate::types::PreviewInfo {
    crate::types::PreviewInfo {
        id: raw.id,
        url: url.to_string(),
        title: raw.title,
        thumbnail: raw.thumbnail,
        duration: raw.duration,
        formats: select_formats(raw.formats),
    }
}

/// Filter, label, deduplicate and order the raw format table
pub(super) fn select_formats(raw: Vec<RawFormat>) -> Vec<FormatOption> {
    let mut options: Vec<FormatOption> = raw.iter().filter(|f| keep(f)).map(to_option).collect();

    let mut seen = HashSet::new();
    options.retain(|opt| seen.insert(format!("{}_{}", opt.ext, opt.resolution)));

    options.sort_by_key(sort_key);
    options
}

fn keep(format: &RawFormat) -> bool {
    let ext = format.ext.as_deref().unwrap_or("");
    let vcodec = format.vcodec.as_deref();
    let acodec = format.acodec.as_deref();

    if ext == "mp4" && vcodec != Some("none") && acodec != Some("none") {
        // Unknown height is kept; plenty of extractors omit it.
        match effective_height(format) {
            Some(height) => height <= MAX_HEIGHT,
            None => true,
        }
    } else {
        AUDIO_EXTS.contains(&ext) && vcodec == Some("none")
    }
}

fn effective_height(format: &RawFormat) -> Option<f64> {
    format
        .height
        .or_else(|| format.resolution.as_deref()?.strip_suffix('p')?.parse().ok())
}

fn to_option(format: &RawFormat) -> FormatOption {
    let is_audio = format.vcodec.as_deref() == Some("none");
    let resolution = if is_audio {
        audio_label(format)
    } else {
        video_label(format)
    };
    FormatOption {
        format_id: format.format_id.clone().unwrap_or_default(),
        ext: format.ext.clone().unwrap_or_default(),
        resolution,
        filesize: format.filesize.map(|v| v as u64),
    }
}

fn video_label(format: &RawFormat) -> String {
    if let Some(resolution) = format.resolution.as_deref().filter(|r| !r.is_empty()) {
        resolution.to_string()
    } else if let Some(height) = format.height {
        format!("{}p", height as u32)
    } else {
        "video".to_string()
    }
}

/// Bitrate label rounded to the nearest multiple of 32 kbit/s, matching the
/// common ladder (64K, 128K, 160K, ...) so near-identical variants collapse
/// in the dedupe step
fn audio_label(format: &RawFormat) -> String {
    let bitrate = format
        .abr
        .filter(|rate| *rate > 0.0)
        .or(format.tbr.filter(|rate| *rate > 0.0));
    match bitrate {
        Some(rate) => format!("{}K", ((rate / 32.0).round() as u64) * 32),
        None => "audio only".to_string(),
    }
}

/// Display order: mp4 video first, other video-like entries next, audio
/// last, each group ascending by the numeric part of its label
fn sort_key(option: &FormatOption) -> (u8, u32) {
    let label = &option.resolution;
    let is_video = label.ends_with('p')
        || (!label.is_empty() && label.chars().all(|c| c.is_ascii_digit()));
    let group = if is_video && option.ext == "mp4" {
        0
    } else if is_video {
        1
    } else {
        2
    };
    (group, numeric_component(label))
}

fn numeric_component(label: &str) -> u32 {
    let digits: String = label.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}
