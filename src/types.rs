//! Core types for vod-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result, Stage};

/// Kind of source a [`VideoRef`] points at
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoKind {
    /// A full broadcast recording, identified by a numeric ID
    Vod,
    /// A short clip, identified by a slug
    Clip,
}

/// Identifies the source video or clip. Created once at start; immutable.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoRef {
    /// Whether this is a full recording or a clip
    pub kind: VideoKind,
    /// Resolved identifier: numeric ID for recordings, slug for clips
    pub id: String,
}

impl VideoRef {
    /// Reference a full broadcast recording by its numeric ID
    pub fn vod(id: impl Into<String>) -> Self {
        Self {
            kind: VideoKind::Vod,
            id: id.into(),
        }
    }

    /// Reference a clip by its slug
    pub fn clip(slug: impl Into<String>) -> Self {
        Self {
            kind: VideoKind::Clip,
            id: slug.into(),
        }
    }
}

impl std::fmt::Display for VideoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            VideoKind::Vod => write!(f, "vod {}", self.id),
            VideoKind::Clip => write!(f, "clip {}", self.id),
        }
    }
}

/// Resolved video metadata consumed by the output namer.
///
/// Metadata lookup itself is the embedding application's job; this crate
/// only substitutes the fields into the output filename template.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Video or clip identifier
    pub id: String,
    /// Video title
    pub title: String,
    /// Channel display name
    pub channel: String,
    /// Channel login name
    pub channel_login: String,
    /// Game/category name, if known
    #[serde(default)]
    pub game: Option<String>,
    /// Clip slug, for clips
    #[serde(default)]
    pub clip_slug: Option<String>,
    /// When the broadcast was recorded
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// One available quality rendition of the video. Immutable once fetched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistVariant {
    /// Human-facing quality label (e.g. `720p60`)
    pub name: String,
    /// Rendition group identifier; `chunked` marks source quality
    pub group_id: String,
    /// Video resolution as `WIDTHxHEIGHT`, if advertised
    pub resolution: Option<String>,
    /// Resolved media playlist URL
    pub url: String,
    /// Whether this is the source-quality rendition
    pub is_source: bool,
}

/// One playlist entry. Ordered by sequence index; immutable after parse.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    /// Zero-based sequence index within the playlist
    pub index: usize,
    /// Resolved source URL
    pub url: String,
    /// Nominal duration in seconds (may be fractional)
    pub duration_secs: f64,
    /// Expected byte size, when the playlist advertises one
    pub expected_bytes: Option<u64>,
    /// Absolute `(offset, length)` within the resource when the playlist
    /// declares a byte range; the fetch must request exactly this slice
    pub byte_range: Option<(u64, u64)>,
}

/// Optional wall-clock range to download, in seconds from playlist start.
///
/// Invariant: `start >= 0`; when both bounds are present, `start < end`.
/// An absent `end` means "download to the end of the video".
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start offset in seconds, if bounded
    pub start: Option<f64>,
    /// End offset in seconds (exclusive), if bounded
    pub end: Option<f64>,
}

impl TimeRange {
    /// Build a range from second offsets, validating the invariants.
    pub fn from_secs(start: Option<f64>, end: Option<f64>) -> Result<Self> {
        if let Some(s) = start
            && s < 0.0
        {
            return Err(Error::InvalidTimeRange(format!("start must be >= 0, got {s}")));
        }
        if let (Some(s), Some(e)) = (start, end)
            && s >= e
        {
            return Err(Error::InvalidTimeRange(format!(
                "start ({s}s) must be before end ({e}s)"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse a range from `hh:mm` or `hh:mm:ss` bounds.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let start = start.map(parse_clock).transpose()?;
        let end = end.map(parse_clock).transpose()?;
        Self::from_secs(start, end)
    }

    /// True when neither bound is set
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Parse an `hh:mm` or `hh:mm:ss` clock value into seconds.
fn parse_clock(value: &str) -> Result<f64> {
    let invalid =
        || Error::InvalidTimeRange(format!("'{value}' is not an hh:mm or hh:mm:ss value"));

    let parts: Vec<&str> = value.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(invalid());
    }

    let mut fields = Vec::with_capacity(3);
    for part in &parts {
        if part.is_empty() {
            return Err(invalid());
        }
        fields.push(part.parse::<u64>().map_err(|_| invalid())?);
    }
    // Minute and second fields must stay below 60; hours are unbounded
    // short of u64 overflow
    if fields[1..].iter().any(|&n| n >= 60) {
        return Err(invalid());
    }
    let secs = match fields.as_slice() {
        [h, m] => h.checked_mul(3600).and_then(|s| s.checked_add(m * 60)),
        [h, m, s] => h
            .checked_mul(3600)
            .and_then(|acc| acc.checked_add(m * 60))
            .and_then(|acc| acc.checked_add(*s)),
        _ => None,
    }
    .ok_or_else(invalid)?;
    Ok(secs as f64)
}

/// One entry of a [`SegmentPlan`]: a segment and where it lands on disk
#[derive(Clone, Debug, PartialEq)]
pub struct PlanEntry {
    /// The segment to fetch
    pub descriptor: SegmentDescriptor,
    /// Local file the segment body is written to
    pub target: PathBuf,
}

/// The resolved download unit: the ordered sub-sequence of segments selected
/// by a [`TimeRange`], plus boundary trim instructions.
///
/// Entries preserve original sequence order and contain no duplicate indices.
#[derive(Clone, Debug, Default)]
pub struct SegmentPlan {
    /// Selected segments in sequence order, each with its target path
    pub entries: Vec<PlanEntry>,
    /// Seconds to cut from the start of the first selected segment
    pub start_trim: Option<f64>,
    /// Seconds to cut from the end of the last selected segment
    pub end_trim: Option<f64>,
    /// Total duration of the full playlist in seconds
    pub total_duration: f64,
}

impl SegmentPlan {
    /// Sum of selected segment durations before trimming
    pub fn selected_duration(&self) -> f64 {
        self.entries
            .iter()
            .map(|e| e.descriptor.duration_secs)
            .sum()
    }

    /// Duration of the final output after boundary trims
    pub fn output_duration(&self) -> f64 {
        self.selected_duration() - self.start_trim.unwrap_or(0.0) - self.end_trim.unwrap_or(0.0)
    }
}

/// Ordered list of on-disk segment files to be merged into one output file.
/// Created after all downloads succeed; consumed by the merger.
#[derive(Clone, Debug)]
pub struct MergeJob {
    /// Segment files in plan order
    pub segments: Vec<PathBuf>,
    /// Seconds to cut from the start of the concatenated stream
    pub start_trim: Option<f64>,
    /// Duration of the final output, when an end trim applies
    pub output_duration: Option<f64>,
    /// Final output path
    pub output: PathBuf,
}

/// Event emitted during the download lifecycle.
///
/// Consumed by an external display layer through
/// [`VodDownloader::subscribe`](crate::VodDownloader::subscribe).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Identifier resolved to a concrete playlist variant
    Resolved {
        /// Name of the selected variant
        variant: String,
        /// Number of segments in the playlist
        segments: usize,
    },

    /// A segment finished downloading
    SegmentCompleted {
        /// Sequence index of the completed segment
        index: usize,
        /// Segments completed so far (including skips)
        completed: usize,
        /// Total segments in the plan
        total: usize,
        /// Bytes transferred so far across all segments
        bytes_total: u64,
    },

    /// A segment was already on disk with the expected size; no fetch
    SegmentSkipped {
        /// Sequence index of the skipped segment
        index: usize,
        /// Segments completed so far (including skips)
        completed: usize,
        /// Total segments in the plan
        total: usize,
    },

    /// All selected segments are on disk
    DownloadComplete {
        /// Number of segments in the plan
        segments: usize,
        /// Bytes transferred by this job (excludes resumed segments)
        bytes_total: u64,
    },

    /// The external merge tool is running
    Merging {
        /// Final output path being produced
        output: PathBuf,
    },

    /// Intermediate segment files are being removed
    Cleaning,

    /// The job finished; the output file is in place
    Complete {
        /// Final output path
        path: PathBuf,
    },

    /// The job failed
    Failed {
        /// Stage in which the failure occurred
        stage: Stage,
        /// Error message
        error: String,
    },
}
