//! Error types for vod-dl
//!
//! Every fatal error identifies the pipeline stage it belongs to
//! (resolve / select / download / merge) and carries a machine-readable
//! error code, so embedding applications can report failures without
//! string-matching display output.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vod-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage in which an error occurred
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Resolving the video identifier into playlist variants
    Resolve,
    /// Selecting quality and mapping the time range onto segments
    Select,
    /// Fetching segment bodies
    Download,
    /// Assembling segments into the final output file
    Merge,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Resolve => write!(f, "resolve"),
            Stage::Select => write!(f, "select"),
            Stage::Download => write!(f, "download"),
            Stage::Merge => write!(f, "merge"),
        }
    }
}

/// Main error type for vod-dl
#[derive(Debug, Error)]
pub enum Error {
    /// The video or clip identifier did not resolve to any playlist
    #[error("video not found: {0}")]
    NotFound(String),

    /// The requested quality label matched no variant
    #[error("quality '{requested}' not available; available: {}", available.join(", "))]
    QualityUnavailable {
        /// The quality label that was requested
        requested: String,
        /// Names of the variants the playlist actually offers
        available: Vec<String>,
    },

    /// Multiple variants exist and no quality preference selected one.
    ///
    /// The caller is expected to disambiguate (interactively or otherwise)
    /// and re-invoke with an explicit quality from `candidates`.
    #[error("multiple qualities available, none selected: {}", candidates.join(", "))]
    AmbiguousQuality {
        /// Names of all candidate variants, best first
        candidates: Vec<String>,
    },

    /// The playlist document is structurally invalid
    #[error("malformed playlist: {0}")]
    MalformedPlaylist(String),

    /// A time range bound could not be parsed or violates start < end
    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    /// The requested time range lies outside the video duration
    #[error("requested range starting at {start}s is outside the video duration ({total}s)")]
    RangeOutOfBounds {
        /// Requested start offset in seconds
        start: f64,
        /// Requested end offset in seconds, if one was given
        end: Option<f64>,
        /// Total playlist duration in seconds
        total: f64,
    },

    /// A segment fetch failed after exhausting its retry budget
    #[error("segment {index} failed after {attempts} attempts ({url}): {reason}")]
    SegmentDownload {
        /// Zero-based sequence index of the failing segment
        index: usize,
        /// Source URL of the failing segment
        url: String,
        /// Number of attempts made
        attempts: u32,
        /// Last failure observed
        reason: String,
    },

    /// The final output path exists and overwrite was not requested
    #[error("output file already exists: {}", path.display())]
    OutputExists {
        /// The conflicting output path
        path: PathBuf,
    },

    /// The merge step failed: the external tool exited non-zero, or the
    /// segment files failed the pre-merge check
    #[error("merge failed{}: {stderr}", code.map(|c| format!(" (exit code {c})")).unwrap_or_default())]
    Merge {
        /// The tool's exit code, if it terminated normally
        code: Option<i32>,
        /// The tool's diagnostic output, preserved verbatim
        stderr: String,
    },

    /// An output template placeholder has no corresponding metadata field
    #[error("unknown placeholder '{{{name}}}' in output template")]
    UnknownPlaceholder {
        /// The unrecognized placeholder name
        name: String,
    },

    /// Operation not supported (missing binary, not implemented)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The server answered with a non-success HTTP status
    #[error("server returned HTTP {code} for {url}")]
    Status {
        /// The HTTP status code
        code: u16,
        /// The URL that produced it
        url: String,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The job was cancelled before this operation completed
    #[error("download cancelled")]
    Cancelled,
}

impl Error {
    /// The pipeline stage this error belongs to.
    ///
    /// `Network`/`Io`/`Status`/`Cancelled` can occur in several stages; they
    /// are attributed to the download stage, which is where they arise unless
    /// a more specific variant already wrapped them.
    pub fn stage(&self) -> Stage {
        match self {
            Error::NotFound(_) | Error::MalformedPlaylist(_) => Stage::Resolve,
            Error::QualityUnavailable { .. }
            | Error::AmbiguousQuality { .. }
            | Error::InvalidTimeRange(_)
            | Error::RangeOutOfBounds { .. }
            | Error::UnknownPlaceholder { .. } => Stage::Select,
            Error::SegmentDownload { .. }
            | Error::Status { .. }
            | Error::Network(_)
            | Error::Io(_)
            | Error::Cancelled => Stage::Download,
            Error::OutputExists { .. } | Error::Merge { .. } | Error::NotSupported(_) => {
                Stage::Merge
            }
        }
    }

    /// Machine-readable error code for embedding applications
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::QualityUnavailable { .. } => "quality_unavailable",
            Error::AmbiguousQuality { .. } => "ambiguous_quality",
            Error::MalformedPlaylist(_) => "malformed_playlist",
            Error::InvalidTimeRange(_) => "invalid_time_range",
            Error::RangeOutOfBounds { .. } => "range_out_of_bounds",
            Error::SegmentDownload { .. } => "segment_download",
            Error::OutputExists { .. } => "output_exists",
            Error::Merge { .. } => "merge_failed",
            Error::UnknownPlaceholder { .. } => "unknown_placeholder",
            Error::NotSupported(_) => "not_supported",
            Error::Status { .. } => "http_status",
            Error::Network(_) => "network_error",
            Error::Io(_) => "io_error",
            Error::Cancelled => "cancelled",
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    /// Returns (Error, expected_stage, expected_code) for every variant.
    fn all_error_variants() -> Vec<(Error, Stage, &'static str)> {
        vec![
            (
                Error::NotFound("vod 123".into()),
                Stage::Resolve,
                "not_found",
            ),
            (
                Error::QualityUnavailable {
                    requested: "1440p".into(),
                    available: vec!["1080p".into(), "720p".into()],
                },
                Stage::Select,
                "quality_unavailable",
            ),
            (
                Error::AmbiguousQuality {
                    candidates: vec!["source".into(), "720p".into()],
                },
                Stage::Select,
                "ambiguous_quality",
            ),
            (
                Error::MalformedPlaylist("no segments".into()),
                Stage::Resolve,
                "malformed_playlist",
            ),
            (
                Error::InvalidTimeRange("1:2:3:4".into()),
                Stage::Select,
                "invalid_time_range",
            ),
            (
                Error::RangeOutOfBounds {
                    start: 100.0,
                    end: None,
                    total: 40.0,
                },
                Stage::Select,
                "range_out_of_bounds",
            ),
            (
                Error::SegmentDownload {
                    index: 3,
                    url: "https://example.com/3.ts".into(),
                    attempts: 3,
                    reason: "HTTP 500".into(),
                },
                Stage::Download,
                "segment_download",
            ),
            (
                Error::OutputExists {
                    path: PathBuf::from("/tmp/out.mkv"),
                },
                Stage::Merge,
                "output_exists",
            ),
            (
                Error::Merge {
                    code: Some(1),
                    stderr: "invalid data".into(),
                },
                Stage::Merge,
                "merge_failed",
            ),
            (
                Error::UnknownPlaceholder {
                    name: "bogus".into(),
                },
                Stage::Select,
                "unknown_placeholder",
            ),
            (
                Error::NotSupported("ffmpeg not found".into()),
                Stage::Merge,
                "not_supported",
            ),
            (
                Error::Status {
                    code: 503,
                    url: "https://example.com/playlist.m3u8".into(),
                },
                Stage::Download,
                "http_status",
            ),
            (
                Error::Io(std::io::Error::other("disk fail")),
                Stage::Download,
                "io_error",
            ),
            (Error::Cancelled, Stage::Download, "cancelled"),
        ]
    }

    #[test]
    fn every_variant_maps_to_expected_stage() {
        for (error, expected_stage, code) in all_error_variants() {
            assert_eq!(
                error.stage(),
                expected_stage,
                "variant with code={code} attributed to wrong stage"
            );
        }
    }

    #[test]
    fn every_variant_maps_to_expected_error_code() {
        for (error, _, expected_code) in all_error_variants() {
            assert_eq!(error.error_code(), expected_code);
        }
    }

    #[test]
    fn segment_download_display_names_index_and_url() {
        let err = Error::SegmentDownload {
            index: 7,
            url: "https://cdn.example.com/00007.ts".into(),
            attempts: 3,
            reason: "HTTP 502".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("segment 7"), "message must name the index: {msg}");
        assert!(
            msg.contains("https://cdn.example.com/00007.ts"),
            "message must name the source URL: {msg}"
        );
    }

    #[test]
    fn quality_unavailable_display_lists_candidates() {
        let err = Error::QualityUnavailable {
            requested: "4k".into(),
            available: vec!["1080p60".into(), "720p60".into(), "audio_only".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'4k'"));
        assert!(msg.contains("1080p60, 720p60, audio_only"));
    }

    #[test]
    fn merge_error_preserves_tool_stderr_verbatim() {
        let stderr = "[concat @ 0x5555] Impossible to open '00002.ts'\n";
        let err = Error::Merge {
            code: Some(1),
            stderr: stderr.into(),
        };
        assert!(err.to_string().contains(stderr.trim_end()));
    }

    #[test]
    fn stage_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Stage::Download).unwrap(),
            "\"download\""
        );
        assert_eq!(
            serde_json::to_string(&Stage::Resolve).unwrap(),
            "\"resolve\""
        );
    }
}
