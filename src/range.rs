//! Mapping a wall-clock time range onto playlist segments
//!
//! Segments are typically 10 seconds long, so a requested range rarely
//! aligns with segment boundaries. The plan selects the minimal contiguous
//! run of segments covering the range and records how much the merger must
//! trim off the first and last segment.

use std::path::Path;

use url::Url;

use crate::error::{Error, Result};
use crate::types::{PlanEntry, SegmentDescriptor, SegmentPlan, TimeRange};

/// Build the download plan for `segments`, optionally restricted to `range`.
///
/// Without a range every segment is selected and no trims apply. Target
/// paths inside `seg_dir` are the zero-padded sequence index plus the
/// source file extension, so a restarted job maps segments to the same
/// files and can resume.
pub fn plan(
    segments: &[SegmentDescriptor],
    range: Option<&TimeRange>,
    seg_dir: &Path,
) -> Result<SegmentPlan> {
    let total_duration: f64 = segments.iter().map(|s| s.duration_secs).sum();
    let (start, end) = match range {
        Some(range) => (range.start, range.end),
        None => (None, None),
    };

    if let Some(start) = start
        && start >= total_duration
    {
        return Err(Error::RangeOutOfBounds {
            start,
            end,
            total: total_duration,
        });
    }

    let mut entries = Vec::new();
    let mut start_trim = None;
    let mut end_trim = None;
    let mut seg_start = 0.0;

    for segment in segments {
        let seg_end = seg_start + segment.duration_secs;

        // A bound strictly inside a segment leaves a partial segment that
        // the merger must trim off.
        if let Some(start) = start
            && start > seg_start
            && start < seg_end
        {
            start_trim = Some(start - seg_start);
        }
        if let Some(end) = end
            && end > seg_start
            && end < seg_end
        {
            end_trim = Some(seg_end - end);
        }

        let after_start = start.is_none_or(|start| seg_end > start);
        let before_end = end.is_none_or(|end| seg_start < end);
        if after_start && before_end {
            entries.push(PlanEntry {
                target: seg_dir.join(target_filename(segment)?),
                descriptor: segment.clone(),
            });
        }

        seg_start = seg_end;
    }

    if entries.is_empty() {
        return Err(Error::RangeOutOfBounds {
            start: start.unwrap_or(0.0),
            end,
            total: total_duration,
        });
    }

    Ok(SegmentPlan {
        entries,
        start_trim,
        end_trim,
        total_duration,
    })
}

/// Local filename for a segment: zero-padded index plus source extension.
fn target_filename(segment: &SegmentDescriptor) -> Result<String> {
    let url = Url::parse(&segment.url)
        .map_err(|err| Error::MalformedPlaylist(format!("invalid segment URL: {err}")))?;
    let ext = Path::new(url.path())
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_else(|| ".ts".to_string());
    Ok(format!("{:05}{ext}", segment.index))
}
