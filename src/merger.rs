//! Assembling downloaded segments into a single output file
//!
//! The merge shells out to ffmpeg's concat demuxer with stream copy, so
//! no re-encoding happens. Boundary trims from the segment plan become
//! `-ss`/`-t` on the output, which is how partial first/last segments
//! are cut without touching the codec layer.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::config::ToolsConfig;
use crate::error::{Error, Result};
use crate::types::{MergeJob, SegmentPlan};

/// A tool that can concatenate segment files into one output file.
///
/// Trait seam so embedders can substitute their own assembly strategy
/// (or a test double) for the default ffmpeg invocation.
#[async_trait]
pub trait Merger: Send + Sync {
    /// Concatenate `job.segments` into `job.output`, applying trims.
    ///
    /// On failure no partial output may be left at `job.output`; a file
    /// already there from an earlier run must survive untouched.
    async fn merge(&self, job: &MergeJob) -> Result<()>;

    /// Short identifier for logs
    fn name(&self) -> &'static str;
}

/// Merger backed by the external `ffmpeg` binary
#[derive(Debug)]
pub struct FfmpegMerger {
    binary_path: PathBuf,
}

impl FfmpegMerger {
    /// Use an explicit ffmpeg binary
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Discover ffmpeg in PATH
    pub fn from_path() -> Option<Self> {
        which::which("ffmpeg").ok().map(Self::new)
    }

    /// Resolve the merger from tool configuration: an explicit path wins,
    /// otherwise PATH discovery when enabled.
    pub fn resolve(tools: &ToolsConfig) -> Result<Self> {
        if let Some(path) = &tools.ffmpeg_path {
            return Ok(Self::new(path.clone()));
        }
        if tools.search_path
            && let Some(merger) = Self::from_path()
        {
            return Ok(merger);
        }
        Err(Error::NotSupported(
            "ffmpeg not found; set tools.ffmpeg_path or install it in PATH".to_string(),
        ))
    }
}

#[async_trait]
impl Merger for FfmpegMerger {
    async fn merge(&self, job: &MergeJob) -> Result<()> {
        let list_path = concat_list_path(job)?;
        tokio::fs::write(&list_path, build_concat_list(&job.segments)).await?;

        // Write to a hidden sibling first so a failed run never clobbers
        // an output file from an earlier successful run. The temp name
        // keeps the real extension, which is what ffmpeg infers the
        // container from.
        let tmp_output = tmp_output_path(&job.output)?;

        let mut command = Command::new(&self.binary_path);
        command
            .arg("-hide_banner")
            .arg("-y")
            .arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .arg("-i")
            .arg(&list_path);
        if let Some(start_trim) = job.start_trim {
            command.arg("-ss").arg(format!("{start_trim}"));
        }
        if let Some(duration) = job.output_duration {
            command.arg("-t").arg(format!("{duration}"));
        }
        command.arg("-c").arg("copy").arg(&tmp_output);

        tracing::info!(
            tool = %self.binary_path.display(),
            output = %job.output.display(),
            segments = job.segments.len(),
            "merging segments"
        );
        let output = command.output().await?;

        let _ = tokio::fs::remove_file(&list_path).await;

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&tmp_output).await;
            return Err(Error::Merge {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        tokio::fs::rename(&tmp_output, &job.output).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// ffconcat document listing the segment files in plan order
fn build_concat_list(segments: &[PathBuf]) -> String {
    let mut doc = String::from("ffconcat version 1.0\n");
    for segment in segments {
        let escaped = segment.display().to_string().replace('\'', "'\\''");
        doc.push_str(&format!("file '{escaped}'\n"));
    }
    doc
}

fn concat_list_path(job: &MergeJob) -> Result<PathBuf> {
    let dir = job
        .segments
        .first()
        .and_then(|segment| segment.parent())
        .ok_or_else(|| Error::Merge {
            code: None,
            stderr: "merge job contains no segment files".to_string(),
        })?;
    Ok(dir.join("concat.ffconcat"))
}

fn tmp_output_path(output: &Path) -> Result<PathBuf> {
    let name = output
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Merge {
            code: None,
            stderr: format!("output path has no file name: {}", output.display()),
        })?;
    Ok(output.with_file_name(format!(".tmp.{name}")))
}

/// Check every planned segment file is on disk before merging.
///
/// Catches torn state early: the merge must never run against missing or
/// truncated segments. Sizes are compared when the playlist advertised
/// them; otherwise any non-empty file passes.
pub fn verify_plan(plan: &SegmentPlan) -> Result<()> {
    for entry in &plan.entries {
        let metadata = std::fs::metadata(&entry.target).map_err(|_| Error::Merge {
            code: None,
            stderr: format!("segment file missing: {}", entry.target.display()),
        })?;
        let ok = match entry.descriptor.expected_bytes {
            Some(expected) => metadata.len() == expected,
            None => metadata.len() > 0,
        };
        if !ok {
            return Err(Error::Merge {
                code: None,
                stderr: format!(
                    "segment file truncated: {} ({} bytes)",
                    entry.target.display(),
                    metadata.len()
                ),
            });
        }
    }
    Ok(())
}

/// Remove the working segment directory after a successful merge.
///
/// Failure here is logged, not fatal: the output file is already in place.
pub async fn cleanup(seg_dir: &Path) {
    if let Err(err) = tokio::fs::remove_dir_all(seg_dir).await {
        tracing::warn!(
            dir = %seg_dir.display(),
            error = %err,
            "failed to remove working segment directory"
        );
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PlanEntry, SegmentDescriptor};

    fn plan_with(target: PathBuf, expected_bytes: Option<u64>) -> SegmentPlan {
        SegmentPlan {
            entries: vec![PlanEntry {
                descriptor: SegmentDescriptor {
                    index: 0,
                    url: "https://example.com/0.ts".to_string(),
                    duration_secs: 10.0,
                    expected_bytes,
                    byte_range: None,
                },
                target,
            }],
            start_trim: None,
            end_trim: None,
            total_duration: 10.0,
        }
    }

    #[test]
    fn from_path_missing_binary_is_none() {
        assert!(which::which("nonexistent-ffmpeg-binary-xyz").is_err());
    }

    #[test]
    fn resolve_prefers_explicit_path() {
        let tools = ToolsConfig {
            ffmpeg_path: Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")),
            search_path: false,
        };
        let merger = FfmpegMerger::resolve(&tools).unwrap();
        assert_eq!(merger.binary_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn resolve_without_path_or_search_is_not_supported() {
        let tools = ToolsConfig {
            ffmpeg_path: None,
            search_path: false,
        };
        let err = FfmpegMerger::resolve(&tools).unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }

    #[test]
    fn concat_list_orders_and_quotes_files() {
        let doc = build_concat_list(&[
            PathBuf::from("/work/vod/00000.ts"),
            PathBuf::from("/work/vod/00001.ts"),
        ]);
        assert_eq!(
            doc,
            "ffconcat version 1.0\nfile '/work/vod/00000.ts'\nfile '/work/vod/00001.ts'\n"
        );
    }

    #[test]
    fn verify_accepts_expected_size() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("00000.ts");
        std::fs::write(&target, b"0123456789").unwrap();
        verify_plan(&plan_with(target, Some(10))).unwrap();
    }

    #[test]
    fn verify_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = verify_plan(&plan_with(dir.path().join("00000.ts"), None)).unwrap_err();
        assert!(matches!(err, Error::Merge { .. }));
    }

    #[test]
    fn verify_rejects_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("00000.ts");
        std::fs::write(&target, b"short").unwrap();
        let err = verify_plan(&plan_with(target, Some(10))).unwrap_err();
        assert!(matches!(err, Error::Merge { .. }));
    }

    #[test]
    fn verify_rejects_empty_file_when_size_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("00000.ts");
        std::fs::write(&target, b"").unwrap();
        let err = verify_plan(&plan_with(target, None)).unwrap_err();
        assert!(matches!(err, Error::Merge { .. }));
    }

    #[tokio::test]
    async fn failed_merge_leaves_prior_output_untouched() {
        // `false` exits non-zero while ignoring its arguments, which stands
        // in for an ffmpeg failure. Skip when unavailable.
        let Ok(false_bin) = which::which("false") else {
            return;
        };

        let dir = tempfile::tempdir().unwrap();
        let segment = dir.path().join("00000.ts");
        std::fs::write(&segment, b"segment-data").unwrap();

        let output = dir.path().join("out.mkv");
        std::fs::write(&output, b"earlier successful output").unwrap();

        let job = MergeJob {
            segments: vec![segment],
            start_trim: None,
            output_duration: None,
            output: output.clone(),
        };

        let err = FfmpegMerger::new(false_bin).merge(&job).await.unwrap_err();
        assert!(matches!(err, Error::Merge { .. }));

        let content = std::fs::read(&output).unwrap();
        assert_eq!(content, b"earlier successful output");
        assert!(
            !dir.path().join(".tmp.out.mkv").exists(),
            "partial temp output must be removed on failure"
        );
    }

    #[tokio::test]
    async fn cleanup_removes_the_segment_dir() {
        let dir = tempfile::tempdir().unwrap();
        let seg_dir = dir.path().join("vod_123");
        std::fs::create_dir_all(&seg_dir).unwrap();
        std::fs::write(seg_dir.join("00000.ts"), b"x").unwrap();

        cleanup(&seg_dir).await;
        assert!(!seg_dir.exists());
    }
}
