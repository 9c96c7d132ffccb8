//! Download orchestration
//!
//! [`VodDownloader`] is the crate's facade: it wires the resolver, range
//! planner, worker pool, and merger into the full pipeline and publishes
//! progress on a broadcast channel for the embedding application's UI.

mod segments;

use std::path::PathBuf;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::merger::{self, FfmpegMerger, Merger};
use crate::output;
use crate::playlist;
use crate::range;
use crate::rate_limiter::RateLimiter;
use crate::resolver::Resolver;
use crate::types::{Event, MergeJob, TimeRange, VideoMetadata, VideoRef};

use segments::FetchContext;

/// Per-download options
#[derive(Clone, Debug, Default)]
pub struct DownloadOptions {
    /// Quality preference: a variant name, group id, or `"source"`.
    /// With multiple variants and no preference the download fails with
    /// [`Error::AmbiguousQuality`] so the caller can ask the user.
    pub quality: Option<String>,
    /// Restrict the download to a time range
    pub range: Option<TimeRange>,
    /// Override the templated output path entirely
    pub output_path: Option<PathBuf>,
}

/// What a finished download produced
#[derive(Clone, Debug)]
pub enum Outcome {
    /// Segments were merged into a single output file
    Merged {
        /// The final output file
        path: PathBuf,
    },
    /// Joining was disabled; segments remain on disk
    Segments {
        /// The working directory holding the segments
        dir: PathBuf,
        /// Segment files in playback order
        segments: Vec<PathBuf>,
    },
}

/// The main download facade.
///
/// Holds the shared HTTP client, rate limiter, and event channel. One
/// instance can run downloads sequentially or be cloned per job by the
/// embedding application.
pub struct VodDownloader {
    config: Config,
    client: reqwest::Client,
    limiter: RateLimiter,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl VodDownloader {
    /// Build a downloader from configuration
    pub fn new(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.download.request_timeout)
            .build()?;
        let limiter = RateLimiter::new(config.download.rate_limit_bps);
        let (event_tx, _) = broadcast::channel(256);

        Ok(Self {
            config,
            client,
            limiter,
            event_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Subscribe to progress events.
    ///
    /// Slow consumers may observe `Lagged`; events carry absolute
    /// counters, so a dropped message never corrupts displayed totals.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Abort all in-flight work. Completed segment files stay on disk.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Change the aggregate download rate limit; reaches workers that are
    /// already waiting on the limiter.
    pub fn set_rate_limit(&self, bytes_per_sec: Option<u64>) {
        self.limiter.set_limit(bytes_per_sec);
    }

    /// Current aggregate rate limit, or `None` when unlimited
    pub fn rate_limit(&self) -> Option<u64> {
        self.limiter.get_limit()
    }

    /// Run the full pipeline for one video: resolve, select, plan, fetch,
    /// merge. Emits [`Event::Failed`] with the failing stage before
    /// returning an error.
    pub async fn download(
        &self,
        video: &VideoRef,
        metadata: &VideoMetadata,
        options: &DownloadOptions,
    ) -> Result<Outcome> {
        match self.run(video, metadata, options).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::error!(video = %video, error = %err, stage = %err.stage(), "download failed");
                self.emit(Event::Failed {
                    stage: err.stage(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        video: &VideoRef,
        metadata: &VideoMetadata,
        options: &DownloadOptions,
    ) -> Result<Outcome> {
        let output_path = self.output_path(metadata, options)?;

        // Refuse an existing output before any network or disk work
        if !self.config.output.no_join
            && !self.config.output.overwrite
            && output_path.exists()
        {
            return Err(Error::OutputExists { path: output_path });
        }

        let resolver = Resolver::new(self.client.clone(), self.config.api.clone());
        let variants = resolver.resolve(video).await?;
        let variant = playlist::select_variant(&variants, options.quality.as_deref())?.clone();
        let segment_descriptors = resolver.fetch_segments(&variant).await?;

        tracing::info!(
            video = %video,
            variant = %variant.name,
            segments = segment_descriptors.len(),
            "resolved download"
        );
        self.emit(Event::Resolved {
            variant: variant.name.clone(),
            segments: segment_descriptors.len(),
        });

        let seg_dir = self
            .config
            .download
            .work_dir
            .join(format!("{}_{}_{}", kind_str(video), video.id, variant.group_id));
        tokio::fs::create_dir_all(&seg_dir).await?;

        let plan = range::plan(&segment_descriptors, options.range.as_ref(), &seg_dir)?;

        let ctx = FetchContext {
            client: self.client.clone(),
            limiter: self.limiter.clone(),
            retry: self.config.retry.clone(),
            auth_token: self.config.api.auth_token.clone(),
            // Child token: exhausting a retry budget cancels this job's
            // siblings without poisoning the downloader for the next job
            cancel: self.cancel.child_token(),
            event_tx: self.event_tx.clone(),
        };
        let bytes_total = segments::fetch_plan(&ctx, &plan, self.config.download.workers).await?;
        self.emit(Event::DownloadComplete {
            segments: plan.entries.len(),
            bytes_total,
        });

        if self.config.output.no_join {
            return Ok(Outcome::Segments {
                dir: seg_dir,
                segments: plan.entries.iter().map(|e| e.target.clone()).collect(),
            });
        }

        merger::verify_plan(&plan)?;
        let ffmpeg = FfmpegMerger::resolve(&self.config.tools)?;
        let job = MergeJob {
            segments: plan.entries.iter().map(|e| e.target.clone()).collect(),
            start_trim: plan.start_trim,
            // -t is only needed when something must be cut off the end
            output_duration: plan.end_trim.map(|_| plan.output_duration()),
            output: output_path.clone(),
        };
        self.emit(Event::Merging {
            output: output_path.clone(),
        });
        ffmpeg.merge(&job).await?;

        if !self.config.output.keep {
            self.emit(Event::Cleaning);
            merger::cleanup(&seg_dir).await;
        }

        tracing::info!(video = %video, path = %output_path.display(), "download complete");
        self.emit(Event::Complete {
            path: output_path.clone(),
        });
        Ok(Outcome::Merged { path: output_path })
    }

    fn output_path(&self, metadata: &VideoMetadata, options: &DownloadOptions) -> Result<PathBuf> {
        if let Some(path) = &options.output_path {
            return Ok(path.clone());
        }
        let filename = output::expand_template(
            &self.config.output.template,
            metadata,
            &self.config.output.format,
        )?;
        Ok(self.config.output.dir.join(filename))
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine; progress reporting is optional
        let _ = self.event_tx.send(event);
    }
}

fn kind_str(video: &VideoRef) -> &'static str {
    match video.kind {
        crate::types::VideoKind::Vod => "vod",
        crate::types::VideoKind::Clip => "clip",
    }
}
