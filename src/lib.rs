//! # vod-dl
//!
//! Backend library for downloading HLS broadcast recordings and clips
//! into a single media file.
//!
//! ## Design Philosophy
//!
//! vod-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Sensible defaults** - Works out of the box with zero configuration
//! - **Event-driven** - Consumers subscribe to progress events, no polling
//! - **Resumable** - Re-running an interrupted job reuses finished segments
//!
//! ## Quick Start
//!
//! ```no_run
//! use vod_dl::{Config, DownloadOptions, VideoMetadata, VideoRef, VodDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = VodDownloader::new(Config::default())?;
//!
//!     // Subscribe to progress events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("{event:?}");
//!         }
//!     });
//!
//!     let metadata = VideoMetadata {
//!         id: "1255522958".to_string(),
//!         title: "Dark Souls 3 First Playthrough".to_string(),
//!         channel: "KatLink".to_string(),
//!         channel_login: "katlink".to_string(),
//!         ..Default::default()
//!     };
//!     let options = DownloadOptions {
//!         quality: Some("source".to_string()),
//!         ..Default::default()
//!     };
//!
//!     let outcome = downloader
//!         .download(&VideoRef::vod("1255522958"), &metadata, &options)
//!         .await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Download orchestration and the worker pool
pub mod downloader;
/// Error types
pub mod error;
/// Segment assembly via external ffmpeg
pub mod merger;
/// Output filename templating
pub mod output;
/// Playlist parsing and quality selection
pub mod playlist;
/// Mapping time ranges onto segments
pub mod range;
/// Aggregate download rate limiting
pub mod rate_limiter;
/// Playlist fetching
pub mod resolver;
/// Retry with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{ApiConfig, Config, DownloadConfig, OutputConfig, RetryConfig, ToolsConfig};
pub use downloader::{DownloadOptions, Outcome, VodDownloader};
pub use error::{Error, Result, Stage};
pub use merger::{FfmpegMerger, Merger};
pub use rate_limiter::RateLimiter;
pub use retry::IsRetryable;
pub use types::{
    Event, MergeJob, PlanEntry, PlaylistVariant, SegmentDescriptor, SegmentPlan, TimeRange,
    VideoKind, VideoMetadata, VideoRef,
};
