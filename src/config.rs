//! Configuration types for vod-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
///
/// Every field has a sensible default, so `Config::default()` produces a
/// working setup. Nested sub-configs group related settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Segment fetching behavior (concurrency, rate limit, working dir)
    #[serde(default)]
    pub download: DownloadConfig,

    /// Retry behavior for transient segment-fetch failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Final output naming and assembly behavior
    #[serde(default)]
    pub output: OutputConfig,

    /// Playlist endpoints and credentials
    #[serde(default)]
    pub api: ApiConfig,

    /// External tool paths (ffmpeg)
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Segment fetching behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Working directory for intermediate segment files (default: "./.vod-dl")
    ///
    /// Each job gets its own subdirectory derived from the video identifier,
    /// so a restarted job finds and reuses its earlier segments.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Number of concurrent segment download workers (default: 20)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Aggregate download rate limit in bytes per second (None = unlimited)
    #[serde(default)]
    pub rate_limit_bps: Option<u64>,

    /// Per-request timeout for playlist and segment fetches (default: 30s)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            workers: default_workers(),
            rate_limit_bps: None,
            request_timeout: default_request_timeout(),
        }
    }
}

/// Retry behavior for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per segment, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Final output naming and assembly behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory the final output file is written to (default: ".")
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// Output filename template (see [`crate::output::expand_template`])
    #[serde(default = "default_template")]
    pub template: String,

    /// Target container format / file extension (default: "mkv")
    #[serde(default = "default_format")]
    pub format: String,

    /// Replace an existing output file instead of failing (default: false)
    #[serde(default)]
    pub overwrite: bool,

    /// Keep intermediate segment files after a successful merge (default: false)
    #[serde(default)]
    pub keep: bool,

    /// Skip the merge entirely and leave segment files in place (default: false)
    #[serde(default)]
    pub no_join: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            template: default_template(),
            format: default_format(),
            overwrite: false,
            keep: false,
            no_join: false,
        }
    }
}

/// Playlist endpoints and credentials
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL for recording variant manifests; the video ID plus `.m3u8`
    /// is appended (default: the public usher endpoint)
    #[serde(default = "default_vod_base")]
    pub vod_playlist_base: String,

    /// Base URL for clip variant manifests; the clip slug plus `.m3u8`
    /// is appended
    #[serde(default = "default_clip_base")]
    pub clip_playlist_base: String,

    /// Opaque auth credential, forwarded as-is in the `Authorization` header
    /// (subscriber-only and unlisted videos require one)
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            vod_playlist_base: default_vod_base(),
            clip_playlist_base: default_clip_base(),
            auth_token: None,
        }
    }
}

/// External tool paths
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the ffmpeg executable (auto-detected from PATH if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH when no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            search_path: true,
        }
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./.vod-dl")
}

fn default_workers() -> usize {
    20
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_template() -> String {
    "{date}_{id}_{channel_login}_{title_slug}.{format}".to_string()
}

fn default_format() -> String {
    "mkv".to_string()
}

fn default_vod_base() -> String {
    "https://usher.ttvnw.net/vod".to_string()
}

fn default_clip_base() -> String {
    "https://clips-media-assets2.twitch.tv".to_string()
}

/// Serialize Duration as seconds for config files
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
