//! External tool settings for the video transcoder.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Where to find ffmpeg/ffprobe and how to drive the VP9 encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// Passed to `-loglevel`.
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,

    /// libvpx `-deadline` (good, best, realtime).
    #[serde(default = "default_deadline")]
    pub vp9_deadline: String,

    /// libvpx `-cpu-used`; higher encodes faster at lower quality.
    #[serde(default = "default_cpu_used")]
    pub vp9_cpu_used: u8,

    /// Appended right before the output path.
    #[serde(default)]
    pub extra_ffmpeg_args: Vec<String>,

    /// Minimum gap between forwarded progress reports, in milliseconds.
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_log_level() -> String {
    "warning".to_string()
}

fn default_deadline() -> String {
    "good".to_string()
}

fn default_cpu_used() -> u8 {
    4
}

fn default_progress_interval() -> u64 {
    250
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            ffmpeg_log_level: default_log_level(),
            vp9_deadline: default_deadline(),
            vp9_cpu_used: default_cpu_used(),
            extra_ffmpeg_args: Vec::new(),
            progress_interval_ms: default_progress_interval(),
        }
    }
}

impl ConverterConfig {
    /// Default settings with explicit tool locations.
    pub fn with_paths(ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            ..Default::default()
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}
