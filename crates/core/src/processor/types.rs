//! Types for the processor module.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::StickerConfig;
use crate::converter::MediaAsset;

use super::error::ProcessingError;

/// Limits a sticker must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StickerConstraints {
    /// Longest-side bound in pixels.
    pub max_longest_side: u32,
    /// Upper bound on clip length in seconds.
    pub max_duration_secs: f64,
    /// Size ceiling for video output in bytes.
    pub max_output_bytes: u64,
    /// Output frame rate for video.
    pub fps: u32,
    /// Whether the output keeps an alpha channel.
    pub has_alpha: bool,
}

impl StickerConstraints {
    pub fn from_config(sticker: &StickerConfig) -> Self {
        Self {
            max_longest_side: sticker.max_size,
            max_duration_secs: sticker.max_video_duration_secs,
            max_output_bytes: sticker.max_video_file_size,
            fps: sticker.video_fps,
            has_alpha: true,
        }
    }
}

/// Requested clip window within a video source, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimRange {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl Default for TrimRange {
    fn default() -> Self {
        Self {
            start_secs: 0.0,
            end_secs: 3.0,
        }
    }
}

impl TrimRange {
    pub fn new(start_secs: f64, end_secs: f64) -> Self {
        Self {
            start_secs,
            end_secs,
        }
    }

    /// Length to encode: `min(end - start, max_secs)`.
    ///
    /// A non-positive or non-finite result, or a negative start, is an error
    /// rather than a zero-length clip.
    pub fn clip_duration(&self, max_secs: f64) -> Result<f64, ProcessingError> {
        let duration = (self.end_secs - self.start_secs).min(max_secs);
        if !duration.is_finite() || duration <= 0.0 || !(self.start_secs >= 0.0) {
            return Err(ProcessingError::InvalidTrimRange {
                start: self.start_secs,
                end: self.end_secs,
            });
        }
        Ok(duration)
    }
}

/// One uploaded file to turn into a sticker.
///
/// Owned by the pipeline running it.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    /// Uploaded source on local disk. Removed once the job finishes.
    pub input_path: PathBuf,
    /// Client-side file name, used to name outputs.
    pub original_filename: String,
    pub constraints: StickerConstraints,
    /// Caller-supplied id for progress notifications.
    pub task_id: Option<String>,
    /// Clip window; ignored for still images.
    pub trim: TrimRange,
}

impl ConversionJob {
    pub fn new(
        input_path: impl Into<PathBuf>,
        original_filename: impl Into<String>,
        constraints: StickerConstraints,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            original_filename: original_filename.into(),
            constraints,
            task_id: None,
            trim: TrimRange::default(),
        }
    }

    /// Attaches a task id. Empty ids are treated as absent.
    pub fn with_task_id(mut self, task_id: Option<String>) -> Self {
        self.task_id = task_id.filter(|id| !id.trim().is_empty());
        self
    }

    pub fn with_trim(mut self, trim: TrimRange) -> Self {
        self.trim = trim;
        self
    }

    /// Output base name: the sanitized original stem plus a millisecond stamp.
    pub fn output_stem(&self, millis: i64) -> String {
        format!("{}-{}", sanitize_stem(&self.original_filename), millis)
    }
}

fn sanitize_stem(original_filename: &str) -> String {
    let stem = Path::new(original_filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "sticker".to_string()
    } else {
        cleaned
    }
}

/// A file written to the output directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFile {
    pub filename: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub url: String,
    pub size: u64,
}

/// Both encodings of an image sticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageOutputs {
    pub width: u32,
    pub height: u32,
    pub png: OutputFile,
    pub webp: OutputFile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageStickerResult {
    pub original: MediaAsset,
    pub result: ImageOutputs,
}

/// The encoded video sticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoOutput {
    pub width: u32,
    pub height: u32,
    /// Encoded clip length in seconds.
    pub duration: f64,
    pub size: u64,
    pub filename: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub url: String,
    /// False when the output is still over the ceiling after the second pass.
    pub size_valid: bool,
    /// Encode passes run (1 or 2).
    pub passes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStickerResult {
    pub original: MediaAsset,
    pub result: VideoOutput,
}

/// Counters across all jobs since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorStatus {
    pub active_jobs: usize,
    pub total_processed: u64,
    pub total_failed: u64,
}
