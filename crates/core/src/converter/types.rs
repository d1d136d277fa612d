//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Measured properties of a source or produced media file.
///
/// Serialized with the field names clients expect (`duration`, `size`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub width: u32,
    pub height: u32,
    #[serde(rename = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

/// A bitrate/quality pair handed to the video encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeSettings {
    /// Target video bitrate in kbps.
    pub bitrate_kbps: u32,
    /// Constant Rate Factor (higher = smaller, 0-63 for VP9).
    pub crf: u8,
}

/// One encode pass of a trimmed, scaled clip.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeRequest {
    /// Identifier used in logs and progress events.
    pub job_id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Target frame width.
    pub width: u32,
    /// Target frame height.
    pub height: u32,
    /// Seek offset into the source, in seconds.
    pub start_secs: f64,
    /// Clip length, in seconds.
    pub duration_secs: f64,
    /// Output frame rate.
    pub fps: u32,
    pub settings: EncodeSettings,
}

/// Progress update during a transcode pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeProgress {
    pub job_id: String,
    /// Progress percentage (0.0 - 100.0).
    pub percent: f32,
    /// Output timestamp reached so far, in seconds.
    pub time_secs: f64,
}

/// Result of a finished transcode pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeOutput {
    pub output_path: PathBuf,
    pub size_bytes: u64,
    /// Wall time of the pass in milliseconds.
    pub duration_ms: u64,
}

/// Still image target format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StillFormat {
    /// Lossless PNG at the given zlib compression level (0-9).
    Png { compression: u8 },
    /// Lossy WebP at the given quality (0-100).
    Webp { quality: u8 },
}

impl StillFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png { .. } => "png",
            Self::Webp { .. } => "webp",
        }
    }
}

/// A resize-and-encode request for a still image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageEncodeRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub format: StillFormat,
}

/// A produced still image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub path: PathBuf,
    pub size_bytes: u64,
}
