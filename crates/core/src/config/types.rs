use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::converter::{ConverterConfig, EncodeSettings};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub sticker: StickerConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    3000
}

/// Working directories.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Where uploaded sources land before conversion.
    #[serde(default = "default_uploads_dir")]
    pub uploads: PathBuf,
    /// Where finished stickers are written.
    #[serde(default = "default_output_dir")]
    pub output: PathBuf,
    /// URL prefix under which `output` is served.
    #[serde(default = "default_output_url_prefix")]
    pub output_url_prefix: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            uploads: default_uploads_dir(),
            output: default_output_dir(),
            output_url_prefix: default_output_url_prefix(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_output_url_prefix() -> String {
    "/output".to_string()
}

/// Upload limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Maximum size of a single uploaded file in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Accepted MIME types for uploads.
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_mime_types: default_allowed_mime_types(),
        }
    }
}

impl UploadConfig {
    /// Whether the given MIME type may be uploaded.
    pub fn accepts(&self, mime: &str) -> bool {
        self.allowed_mime_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(mime))
    }
}

fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}

fn default_allowed_mime_types() -> Vec<String> {
    [
        "image/jpeg",
        "image/jpg",
        "image/png",
        "image/webp",
        "image/gif",
        "video/mp4",
        "video/webm",
        "video/quicktime",
        "video/x-msvideo",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Working-directory cleanup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CleanupConfig {
    /// Seconds between sweeps.
    #[serde(default = "default_cleanup_interval")]
    pub interval_secs: u64,
    /// Files older than this many seconds are swept.
    #[serde(default = "default_cleanup_max_age")]
    pub max_age_secs: u64,
    /// Run one sweep immediately at startup.
    #[serde(default = "default_true")]
    pub run_on_start: bool,
    /// Grace period before a scheduled delete runs, in milliseconds.
    #[serde(default = "default_delete_grace")]
    pub delete_grace_ms: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_interval(),
            max_age_secs: default_cleanup_max_age(),
            run_on_start: true,
            delete_grace_ms: default_delete_grace(),
        }
    }
}

fn default_cleanup_interval() -> u64 {
    3600 // 1 hour
}

fn default_cleanup_max_age() -> u64 {
    86400 // 24 hours
}

fn default_delete_grace() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

/// Target platform sticker requirements.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StickerConfig {
    /// Longest-side bound in pixels.
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    /// Maximum video sticker duration in seconds.
    #[serde(default = "default_max_video_duration")]
    pub max_video_duration_secs: f64,
    /// Output frame rate for video stickers.
    #[serde(default = "default_video_fps")]
    pub video_fps: u32,
    /// Size ceiling for video stickers in bytes.
    #[serde(default = "default_max_video_file_size")]
    pub max_video_file_size: u64,
    /// WebP quality (0-100).
    #[serde(default = "default_webp_quality")]
    pub webp_quality: u8,
    /// PNG compression level (0-9).
    #[serde(default = "default_png_compression")]
    pub png_compression: u8,
    /// First-pass encoder settings, tuned for fidelity.
    #[serde(default = "default_baseline_tier")]
    pub baseline: EncodeSettings,
    /// Second-pass encoder settings, used when the first pass is over the ceiling.
    #[serde(default = "default_high_compression_tier")]
    pub high_compression: EncodeSettings,
}

impl Default for StickerConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            max_video_duration_secs: default_max_video_duration(),
            video_fps: default_video_fps(),
            max_video_file_size: default_max_video_file_size(),
            webp_quality: default_webp_quality(),
            png_compression: default_png_compression(),
            baseline: default_baseline_tier(),
            high_compression: default_high_compression_tier(),
        }
    }
}

fn default_max_size() -> u32 {
    512
}

fn default_max_video_duration() -> f64 {
    3.0
}

fn default_video_fps() -> u32 {
    30
}

fn default_max_video_file_size() -> u64 {
    256 * 1024
}

fn default_webp_quality() -> u8 {
    90
}

fn default_png_compression() -> u8 {
    9
}

fn default_baseline_tier() -> EncodeSettings {
    EncodeSettings {
        bitrate_kbps: 400,
        crf: 30,
    }
}

fn default_high_compression_tier() -> EncodeSettings {
    EncodeSettings {
        bitrate_kbps: 150,
        crf: 45,
    }
}

/// Notification transport settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifierConfig {
    /// Interval between liveness pings in seconds.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Per-listener outbound queue capacity.
    #[serde(default = "default_listener_buffer")]
    pub listener_buffer: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            listener_buffer: default_listener_buffer(),
        }
    }
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_listener_buffer() -> usize {
    256
}

/// Public subset of the configuration exposed to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicConfig {
    pub upload: PublicUploadConfig,
    pub sticker: PublicStickerConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUploadConfig {
    pub max_file_size: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicStickerConfig {
    pub max_size: u32,
    pub max_video_duration: f64,
}

impl From<&Config> for PublicConfig {
    fn from(config: &Config) -> Self {
        Self {
            upload: PublicUploadConfig {
                max_file_size: config.upload.max_file_size,
            },
            sticker: PublicStickerConfig {
                max_size: config.sticker.max_size,
                max_video_duration: config.sticker.max_video_duration_secs,
            },
        }
    }
}
