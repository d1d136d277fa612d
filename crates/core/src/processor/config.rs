//! Configuration for the processor module.

use std::path::PathBuf;

use crate::config::Config;
use crate::converter::EncodeSettings;

use super::types::StickerConstraints;

/// Settings the sticker pipelines run with, derived from the service config.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Directory finished stickers are written to.
    pub output_dir: PathBuf,
    /// URL prefix the output directory is served under.
    pub output_url_prefix: String,
    /// Target platform limits.
    pub constraints: StickerConstraints,
    /// First-pass video encoder settings.
    pub baseline: EncodeSettings,
    /// Second-pass video encoder settings.
    pub high_compression: EncodeSettings,
    pub webp_quality: u8,
    pub png_compression: u8,
}

impl ProcessorConfig {
    pub fn from_config(config: &Config) -> Self {
        let sticker = &config.sticker;
        Self {
            output_dir: config.paths.output.clone(),
            output_url_prefix: config.paths.output_url_prefix.clone(),
            constraints: StickerConstraints::from_config(sticker),
            baseline: sticker.baseline,
            high_compression: sticker.high_compression,
            webp_quality: sticker.webp_quality,
            png_compression: sticker.png_compression,
        }
    }

    /// Public URL of a file in the output directory.
    pub fn output_url(&self, filename: &str) -> String {
        format!("{}/{}", self.output_url_prefix.trim_end_matches('/'), filename)
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
