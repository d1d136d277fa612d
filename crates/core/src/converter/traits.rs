//! Trait definitions for the converter module.

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

use super::error::ConverterError;
use super::types::{
    EncodedImage, ImageEncodeRequest, MediaAsset, TranscodeOutput, TranscodeProgress,
    TranscodeRequest,
};

/// An out-of-process video prober and encoder.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Returns the name of this transcoder implementation.
    fn name(&self) -> &str;

    /// Probes a media file for dimensions, duration and size.
    async fn probe(&self, path: &Path) -> Result<MediaAsset, ConverterError>;

    /// Runs one encode pass.
    ///
    /// Progress is pushed with `try_send`: a full or dropped receiver never
    /// stalls the encode. The sender is dropped when the pass ends, which
    /// closes the progress stream.
    async fn transcode(
        &self,
        request: TranscodeRequest,
        progress_tx: mpsc::Sender<TranscodeProgress>,
    ) -> Result<TranscodeOutput, ConverterError>;

    /// Validates that the transcoder is properly configured and ready.
    async fn validate(&self) -> Result<(), ConverterError>;
}

/// A still image decoder, resizer and encoder.
#[async_trait]
pub trait ImageEncoder: Send + Sync {
    /// Returns the name of this encoder implementation.
    fn name(&self) -> &str;

    /// Reads the dimensions of a still image.
    async fn probe(&self, path: &Path) -> Result<MediaAsset, ConverterError>;

    /// Resizes the source to the exact requested dimensions and writes it in the target format.
    async fn encode(&self, request: ImageEncodeRequest) -> Result<EncodedImage, ConverterError>;
}
