//! Image sticker pipeline: probe, scale, PNG, WebP.

use crate::converter::{scale_to_longest_side, ImageEncodeRequest, StillFormat};
use crate::notifier::{now_millis, ProgressReporter};

use super::error::ProcessingError;
use super::pipeline::StickerProcessor;
use super::types::{ConversionJob, ImageOutputs, ImageStickerResult, OutputFile};

/// Tracked steps of an image job.
pub const IMAGE_STEPS: u32 = 5;

impl StickerProcessor {
    /// Converts a still image into PNG and WebP stickers of the same scaled size.
    pub async fn convert_image(
        &self,
        job: ConversionJob,
    ) -> Result<ImageStickerResult, ProcessingError> {
        let mut guard = self.begin(&job, IMAGE_STEPS)?;

        let stem = job.output_stem(now_millis());
        let png_name = format!("{}.png", stem);
        let webp_name = format!("{}.webp", stem);
        guard.track_outputs([
            self.config.output_dir.join(&png_name),
            self.config.output_dir.join(&webp_name),
        ]);

        tracing::info!(
            input = %job.input_path.display(),
            task_id = job.task_id.as_deref().unwrap_or("-"),
            "Converting image sticker"
        );

        let result = self
            .run_image(&job, &png_name, &webp_name, guard.reporter())
            .await;

        guard.finish(result)
    }

    async fn run_image(
        &self,
        job: &ConversionJob,
        png_name: &str,
        webp_name: &str,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<ImageStickerResult, ProcessingError> {
        reporter.update(1, "Reading image metadata");
        let original = self.image_encoder.probe(&job.input_path).await?;

        reporter.update(2, "Calculating dimensions");
        let (width, height) = scale_to_longest_side(
            original.width,
            original.height,
            job.constraints.max_longest_side,
        )
        .ok_or_else(|| {
            ProcessingError::InvalidInput(format!(
                "image has no usable dimensions ({}x{})",
                original.width, original.height
            ))
        })?;

        reporter.update(3, "Creating PNG");
        let png = self
            .encode_still(job, png_name, width, height, StillFormat::Png {
                compression: self.config.png_compression,
            })
            .await?;

        reporter.update(4, "Creating WebP");
        let webp = self
            .encode_still(job, webp_name, width, height, StillFormat::Webp {
                quality: self.config.webp_quality,
            })
            .await?;

        reporter.update(5, "Completed");
        Ok(ImageStickerResult {
            original,
            result: ImageOutputs {
                width,
                height,
                png,
                webp,
            },
        })
    }

    async fn encode_still(
        &self,
        job: &ConversionJob,
        filename: &str,
        width: u32,
        height: u32,
        format: StillFormat,
    ) -> Result<OutputFile, ProcessingError> {
        let (path, url) = self.output_location(filename);
        let encoded = self
            .image_encoder
            .encode(ImageEncodeRequest {
                input_path: job.input_path.clone(),
                output_path: path,
                width,
                height,
                format,
            })
            .await?;

        Ok(OutputFile {
            filename: filename.to_string(),
            path: encoded.path,
            url,
            size: encoded.size_bytes,
        })
    }
}
