//! Video sticker pipeline: probe, scale, adaptive two-tier encode, verify.

use std::path::PathBuf;
use std::sync::Arc;

use crate::converter::{scale_to_longest_side, TranscodeRequest};
use crate::notifier::{now_millis, ProgressReporter};

use super::compression::{CompressionController, CompressionPolicy};
use super::error::ProcessingError;
use super::pipeline::StickerProcessor;
use super::types::{ConversionJob, VideoOutput, VideoStickerResult};

/// Tracked steps of a video job (one per percent).
pub const VIDEO_STEPS: u32 = 100;

impl StickerProcessor {
    /// Trims, scales and encodes a clip to a WebM sticker under the size ceiling.
    ///
    /// An output still over the ceiling after the high-compression pass is
    /// returned with `size_valid: false`.
    pub async fn convert_video(
        &self,
        job: ConversionJob,
    ) -> Result<VideoStickerResult, ProcessingError> {
        let mut guard = self.begin(&job, VIDEO_STEPS)?;

        let filename = format!("{}.webm", job.output_stem(now_millis()));
        let (path, url) = self.output_location(&filename);
        guard.track_outputs([path.clone()]);

        tracing::info!(
            input = %job.input_path.display(),
            task_id = job.task_id.as_deref().unwrap_or("-"),
            start_secs = job.trim.start_secs,
            end_secs = job.trim.end_secs,
            "Converting video sticker"
        );

        let result = self
            .run_video(&job, filename, path, url, guard.reporter())
            .await;

        guard.finish(result)
    }

    async fn run_video(
        &self,
        job: &ConversionJob,
        filename: String,
        path: PathBuf,
        url: String,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<VideoStickerResult, ProcessingError> {
        let duration = job.trim.clip_duration(job.constraints.max_duration_secs)?;

        reporter.update(5, "Reading video metadata");
        let original = self.transcoder.probe(&job.input_path).await?;

        reporter.update(10, "Calculating dimensions");
        let (width, height) = scale_to_longest_side(
            original.width,
            original.height,
            job.constraints.max_longest_side,
        )
        .ok_or_else(|| {
            ProcessingError::InvalidInput(format!(
                "video has no usable dimensions ({}x{})",
                original.width, original.height
            ))
        })?;

        let request = TranscodeRequest {
            job_id: job.task_id.clone().unwrap_or_else(|| filename.clone()),
            input_path: job.input_path.clone(),
            output_path: path,
            width,
            height,
            start_secs: job.trim.start_secs,
            duration_secs: duration,
            fps: job.constraints.fps,
            settings: self.config.baseline,
        };
        let controller = CompressionController::new(
            Arc::clone(&self.transcoder),
            CompressionPolicy {
                baseline: self.config.baseline,
                high_compression: self.config.high_compression,
                max_output_bytes: job.constraints.max_output_bytes,
            },
        );
        let outcome = controller.run(request, reporter).await?;

        reporter.update(95, "Reading final video info");
        let produced = self.transcoder.probe(&outcome.output.output_path).await?;

        reporter.update(100, "Completed");
        Ok(VideoStickerResult {
            original,
            result: VideoOutput {
                width,
                height,
                duration: produced.duration_secs.unwrap_or(duration),
                size: outcome.output.size_bytes,
                filename,
                path: outcome.output.output_path,
                url,
                size_valid: outcome.size_valid,
                passes: outcome.passes,
            },
        })
    }
}
