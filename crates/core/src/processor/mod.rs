//! Processor module for the sticker conversion pipelines.
//!
//! [`StickerProcessor`] runs one [`ConversionJob`] at a time per call:
//!
//! - Image: probe, scale to the longest-side bound, encode PNG and WebP
//!   (5 tracked steps).
//! - Video: validate the trim window, probe, scale, then hand the clip to the
//!   [`CompressionController`], which encodes at the baseline tier and
//!   re-encodes once at the high-compression tier if the output is over the
//!   size ceiling (100 tracked steps).
//!
//! Progress goes to the job's [`TaskTracker`](crate::notifier::TaskTracker)
//! when it has a task id. Inputs are always handed to the
//! [`FileReaper`](crate::cleanup::FileReaper) when the job ends; outputs only
//! when it fails. A job whose future is dropped before it finishes is
//! reported to its listeners as failed and cleaned up the same way.
//!
//! # Example
//!
//! ```ignore
//! use stickerkit_core::processor::{ConversionJob, ProcessorConfig, StickerProcessor, TrimRange};
//!
//! let processor = StickerProcessor::new(config, transcoder, image_encoder, broker, reaper);
//! let job = ConversionJob::new(upload_path, "cat.mp4", processor.config().constraints)
//!     .with_task_id(Some("task-42".to_string()))
//!     .with_trim(TrimRange::new(1.0, 4.0));
//!
//! let sticker = processor.convert_video(job).await?;
//! println!("{} ({} bytes, valid: {})", sticker.result.url, sticker.result.size, sticker.result.size_valid);
//! ```

mod compression;
mod config;
mod error;
mod pipeline;
mod still;
mod types;
mod video;

pub use compression::{
    CompressionController, CompressionOutcome, CompressionPolicy, Tier, VERIFY_STEP,
};
pub use config::ProcessorConfig;
pub use error::ProcessingError;
pub use pipeline::StickerProcessor;
pub use still::IMAGE_STEPS;
pub use types::{
    ConversionJob, ImageOutputs, ImageStickerResult, OutputFile, ProcessorStatus,
    StickerConstraints, TrimRange, VideoOutput, VideoStickerResult,
};
pub use video::VIDEO_STEPS;
