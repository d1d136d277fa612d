//! Converter module for producing sticker media.
//!
//! Two encoder seams live here:
//!
//! - [`Transcoder`]: out-of-process video probing and encoding. The FFmpeg
//!   implementation trims, scales and re-encodes to VP9 WebM with an alpha
//!   capable pixel format, streaming progress over a channel.
//! - [`ImageEncoder`]: in-process still image resize and encode to PNG or WebP.
//!
//! # Example
//!
//! ```ignore
//! use stickerkit_core::converter::{FfmpegTranscoder, TranscodeHandle, Transcoder};
//!
//! let transcoder = Arc::new(FfmpegTranscoder::with_defaults());
//! transcoder.validate().await?;
//!
//! let output = TranscodeHandle::spawn(transcoder, request)
//!     .run_with(|p| println!("{:.0}%", p.percent))
//!     .await?;
//! println!("{} bytes", output.size_bytes);
//! ```

mod config;
mod error;
mod ffmpeg;
mod handle;
mod scale;
mod still;
mod traits;
mod types;

pub use config::ConverterConfig;
pub use error::ConverterError;
pub use ffmpeg::FfmpegTranscoder;
pub use handle::TranscodeHandle;
pub use scale::scale_to_longest_side;
pub use still::RasterImageEncoder;
pub use traits::{ImageEncoder, Transcoder};
pub use types::{
    EncodeSettings, EncodedImage, ImageEncodeRequest, MediaAsset, StillFormat, TranscodeOutput,
    TranscodeProgress, TranscodeRequest,
};
