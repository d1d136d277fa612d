//! Testing utilities and mock implementations.
//!
//! Mocks for the two encoder seams let the pipelines, the compression policy
//! and the HTTP layer be exercised without ffmpeg or real image data.
//!
//! # Example
//!
//! ```rust,ignore
//! use stickerkit_core::testing::{MockImageEncoder, MockTranscoder};
//!
//! let transcoder = MockTranscoder::new();
//! transcoder.push_pass_sizes([300 * 1024, 120 * 1024]).await;
//!
//! let images = MockImageEncoder::new();
//! // Use in AppState...
//! ```

mod mock_image_encoder;
mod mock_transcoder;

pub use mock_image_encoder::MockImageEncoder;
pub use mock_transcoder::MockTranscoder;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::converter::MediaAsset;

    /// A landscape video source of the given length.
    pub fn video_asset(width: u32, height: u32, duration_secs: f64) -> MediaAsset {
        MediaAsset {
            width,
            height,
            duration_secs: Some(duration_secs),
            size_bytes: 2 * 1024 * 1024,
        }
    }

    /// A still image source.
    pub fn image_asset(width: u32, height: u32) -> MediaAsset {
        MediaAsset {
            width,
            height,
            duration_secs: None,
            size_bytes: 256 * 1024,
        }
    }
}
