//! Still image encoder backed by the `image` and `webp` crates.

use async_trait::async_trait;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use super::error::ConverterError;
use super::traits::ImageEncoder;
use super::types::{EncodedImage, ImageEncodeRequest, MediaAsset, StillFormat};

/// In-process raster encoder for PNG and WebP stickers.
///
/// Decoding and encoding are CPU bound and run on the blocking pool.
#[derive(Debug, Default, Clone)]
pub struct RasterImageEncoder;

impl RasterImageEncoder {
    pub fn new() -> Self {
        Self
    }
}

fn png_compression(level: u8) -> CompressionType {
    match level {
        0..=2 => CompressionType::Fast,
        3..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

/// Opens an image for reading, detecting its format from the file's leading
/// bytes. Stored uploads keep whatever extension the client sent.
fn open_image(path: &Path) -> Result<ImageReader<BufReader<File>>, ConverterError> {
    Ok(ImageReader::open(path)?.with_guessed_format()?)
}

fn encode_blocking(request: &ImageEncodeRequest) -> Result<u64, ConverterError> {
    if !request.input_path.exists() {
        return Err(ConverterError::InputNotFound {
            path: request.input_path.clone(),
        });
    }

    let source = open_image(&request.input_path)?
        .decode()
        .map_err(|e| ConverterError::unsupported_input(format!("cannot decode image: {}", e)))?;

    // Stretch to the exact box; aspect is already preserved by the caller's dimensions.
    let resized = source.resize_exact(request.width, request.height, FilterType::Lanczos3);

    if let Some(parent) = request.output_path.parent() {
        std::fs::create_dir_all(parent).map_err(|_| ConverterError::OutputDirectoryFailed {
            path: parent.to_path_buf(),
        })?;
    }

    match request.format {
        StillFormat::Png { compression } => {
            let writer = BufWriter::new(File::create(&request.output_path)?);
            let encoder =
                PngEncoder::new_with_quality(writer, png_compression(compression), PngFilter::Adaptive);
            resized
                .write_with_encoder(encoder)
                .map_err(|e| ConverterError::encode_failed(format!("png: {}", e)))?;
        }
        StillFormat::Webp { quality } => {
            // libwebp only takes 8-bit RGB or RGBA buffers
            let buffer = if resized.color().has_alpha() {
                DynamicImage::ImageRgba8(resized.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(resized.to_rgb8())
            };
            let encoder = webp::Encoder::from_image(&buffer)
                .map_err(|reason| ConverterError::encode_failed(format!("webp: {}", reason)))?;
            let bytes = encoder.encode(f32::from(quality));
            std::fs::write(&request.output_path, &*bytes)?;
        }
    }

    Ok(std::fs::metadata(&request.output_path)?.len())
}

#[async_trait]
impl ImageEncoder for RasterImageEncoder {
    fn name(&self) -> &str {
        "raster"
    }

    async fn probe(&self, path: &Path) -> Result<MediaAsset, ConverterError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            if !path.exists() {
                return Err(ConverterError::InputNotFound { path });
            }
            let (width, height) = open_image(&path)?.into_dimensions().map_err(|e| {
                ConverterError::unsupported_input(format!("cannot read image header: {}", e))
            })?;
            let size_bytes = std::fs::metadata(&path)?.len();
            Ok(MediaAsset {
                width,
                height,
                duration_secs: None,
                size_bytes,
            })
        })
        .await
        .map_err(|e| ConverterError::probe_failed(format!("probe task failed: {}", e)))?
    }

    async fn encode(&self, request: ImageEncodeRequest) -> Result<EncodedImage, ConverterError> {
        tracing::debug!(
            input = %request.input_path.display(),
            output = %request.output_path.display(),
            width = request.width,
            height = request.height,
            format = request.format.extension(),
            "Encoding still image"
        );

        let size_bytes = {
            let request = request.clone();
            tokio::task::spawn_blocking(move || encode_blocking(&request))
                .await
                .map_err(|e| ConverterError::encode_failed(format!("encode task failed: {}", e)))??
        };

        Ok(EncodedImage {
            path: request.output_path,
            size_bytes,
        })
    }
}
