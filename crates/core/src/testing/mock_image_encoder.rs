//! Mock still image encoder for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::converter::{
    ConverterError, EncodedImage, ImageEncodeRequest, ImageEncoder, MediaAsset, StillFormat,
};

/// Mock implementation of the ImageEncoder trait.
///
/// Records encode requests and writes a small placeholder file per request
/// (2 KB for PNG, 1 KB for WebP). Unknown paths probe as 800x600.
#[derive(Debug, Clone)]
pub struct MockImageEncoder {
    requests: Arc<RwLock<Vec<ImageEncodeRequest>>>,
    probe_results: Arc<RwLock<HashMap<PathBuf, MediaAsset>>>,
    default_probe: Arc<RwLock<MediaAsset>>,
    /// If set, the next operation fails with this error.
    next_error: Arc<RwLock<Option<ConverterError>>>,
    /// If set, the next encode fails with this error.
    encode_error: Arc<RwLock<Option<ConverterError>>>,
}

impl Default for MockImageEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockImageEncoder {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(Vec::new())),
            probe_results: Arc::new(RwLock::new(HashMap::new())),
            default_probe: Arc::new(RwLock::new(MediaAsset {
                width: 800,
                height: 600,
                duration_secs: None,
                size_bytes: 64 * 1024,
            })),
            next_error: Arc::new(RwLock::new(None)),
            encode_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn recorded_requests(&self) -> Vec<ImageEncodeRequest> {
        self.requests.read().await.clone()
    }

    pub async fn set_probe_result(&self, path: impl AsRef<Path>, asset: MediaAsset) {
        self.probe_results
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), asset);
    }

    pub async fn set_default_probe(&self, asset: MediaAsset) {
        *self.default_probe.write().await = asset;
    }

    pub async fn set_next_error(&self, error: ConverterError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn set_encode_error(&self, error: ConverterError) {
        *self.encode_error.write().await = Some(error);
    }

    async fn take_error(&self) -> Option<ConverterError> {
        self.next_error.write().await.take()
    }
}

#[async_trait]
impl ImageEncoder for MockImageEncoder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, path: &Path) -> Result<MediaAsset, ConverterError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        if let Some(asset) = self.probe_results.read().await.get(path) {
            return Ok(*asset);
        }
        Ok(*self.default_probe.read().await)
    }

    async fn encode(&self, request: ImageEncodeRequest) -> Result<EncodedImage, ConverterError> {
        self.requests.write().await.push(request.clone());

        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        if let Some(err) = self.encode_error.write().await.take() {
            return Err(err);
        }

        let size: u64 = match request.format {
            StillFormat::Png { .. } => 2048,
            StillFormat::Webp { .. } => 1024,
        };
        if let Some(parent) = request.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&request.output_path, vec![0u8; size as usize]).await?;

        Ok(EncodedImage {
            path: request.output_path,
            size_bytes: size,
        })
    }
}
