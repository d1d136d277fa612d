//! Mock transcoder for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::converter::{
    ConverterError, MediaAsset, TranscodeOutput, TranscodeProgress, TranscodeRequest, Transcoder,
};

/// Mock implementation of the Transcoder trait.
///
/// Provides controllable behavior for testing:
/// - Record every encode pass for assertions
/// - Script the byte size of each pass's output
/// - Control probe results
/// - Simulate probe or encode failures
/// - Slow passes down to exercise cancellation
///
/// Each pass writes a real file of the scripted size to the requested output
/// path and emits progress at 25/50/75/100 percent.
///
/// # Example
///
/// ```rust,ignore
/// use stickerkit_core::testing::MockTranscoder;
///
/// let transcoder = MockTranscoder::new();
/// // First pass over the ceiling, second pass under it
/// transcoder.push_pass_sizes([300 * 1024, 120 * 1024]).await;
/// ```
#[derive(Debug, Clone)]
pub struct MockTranscoder {
    requests: Arc<RwLock<Vec<TranscodeRequest>>>,
    pass_sizes: Arc<RwLock<VecDeque<u64>>>,
    default_pass_size: Arc<RwLock<u64>>,
    probe_results: Arc<RwLock<HashMap<PathBuf, MediaAsset>>>,
    default_probe: Arc<RwLock<MediaAsset>>,
    /// If set, the next operation of any kind fails with this error.
    next_error: Arc<RwLock<Option<ConverterError>>>,
    /// If set, the next encode pass fails with this error.
    transcode_error: Arc<RwLock<Option<ConverterError>>>,
    /// Time each pass spends between its progress reports and writing output.
    pass_delay: Arc<RwLock<Duration>>,
}

impl Default for MockTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTranscoder {
    /// Create a new mock transcoder.
    ///
    /// Unknown paths probe as a 1920x1080, 5 second clip; passes produce 100 KB.
    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(Vec::new())),
            pass_sizes: Arc::new(RwLock::new(VecDeque::new())),
            default_pass_size: Arc::new(RwLock::new(100 * 1024)),
            probe_results: Arc::new(RwLock::new(HashMap::new())),
            default_probe: Arc::new(RwLock::new(MediaAsset {
                width: 1920,
                height: 1080,
                duration_secs: Some(5.0),
                size_bytes: 4 * 1024 * 1024,
            })),
            next_error: Arc::new(RwLock::new(None)),
            transcode_error: Arc::new(RwLock::new(None)),
            pass_delay: Arc::new(RwLock::new(Duration::ZERO)),
        }
    }

    /// All encode passes performed so far.
    pub async fn recorded_requests(&self) -> Vec<TranscodeRequest> {
        self.requests.read().await.clone()
    }

    pub async fn pass_count(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Queue output sizes for the next passes, in order.
    pub async fn push_pass_sizes(&self, sizes: impl IntoIterator<Item = u64>) {
        self.pass_sizes.write().await.extend(sizes);
    }

    /// Output size used once the scripted sizes run out.
    pub async fn set_default_pass_size(&self, size: u64) {
        *self.default_pass_size.write().await = size;
    }

    /// Set a probe result for a specific path.
    pub async fn set_probe_result(&self, path: impl AsRef<Path>, asset: MediaAsset) {
        self.probe_results
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), asset);
    }

    /// Set the probe result for paths without a specific entry.
    pub async fn set_default_probe(&self, asset: MediaAsset) {
        *self.default_probe.write().await = asset;
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: ConverterError) {
        *self.next_error.write().await = Some(error);
    }

    /// Configure the next encode pass to fail with the given error.
    pub async fn set_transcode_error(&self, error: ConverterError) {
        *self.transcode_error.write().await = Some(error);
    }

    /// Make every pass take at least `delay` before writing its output.
    pub async fn set_pass_delay(&self, delay: Duration) {
        *self.pass_delay.write().await = delay;
    }

    async fn take_error(&self) -> Option<ConverterError> {
        self.next_error.write().await.take()
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
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

    async fn transcode(
        &self,
        request: TranscodeRequest,
        progress_tx: mpsc::Sender<TranscodeProgress>,
    ) -> Result<TranscodeOutput, ConverterError> {
        self.requests.write().await.push(request.clone());

        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        if let Some(err) = self.transcode_error.write().await.take() {
            return Err(err);
        }

        for percent in [25.0f32, 50.0, 75.0, 100.0] {
            let _ = progress_tx.try_send(TranscodeProgress {
                job_id: request.job_id.clone(),
                percent,
                time_secs: request.duration_secs * f64::from(percent) / 100.0,
            });
        }

        let delay = *self.pass_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let size = match self.pass_sizes.write().await.pop_front() {
            Some(size) => size,
            None => *self.default_pass_size.read().await,
        };

        if let Some(parent) = request.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&request.output_path, vec![0u8; size as usize]).await?;

        // Later probes of the output see what was produced.
        self.probe_results.write().await.insert(
            request.output_path.clone(),
            MediaAsset {
                width: request.width,
                height: request.height,
                duration_secs: Some(request.duration_secs),
                size_bytes: size,
            },
        );

        Ok(TranscodeOutput {
            output_path: request.output_path,
            size_bytes: size,
            duration_ms: 1,
        })
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{EncodeSettings, TranscodeHandle};
    use tempfile::TempDir;

    fn request(dir: &TempDir) -> TranscodeRequest {
        TranscodeRequest {
            job_id: "job".to_string(),
            input_path: dir.path().join("in.mp4"),
            output_path: dir.path().join("out/out.webm"),
            width: 512,
            height: 288,
            start_secs: 0.0,
            duration_secs: 3.0,
            fps: 30,
            settings: EncodeSettings {
                bitrate_kbps: 400,
                crf: 30,
            },
        }
    }

    #[tokio::test]
    async fn test_scripted_sizes_then_default() {
        let dir = TempDir::new().unwrap();
        let mock = MockTranscoder::new();
        mock.push_pass_sizes([10]).await;
        mock.set_default_pass_size(20).await;
        let transcoder: Arc<dyn Transcoder> = Arc::new(mock.clone());

        let first = TranscodeHandle::spawn(transcoder.clone(), request(&dir))
            .finish()
            .await
            .unwrap();
        let second = TranscodeHandle::spawn(transcoder, request(&dir))
            .finish()
            .await
            .unwrap();

        assert_eq!(first.size_bytes, 10);
        assert_eq!(second.size_bytes, 20);
        assert_eq!(
            std::fs::metadata(&second.output_path).unwrap().len(),
            20
        );
        assert_eq!(mock.pass_count().await, 2);
    }

    #[tokio::test]
    async fn test_progress_and_output_probe() {
        let dir = TempDir::new().unwrap();
        let mock = MockTranscoder::new();
        let transcoder: Arc<dyn Transcoder> = Arc::new(mock.clone());

        let mut seen = Vec::new();
        let output = TranscodeHandle::spawn(transcoder, request(&dir))
            .run_with(|p| seen.push(p.percent))
            .await
            .unwrap();

        assert_eq!(seen, vec![25.0, 50.0, 75.0, 100.0]);
        let probed = mock.probe(&output.output_path).await.unwrap();
        assert_eq!((probed.width, probed.height), (512, 288));
        assert_eq!(probed.duration_secs, Some(3.0));
    }

    #[tokio::test]
    async fn test_next_error_consumed_once() {
        let mock = MockTranscoder::new();
        mock.set_next_error(ConverterError::probe_failed("nope")).await;

        assert!(mock.probe(Path::new("/x")).await.is_err());
        assert!(mock.probe(Path::new("/x")).await.is_ok());
    }
}
