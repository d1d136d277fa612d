//! Spawned transcode passes exposing a progress stream and a result future.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::error::ConverterError;
use super::traits::Transcoder;
use super::types::{TranscodeOutput, TranscodeProgress, TranscodeRequest};

/// Progress events buffered per pass before the encoder starts dropping them.
const PROGRESS_BUFFER: usize = 64;

/// Handle to a transcode pass running on its own task.
///
/// Dropping the handle aborts a pass that is still running.
pub struct TranscodeHandle {
    progress: mpsc::Receiver<TranscodeProgress>,
    result: JoinHandle<Result<TranscodeOutput, ConverterError>>,
}

impl TranscodeHandle {
    /// Starts `request` on a background task.
    pub fn spawn(transcoder: Arc<dyn Transcoder>, request: TranscodeRequest) -> Self {
        let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
        let result = tokio::spawn(async move { transcoder.transcode(request, tx).await });
        Self {
            progress: rx,
            result,
        }
    }

    /// Next progress event, or `None` once the pass has finished.
    pub async fn next_progress(&mut self) -> Option<TranscodeProgress> {
        self.progress.recv().await
    }

    /// Waits for the pass result, discarding any unread progress.
    pub async fn finish(mut self) -> Result<TranscodeOutput, ConverterError> {
        self.progress.close();
        (&mut self.result).await.map_err(|e| {
            ConverterError::transcode_failed(format!("transcode task aborted: {}", e), None)
        })?
    }

    /// Drains progress in production order through `on_progress`, then returns the result.
    pub async fn run_with<F>(mut self, mut on_progress: F) -> Result<TranscodeOutput, ConverterError>
    where
        F: FnMut(TranscodeProgress),
    {
        while let Some(progress) = self.progress.recv().await {
            on_progress(progress);
        }
        self.finish().await
    }
}

impl Drop for TranscodeHandle {
    fn drop(&mut self) {
        self.result.abort();
    }
}
