//! Sticker processor: shared job plumbing for the image and video pipelines.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::cleanup::FileReaper;
use crate::converter::{ImageEncoder, Transcoder};
use crate::notifier::{NoopReporter, ProgressReporter, SubscriptionBroker, TaskTracker};

use super::config::ProcessorConfig;
use super::error::ProcessingError;
use super::types::{ConversionJob, ProcessorStatus};

/// Error sent to listeners of a job that stopped without finishing.
const CANCELLED_MESSAGE: &str = "Conversion was interrupted";

/// Counters for finished and running jobs.
#[derive(Default)]
struct JobStats {
    active: AtomicUsize,
    total_processed: AtomicU64,
    total_failed: AtomicU64,
}

impl JobStats {
    fn to_status(&self) -> ProcessorStatus {
        ProcessorStatus {
            active_jobs: self.active.load(Ordering::Relaxed),
            total_processed: self.total_processed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
        }
    }
}

/// Releases a claimed task id when the job ends.
pub(super) struct TaskClaim {
    task_id: Option<String>,
    active_tasks: Arc<Mutex<HashSet<String>>>,
}

impl Drop for TaskClaim {
    fn drop(&mut self) {
        if let Some(task_id) = self.task_id.take() {
            self.active_tasks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&task_id);
        }
    }
}

/// Bookkeeping for one running job.
///
/// `finish` reports the terminal state. A guard dropped before that (the job
/// future was cancelled) still counts the job as failed, tells listeners and
/// schedules the input and any outputs for removal.
pub(super) struct JobGuard<'a> {
    processor: &'a StickerProcessor,
    input_path: PathBuf,
    task_id: Option<String>,
    outputs: Vec<PathBuf>,
    reporter: Box<dyn ProgressReporter>,
    finished: bool,
    _claim: TaskClaim,
}

impl JobGuard<'_> {
    pub(super) fn reporter(&mut self) -> &mut dyn ProgressReporter {
        self.reporter.as_mut()
    }

    /// Paths the job may write; they are removed unless it succeeds.
    pub(super) fn track_outputs(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        self.outputs.extend(paths);
    }

    /// Reports the terminal state and schedules file cleanup.
    pub(super) fn finish<T: Serialize>(
        mut self,
        result: Result<T, ProcessingError>,
    ) -> Result<T, ProcessingError> {
        self.release();
        let processor = self.processor;
        let stats = &processor.stats;

        match result {
            Ok(value) => {
                stats.total_processed.fetch_add(1, Ordering::Relaxed);
                let payload = serde_json::to_value(&value).unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Could not serialize job result");
                    serde_json::Value::Null
                });
                self.reporter.complete(payload);
                Ok(value)
            }
            Err(e) => {
                stats.total_failed.fetch_add(1, Ordering::Relaxed);
                self.discard_outputs();
                tracing::error!(
                    input = %self.input_path.display(),
                    task_id = self.task_id.as_deref().unwrap_or("-"),
                    error = %e,
                    "Sticker conversion failed"
                );
                self.reporter.error(&e.to_string());
                Err(e)
            }
        }
    }

    fn release(&mut self) {
        self.finished = true;
        self.processor.stats.active.fetch_sub(1, Ordering::Relaxed);
        self.processor.reaper.schedule(&self.input_path);
    }

    fn discard_outputs(&self) {
        for path in &self.outputs {
            self.processor.reaper.schedule(path);
        }
    }
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.release();
        self.processor
            .stats
            .total_failed
            .fetch_add(1, Ordering::Relaxed);
        self.discard_outputs();
        tracing::warn!(
            input = %self.input_path.display(),
            task_id = self.task_id.as_deref().unwrap_or("-"),
            "Sticker conversion abandoned before finishing"
        );
        self.reporter.error(CANCELLED_MESSAGE);
    }
}

/// Runs sticker conversion jobs.
///
/// Jobs run on the caller's task; the processor places no bound on how many
/// run at once. Callers that may be cancelled should spawn the job. Each job
/// publishes progress through the broker when it has a task id, and hands its
/// input (plus outputs on failure) to the reaper whatever the outcome.
pub struct StickerProcessor {
    pub(super) config: ProcessorConfig,
    pub(super) transcoder: Arc<dyn Transcoder>,
    pub(super) image_encoder: Arc<dyn ImageEncoder>,
    broker: SubscriptionBroker,
    reaper: FileReaper,
    active_tasks: Arc<Mutex<HashSet<String>>>,
    stats: JobStats,
}

impl StickerProcessor {
    pub fn new(
        config: ProcessorConfig,
        transcoder: Arc<dyn Transcoder>,
        image_encoder: Arc<dyn ImageEncoder>,
        broker: SubscriptionBroker,
        reaper: FileReaper,
    ) -> Self {
        Self {
            config,
            transcoder,
            image_encoder,
            broker,
            reaper,
            active_tasks: Arc::new(Mutex::new(HashSet::new())),
            stats: JobStats::default(),
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn status(&self) -> ProcessorStatus {
        self.stats.to_status()
    }

    /// Whether a job with this task id is currently running.
    pub fn is_task_active(&self, task_id: &str) -> bool {
        self.active_tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(task_id)
    }

    /// Reserves the job's task id, if it has one.
    fn claim_task(&self, job: &ConversionJob) -> Result<TaskClaim, ProcessingError> {
        if let Some(task_id) = &job.task_id {
            let mut tasks = self
                .active_tasks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !tasks.insert(task_id.clone()) {
                return Err(ProcessingError::TaskExists(task_id.clone()));
            }
        }
        Ok(TaskClaim {
            task_id: job.task_id.clone(),
            active_tasks: Arc::clone(&self.active_tasks),
        })
    }

    fn reporter_for(&self, job: &ConversionJob, total_steps: u32) -> Box<dyn ProgressReporter> {
        match &job.task_id {
            Some(task_id) => Box::new(TaskTracker::new(
                task_id.clone(),
                self.broker.clone(),
                total_steps,
            )),
            None => Box::new(NoopReporter),
        }
    }

    /// Claims the task id and sets up reporting. On a duplicate id the input
    /// is still scheduled for removal.
    pub(super) fn begin(
        &self,
        job: &ConversionJob,
        total_steps: u32,
    ) -> Result<JobGuard<'_>, ProcessingError> {
        let claim = match self.claim_task(job) {
            Ok(claim) => claim,
            Err(e) => {
                tracing::warn!(error = %e, "Rejecting job");
                self.reaper.schedule(&job.input_path);
                return Err(e);
            }
        };
        self.stats.active.fetch_add(1, Ordering::Relaxed);
        Ok(JobGuard {
            processor: self,
            input_path: job.input_path.clone(),
            task_id: job.task_id.clone(),
            outputs: Vec::new(),
            reporter: self.reporter_for(job, total_steps),
            finished: false,
            _claim: claim,
        })
    }

    /// Output path and public URL for a file name in the output directory.
    pub(super) fn output_location(&self, filename: &str) -> (PathBuf, String) {
        (
            self.config.output_dir.join(filename),
            self.config.output_url(filename),
        )
    }
}
