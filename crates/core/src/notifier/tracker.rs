//! Per-task progress tracking.

use std::time::{Duration, Instant};

use super::broker::SubscriptionBroker;
use super::types::{now_millis, ServerMessage, TaskStatus};

/// `min(round(step * 100 / total), 100)`. A zero total counts as done.
pub fn percentage(step: u32, total: u32) -> u32 {
    if total == 0 {
        return 100;
    }
    let pct = (f64::from(step) * 100.0 / f64::from(total)).round() as u32;
    pct.min(100)
}

/// Sink for a job's progress.
///
/// Pipelines report through this trait unconditionally; jobs without a task
/// id get a [`NoopReporter`].
pub trait ProgressReporter: Send {
    /// Moves to `step` of the declared total.
    fn update(&mut self, step: u32, message: &str);

    /// Moves one step forward.
    fn increment(&mut self, message: &str);

    /// Terminal success carrying the job result.
    fn complete(&mut self, result: serde_json::Value);

    /// Terminal failure with a short human-readable message.
    fn error(&mut self, message: &str);
}

/// Reporter for untracked jobs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn update(&mut self, _step: u32, _message: &str) {}
    fn increment(&mut self, _message: &str) {}
    fn complete(&mut self, _result: serde_json::Value) {}
    fn error(&mut self, _message: &str) {}
}

/// Tracks one task and publishes its progress through the broker.
pub struct TaskTracker {
    task_id: String,
    broker: SubscriptionBroker,
    total_steps: u32,
    current_step: u32,
    status: TaskStatus,
    started_at: Instant,
}

impl TaskTracker {
    pub fn new(task_id: impl Into<String>, broker: SubscriptionBroker, total_steps: u32) -> Self {
        Self {
            task_id: task_id.into(),
            broker,
            total_steps,
            current_step: 0,
            status: TaskStatus::Pending,
            started_at: Instant::now(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    pub fn total_steps(&self) -> u32 {
        self.total_steps
    }

    pub fn set_total_steps(&mut self, total_steps: u32) {
        self.total_steps = total_steps;
    }

    pub fn percentage(&self) -> u32 {
        percentage(self.current_step, self.total_steps)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    fn finished(&self, event: &str) -> bool {
        if self.status.is_terminal() {
            tracing::debug!(
                task_id = %self.task_id,
                status = ?self.status,
                event,
                "Ignoring event for finished task"
            );
            return true;
        }
        false
    }
}

impl ProgressReporter for TaskTracker {
    fn update(&mut self, step: u32, message: &str) {
        if self.finished("progress") {
            return;
        }
        // Steps never move backwards.
        self.current_step = self.current_step.max(step);
        self.status = TaskStatus::Processing;

        let percentage = self.percentage();
        tracing::debug!(task_id = %self.task_id, percentage, message, "Task progress");

        self.broker.broadcast(
            self.task_id.clone(),
            ServerMessage::Progress {
                task_id: self.task_id.clone(),
                percentage,
                step: self.current_step,
                total_steps: self.total_steps,
                message: message.to_string(),
                status: self.status,
                elapsed: self.elapsed_ms(),
                timestamp: now_millis(),
            },
        );
    }

    fn increment(&mut self, message: &str) {
        self.update(self.current_step.saturating_add(1), message);
    }

    fn complete(&mut self, result: serde_json::Value) {
        if self.finished("complete") {
            return;
        }
        self.status = TaskStatus::Completed;
        let elapsed = self.elapsed_ms();
        tracing::info!(task_id = %self.task_id, elapsed_ms = elapsed, "Task completed");

        self.broker.broadcast(
            self.task_id.clone(),
            ServerMessage::Complete {
                task_id: self.task_id.clone(),
                result,
                elapsed,
                timestamp: now_millis(),
            },
        );
        self.broker.close_task(self.task_id.clone());
    }

    fn error(&mut self, message: &str) {
        if self.finished("error") {
            return;
        }
        self.status = TaskStatus::Failed;
        tracing::error!(task_id = %self.task_id, error = message, "Task failed");

        self.broker.broadcast(
            self.task_id.clone(),
            ServerMessage::Error {
                task_id: self.task_id.clone(),
                message: message.to_string(),
                timestamp: now_millis(),
            },
        );
        self.broker.close_task(self.task_id.clone());
    }
}
