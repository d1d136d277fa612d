use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

/// What to do with pending deletions at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Delete everything still queued, ignoring remaining grace periods.
    Drain,
    /// Forget queued deletions; the periodic sweep picks the files up later.
    Cancel,
}

enum ReaperCommand {
    Schedule {
        path: PathBuf,
        at: Instant,
    },
    Pending {
        reply: oneshot::Sender<usize>,
    },
    Shutdown {
        mode: ShutdownMode,
        reply: oneshot::Sender<usize>,
    },
}

/// Handle for scheduling delayed file deletion.
#[derive(Clone)]
pub struct FileReaper {
    tx: mpsc::UnboundedSender<ReaperCommand>,
    grace: Duration,
}

impl FileReaper {
    /// Schedules `path` for removal after the configured grace period.
    pub fn schedule(&self, path: impl Into<PathBuf>) {
        self.schedule_after(path, self.grace);
    }

    pub fn schedule_after(&self, path: impl Into<PathBuf>, delay: Duration) {
        let path = path.into();
        let at = Instant::now() + delay;
        if let Err(e) = self.tx.send(ReaperCommand::Schedule { path, at }) {
            if let ReaperCommand::Schedule { path, .. } = e.0 {
                tracing::warn!(path = %path.display(), "File reaper stopped, deletion not scheduled");
            }
        }
    }

    /// Number of deletions still waiting. Zero once the reaper is stopped.
    pub async fn pending(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(ReaperCommand::Pending { reply }).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Stops the reaper and returns how many queued deletions were drained or cancelled.
    pub async fn shutdown(&self, mode: ShutdownMode) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(ReaperCommand::Shutdown { mode, reply }).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Background task owning the deadline queue.
pub struct ReaperTask {
    rx: mpsc::UnboundedReceiver<ReaperCommand>,
    queue: BTreeMap<(Instant, u64), PathBuf>,
    seq: u64,
}

impl ReaperTask {
    /// Run until shutdown. If every handle is dropped first, pending
    /// deletions are drained.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        tracing::debug!("File reaper started");

        loop {
            let next = self.queue.keys().next().map(|(at, _)| *at);
            let wake = next.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(ReaperCommand::Schedule { path, at }) => {
                        self.seq += 1;
                        self.queue.insert((at, self.seq), path);
                    }
                    Some(ReaperCommand::Pending { reply }) => {
                        let _ = reply.send(self.queue.len());
                    }
                    Some(ReaperCommand::Shutdown { mode, reply }) => {
                        let count = self.finish(mode).await;
                        let _ = reply.send(count);
                        break;
                    }
                    None => {
                        self.finish(ShutdownMode::Drain).await;
                        break;
                    }
                },
                _ = sleep_until(wake), if next.is_some() => {
                    self.delete_due().await;
                }
            }
        }

        tracing::debug!("File reaper stopped");
    }

    async fn delete_due(&mut self) {
        let now = Instant::now();
        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let path = entry.remove();
            delete_quietly(&path).await;
        }
    }

    async fn finish(&mut self, mode: ShutdownMode) -> usize {
        let queued = std::mem::take(&mut self.queue);
        let count = queued.len();
        match mode {
            ShutdownMode::Drain => {
                for path in queued.into_values() {
                    delete_quietly(&path).await;
                }
                tracing::info!(count, "Drained pending file deletions");
            }
            ShutdownMode::Cancel => {
                tracing::info!(count, "Cancelled pending file deletions");
            }
        }
        count
    }
}

/// Removes a file, treating "already gone" as success.
async fn delete_quietly(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Deleted file");
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to delete file");
            false
        }
    }
}

/// Create a delayed-delete reaper with the given grace period.
///
/// Returns:
/// - `FileReaper` - handle for scheduling deletions (clone to share)
/// - `ReaperTask` - spawn this as a background task with `tokio::spawn(task.run())`
pub fn create_reaper(grace: Duration) -> (FileReaper, ReaperTask) {
    let (tx, rx) = mpsc::unbounded_channel();
    let reaper = FileReaper { tx, grace };
    let task = ReaperTask {
        rx,
        queue: BTreeMap::new(),
        seq: 0,
    };
    (reaper, task)
}
