use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::sweep::sweep_directories;
use crate::config::CleanupConfig;

/// Periodic age-based sweep of the working directories.
pub struct SweepScheduler {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl SweepScheduler {
    /// Spawns the sweep loop. With `run_on_start` the first sweep happens
    /// immediately, otherwise after one `interval`.
    pub fn spawn(
        dirs: Vec<PathBuf>,
        max_age: Duration,
        interval: Duration,
        run_on_start: bool,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move {
            info!(
                dirs = dirs.len(),
                interval_secs = interval.as_secs(),
                max_age_secs = max_age.as_secs(),
                "Sweep scheduler started"
            );
            let mut delay = if run_on_start { Duration::ZERO } else { interval };
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Sweep scheduler received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {
                        let report = sweep_directories(&dirs, max_age).await;
                        if report.failed > 0 {
                            warn!(?report, "Sweep finished with failures");
                        } else if report.deleted > 0 {
                            info!(deleted = report.deleted, scanned = report.scanned, "Swept old files");
                        }
                        delay = interval;
                    }
                }
            }
            info!("Sweep scheduler stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Spawns a scheduler from the `[cleanup]` config section.
    pub fn from_config(dirs: Vec<PathBuf>, config: &CleanupConfig) -> Self {
        Self::spawn(
            dirs,
            Duration::from_secs(config.max_age_secs),
            Duration::from_secs(config.interval_secs),
            config.run_on_start,
        )
    }

    /// Signals the loop to stop and waits for it. An in-flight sweep finishes first.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            warn!("Sweep scheduler task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn old_file(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        let file = std::fs::File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(7200))
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_run_on_start_sweeps_immediately() {
        let dir = TempDir::new().unwrap();
        let stale = old_file(&dir, "stale.png");
        let fresh = dir.path().join("fresh.png");
        std::fs::write(&fresh, b"x").unwrap();

        let scheduler = SweepScheduler::spawn(
            vec![dir.path().to_path_buf()],
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            true,
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop().await;

        assert!(!stale.exists());
        assert!(fresh.exists());
    }

    #[tokio::test]
    async fn test_without_run_on_start_waits_for_interval() {
        let dir = TempDir::new().unwrap();
        let stale = old_file(&dir, "stale.png");

        let scheduler = SweepScheduler::spawn(
            vec![dir.path().to_path_buf()],
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            false,
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;

        assert!(stale.exists());
    }

    #[tokio::test]
    async fn test_repeats_on_interval() {
        let dir = TempDir::new().unwrap();
        let scheduler = SweepScheduler::spawn(
            vec![dir.path().to_path_buf()],
            Duration::from_secs(3600),
            Duration::from_millis(50),
            false,
        );

        let stale = old_file(&dir, "later.webm");
        tokio::time::sleep(Duration::from_millis(300)).await;
        scheduler.stop().await;

        assert!(!stale.exists());
    }
}
