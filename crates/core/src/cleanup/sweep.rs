use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::Serialize;

/// Outcome of one sweep over one or more directories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Regular files examined.
    pub scanned: usize,
    pub deleted: usize,
    /// Entries that could not be inspected or removed.
    pub failed: usize,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.scanned += other.scanned;
        self.deleted += other.deleted;
        self.failed += other.failed;
    }
}

/// Deletes regular files in `dir` whose modification time is more than
/// `max_age` before `now`.
///
/// A missing directory is an empty sweep. Per-entry failures are logged and
/// counted; they never abort the sweep.
pub async fn sweep_directory_at(dir: &Path, max_age: Duration, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return report,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Cannot read directory for sweep");
            report.failed += 1;
            return report;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Directory listing failed mid-sweep");
                report.failed += 1;
                break;
            }
        };
        let path = entry.path();

        // Entry may vanish between listing and stat.
        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot stat entry");
                report.failed += 1;
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        report.scanned += 1;

        let modified = match metadata.modified() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "No modification time");
                report.failed += 1;
                continue;
            }
        };
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age <= max_age {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), age_secs = age.as_secs(), "Swept old file");
                report.deleted += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete old file");
                report.failed += 1;
            }
        }
    }

    report
}

/// [`sweep_directory_at`] against the current wall clock.
pub async fn sweep_directory(dir: &Path, max_age: Duration) -> SweepReport {
    sweep_directory_at(dir, max_age, SystemTime::now()).await
}

/// Sweeps every directory in turn and sums the reports.
pub async fn sweep_directories<P: AsRef<Path>>(dirs: &[P], max_age: Duration) -> SweepReport {
    let now = SystemTime::now();
    let mut total = SweepReport::default();
    for dir in dirs {
        total.merge(sweep_directory_at(dir.as_ref(), max_age, now).await);
    }
    total
}
