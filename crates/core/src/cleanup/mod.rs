//! Working-directory file lifecycle.
//!
//! Two mechanisms keep the upload and output directories bounded:
//!
//! - an age-based [sweep](sweep_directory) run at startup and on a fixed
//!   interval by the [`SweepScheduler`];
//! - a delayed-delete [`FileReaper`] that jobs use to drop their inputs (and
//!   partial outputs on failure) after a short grace period. Pending
//!   deletions live in a deadline queue owned by the [`ReaperTask`], so
//!   shutdown can drain or cancel them.
//!
//! Both tolerate files that are already gone.

mod reaper;
mod scheduler;
mod sweep;

pub use reaper::{create_reaper, FileReaper, ReaperTask, ShutdownMode};
pub use scheduler::SweepScheduler;
pub use sweep::{sweep_directories, sweep_directory, sweep_directory_at, SweepReport};
