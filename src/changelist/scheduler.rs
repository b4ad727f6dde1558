//! Refresh scheduling
//!
//! At most one refresh is in flight. Requests that arrive while one runs are
//! dropped; the running pass reads the latest working tree anyway. Requests
//! shortly after a mutation wait until the mutation has had time to settle.

use super::{ChangelistManager, Observation};
use crate::repo::VcsProvider;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Manager shared between the scheduler and its callers
pub type SharedManager = Arc<Mutex<ChangelistManager>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new partition was published
    Completed,
    /// Another refresh was already running
    Dropped,
    /// Reading the working tree failed; the partition is unchanged
    Failed,
}

/// Serializes refreshes of one manager
pub struct RefreshScheduler {
    manager: SharedManager,
    vcs: Arc<dyn VcsProvider>,
    running: AtomicBool,
    quiet_window: Duration,
}

/// Clears the running flag however the pass ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RefreshScheduler {
    pub fn new(manager: SharedManager, vcs: Arc<dyn VcsProvider>, quiet_window: Duration) -> Self {
        Self {
            manager,
            vcs,
            running: AtomicBool::new(false),
            quiet_window,
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// Refresh now, or once the quiet window after the latest mutation has
    /// passed.
    ///
    /// Working-tree reads happen on the blocking pool without holding the
    /// manager, so mutations stay responsive while a slow read is running.
    pub async fn request_refresh(&self) -> RefreshOutcome {
        if self.state() == SchedulerState::Running {
            tracing::debug!("refresh dropped, another one is running");
            return RefreshOutcome::Dropped;
        }

        // Each new mutation pushes the deadline out again
        loop {
            let remaining = self.manager.lock().await.quiet_remaining(self.quiet_window);
            match remaining {
                Some(delay) => {
                    tracing::debug!(?delay, "refresh delayed after mutation");
                    tokio::time::sleep(delay).await;
                }
                None => break,
            }
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("refresh dropped, another one is running");
            return RefreshOutcome::Dropped;
        }
        let _guard = RunningGuard(&self.running);

        let previous = self.manager.lock().await.previous_hunks().clone();
        let vcs = Arc::clone(&self.vcs);
        let collected =
            tokio::task::spawn_blocking(move || Observation::collect(vcs.as_ref(), &previous)).await;

        let observation = match collected {
            Ok(Ok(observation)) => observation,
            Ok(Err(e)) => {
                tracing::warn!("Refresh skipped: {}", e);
                return RefreshOutcome::Failed;
            }
            Err(e) => {
                tracing::warn!("Refresh task failed: {}", e);
                return RefreshOutcome::Failed;
            }
        };

        self.manager.lock().await.apply(observation);
        RefreshOutcome::Completed
    }

    /// Request a refresh in the background
    pub fn schedule(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.request_refresh().await;
        });
    }

    /// Request a refresh in the background after `delay`
    pub fn schedule_after(self: &Arc<Self>, delay: Duration) {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.request_refresh().await;
        });
    }
}
