//! Async facade over a shared manager
//!
//! Mutations apply immediately and schedule a background refresh so the
//! partition catches up with any side effects on the working tree.

use super::{
    ChangelistManager, MoveOutcome, Partition, RefreshOutcome, RefreshScheduler, Result,
    SharedManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

pub struct ChangelistService {
    manager: SharedManager,
    scheduler: Arc<RefreshScheduler>,
    settle_delay: Duration,
}

impl ChangelistService {
    pub fn new(manager: ChangelistManager) -> Self {
        let vcs = manager.vcs();
        let options = manager.options().clone();
        let manager = Arc::new(Mutex::new(manager));
        let scheduler = Arc::new(RefreshScheduler::new(
            Arc::clone(&manager),
            vcs,
            options.quiet_window,
        ));

        Self {
            manager,
            scheduler,
            settle_delay: options.settle_delay,
        }
    }

    pub fn manager(&self) -> SharedManager {
        Arc::clone(&self.manager)
    }

    pub fn scheduler(&self) -> &Arc<RefreshScheduler> {
        &self.scheduler
    }

    pub async fn request_refresh(&self) -> RefreshOutcome {
        self.scheduler.request_refresh().await
    }

    pub async fn subscribe(&self) -> broadcast::Receiver<Arc<Partition>> {
        self.manager.lock().await.subscribe()
    }

    pub async fn partition(&self) -> Arc<Partition> {
        self.manager.lock().await.partition()
    }

    pub async fn create_changelist(&self, name: &str, description: Option<String>) -> Result<String> {
        let id = self.manager.lock().await.create_changelist(name, description)?;
        Ok(id)
    }

    pub async fn delete_changelist(&self, id: &str) -> Result<()> {
        self.manager.lock().await.delete_changelist(id)?;
        self.scheduler.schedule();
        Ok(())
    }

    pub async fn rename_changelist(&self, id: &str, new_name: &str) -> Result<()> {
        self.manager.lock().await.rename_changelist(id, new_name)
    }

    pub async fn set_active(&self, id: &str) -> Result<()> {
        self.manager.lock().await.set_active(id)
    }

    /// Move a file; files with hunks get a second refresh once staging side
    /// effects have settled
    pub async fn move_file_to_changelist(&self, file_id: &str, target_id: &str) -> Result<MoveOutcome> {
        let outcome = self
            .manager
            .lock()
            .await
            .move_file_to_changelist(file_id, target_id)?;

        self.scheduler.schedule();
        if outcome.had_hunks {
            self.scheduler.schedule_after(self.settle_delay);
        }
        Ok(outcome)
    }

    pub async fn move_file_to_unversioned(&self, file_id: &str) -> Result<()> {
        self.manager.lock().await.move_file_to_unversioned(file_id)?;
        self.scheduler.schedule();
        Ok(())
    }

    pub async fn move_hunk_to_changelist(&self, hunk_id: &str, target_id: &str) -> Result<()> {
        self.manager
            .lock()
            .await
            .move_hunk_to_changelist(hunk_id, target_id)?;
        self.scheduler.schedule();
        Ok(())
    }

    pub async fn move_changelist_files(&self, source_id: &str, target_id: &str) -> Result<usize> {
        let moved = self
            .manager
            .lock()
            .await
            .move_changelist_files(source_id, target_id)?;
        self.scheduler.schedule();
        Ok(moved)
    }
}
