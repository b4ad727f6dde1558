//! Changelist manager
//!
//! Single owner of the assignment store and the current partition. Every
//! mutation updates the store, rebuilds the partition from the last
//! observation and persists the result.

use super::{
    AssignmentStore, Changelist, ChangelistError, FileItem, MoveTarget, Observation, Partition,
    PendingMove, ReconcileInput, Reconciler, Result,
};
use crate::hunk::Hunk;
use crate::repo::{CommitOptions, RepoConfig, VcsProvider};
use crate::storage::StateStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Timing and matching parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerOptions {
    pub proximity_threshold: u32,
    /// How long a manual move overrides refreshes
    pub pending_move_window: Duration,
    /// Refreshes are held back this long after a mutation
    pub quiet_window: Duration,
    /// Delay of the second refresh after moving a file with hunks
    pub settle_delay: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::from(&RepoConfig::default())
    }
}

impl From<&RepoConfig> for ManagerOptions {
    fn from(config: &RepoConfig) -> Self {
        Self {
            proximity_threshold: config.proximity_threshold,
            pending_move_window: config.pending_move_window(),
            quiet_window: config.quiet_window(),
            settle_delay: config.settle_delay(),
        }
    }
}

/// Result of moving a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    /// The move transferred hunks rather than a file-level assignment
    pub had_hunks: bool,
}

const UPDATE_CHANNEL_CAPACITY: usize = 16;

/// Owns changelist state for one working tree
pub struct ChangelistManager {
    vcs: Arc<dyn VcsProvider>,
    storage: Box<dyn StateStore>,
    store: AssignmentStore,
    reconciler: Reconciler,
    options: ManagerOptions,
    /// Last successful read of the working tree
    observation: Observation,
    previous_hunks: HashMap<String, Vec<Hunk>>,
    partition: Arc<Partition>,
    pending_moves: Vec<PendingMove>,
    last_mutation: Option<Instant>,
    updates: broadcast::Sender<Arc<Partition>>,
    /// Storage version the in-memory store was loaded at
    storage_version: Option<i64>,
}

impl ChangelistManager {
    /// Create a manager from persisted state. Unreadable state is logged and
    /// replaced by a single default changelist.
    pub fn new(vcs: Arc<dyn VcsProvider>, storage: Box<dyn StateStore>, options: ManagerOptions) -> Self {
        let snapshot = storage.load_snapshot().unwrap_or_else(|e| {
            tracing::warn!("Failed to load changelist state: {:#}", e);
            None
        });
        let previous_hunks = storage.load_hunk_cache().unwrap_or_else(|e| {
            tracing::warn!("Failed to load hunk cache: {:#}", e);
            HashMap::new()
        });
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let storage_version = storage.data_version().ok();

        Self {
            vcs,
            storage,
            store: AssignmentStore::load(snapshot),
            reconciler: Reconciler::with_threshold(options.proximity_threshold),
            options,
            observation: Observation::default(),
            previous_hunks,
            partition: Arc::new(Partition::default()),
            pending_moves: Vec::new(),
            last_mutation: None,
            updates,
            storage_version,
        }
    }

    // ==================== Refresh ====================

    /// Read the working tree and reconcile. On a failed read the partition
    /// is left unchanged and `false` is returned.
    pub fn refresh(&mut self) -> bool {
        match Observation::collect(self.vcs.as_ref(), &self.previous_hunks) {
            Ok(observation) => {
                self.apply(observation);
                true
            }
            Err(e) => {
                tracing::warn!("Refresh skipped: {}", e);
                false
            }
        }
    }

    /// Reconcile a completed observation
    pub fn apply(&mut self, observation: Observation) {
        self.sync_storage();
        self.observation = observation;
        self.rebuild();
    }

    /// Pick up state another process saved since we last looked, so the
    /// next save doesn't overwrite it
    fn sync_storage(&mut self) {
        let version = match self.storage.data_version() {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!("Failed to check changelist state: {:#}", e);
                return;
            }
        };
        if self.storage_version == Some(version) {
            return;
        }

        match self.storage.load_snapshot() {
            Ok(snapshot) => self.store = AssignmentStore::load(snapshot),
            Err(e) => {
                tracing::warn!("Failed to reload changelist state: {:#}", e);
                return;
            }
        }
        match self.storage.load_hunk_cache() {
            Ok(cache) => self.previous_hunks = cache,
            Err(e) => tracing::warn!("Failed to reload hunk cache: {:#}", e),
        }
        self.storage_version = Some(version);
        tracing::debug!(version, "reloaded changelist state saved elsewhere");
    }

    /// Reconcile the last observation again, publish and persist
    pub fn rebuild(&mut self) {
        let now = std::time::Instant::now();
        let window = self.options.pending_move_window;
        self.pending_moves.retain(|mv| !mv.is_expired(now, window));

        let result = self.reconciler.reconcile(
            &mut self.store,
            ReconcileInput {
                observation: &self.observation,
                previous_hunks: &self.previous_hunks,
                previous: &self.partition,
                pending_moves: &self.pending_moves,
            },
        );

        self.previous_hunks = result.hunks;
        self.partition = Arc::new(result.partition);

        // No subscribers is fine
        let _ = self.updates.send(Arc::clone(&self.partition));

        self.persist();
    }

    fn persist(&self) {
        if let Err(e) = self.storage.save_snapshot(&self.store.save()) {
            tracing::warn!("Failed to save changelist state: {:#}", e);
        }
        if let Err(e) = self.storage.save_hunk_cache(&self.previous_hunks) {
            tracing::warn!("Failed to save hunk cache: {:#}", e);
        }
    }

    /// One message per reconciliation pass
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Partition>> {
        self.updates.subscribe()
    }

    pub fn partition(&self) -> Arc<Partition> {
        Arc::clone(&self.partition)
    }

    pub fn store(&self) -> &AssignmentStore {
        &self.store
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    pub fn previous_hunks(&self) -> &HashMap<String, Vec<Hunk>> {
        &self.previous_hunks
    }

    pub fn vcs(&self) -> Arc<dyn VcsProvider> {
        Arc::clone(&self.vcs)
    }

    /// Time left before `window` has passed since the latest mutation
    pub fn quiet_remaining(&self, window: Duration) -> Option<Duration> {
        let elapsed = self.last_mutation?.elapsed();
        window.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    fn touch(&mut self) {
        self.last_mutation = Some(Instant::now());
    }

    // ==================== Changelists ====================

    /// Create a changelist and return its id
    pub fn create_changelist(&mut self, name: &str, description: Option<String>) -> Result<String> {
        self.sync_storage();
        if name.trim().is_empty() {
            return Err(ChangelistError::EmptyName);
        }
        if self.store.is_name_taken(name, None) {
            return Err(ChangelistError::DuplicateName(name.trim().to_string()));
        }

        let description = description.filter(|d| !d.trim().is_empty());
        let id = self.store.create_changelist(name, description);
        tracing::info!("Created changelist '{}'", name.trim());

        self.touch();
        self.rebuild();
        Ok(id)
    }

    /// Delete a changelist; its files go to the active changelist, or to the
    /// default when the active one is deleted
    pub fn delete_changelist(&mut self, id: &str) -> Result<()> {
        self.sync_storage();
        let cl = self.require(id)?;
        if cl.is_default {
            return Err(ChangelistError::DefaultChangelist);
        }

        if let Some(target) = self.store.delete_changelist(id) {
            for hunk in self.previous_hunks.values_mut().flatten() {
                if hunk.changelist_id.as_deref() == Some(id) {
                    hunk.changelist_id = Some(target.clone());
                }
            }
            tracing::info!("Deleted changelist {}, files moved to {}", id, target);
        }

        self.touch();
        self.rebuild();
        Ok(())
    }

    pub fn rename_changelist(&mut self, id: &str, new_name: &str) -> Result<()> {
        self.sync_storage();
        self.store.rename_changelist(id, new_name)?;
        self.touch();
        self.rebuild();
        Ok(())
    }

    /// Make a changelist the target for new changes
    pub fn set_active(&mut self, id: &str) -> Result<()> {
        self.sync_storage();
        if !self.store.set_active(id) {
            return Err(ChangelistError::UnknownChangelist(id.to_string()));
        }
        self.touch();
        self.rebuild();
        Ok(())
    }

    pub fn set_expanded(&mut self, id: &str, expanded: bool) -> Result<()> {
        self.sync_storage();
        if !self.store.set_expanded(id, expanded) {
            return Err(ChangelistError::UnknownChangelist(id.to_string()));
        }
        self.rebuild();
        Ok(())
    }

    /// A changelist by id, or by case-insensitive trimmed name
    pub fn find_changelist(&self, name_or_id: &str) -> Option<&Changelist> {
        self.store.get(name_or_id).or_else(|| {
            self.store
                .changelists()
                .iter()
                .find(|cl| cl.has_name(name_or_id))
        })
    }

    fn require(&self, id: &str) -> Result<&Changelist> {
        self.store
            .get(id)
            .ok_or_else(|| ChangelistError::UnknownChangelist(id.to_string()))
    }

    // ==================== Moves ====================

    /// Move a file from wherever it is first found.
    ///
    /// A file with hunks only gives up the hunks of the changelist it was
    /// found in; hunks in other changelists stay put.
    pub fn move_file_to_changelist(&mut self, file_id: &str, target_id: &str) -> Result<MoveOutcome> {
        let file = self
            .partition
            .find_file(file_id)
            .cloned()
            .ok_or_else(|| ChangelistError::UnknownFile(file_id.to_string()))?;
        self.move_placed(file, target_id)
    }

    /// Move the copy of a file that sits in `source` (`None`: unversioned)
    pub fn move_file_from(
        &mut self,
        file_id: &str,
        source: Option<&str>,
        target_id: &str,
    ) -> Result<MoveOutcome> {
        let file = self
            .partition
            .find_in(source, file_id)
            .cloned()
            .ok_or_else(|| ChangelistError::UnknownFile(file_id.to_string()))?;
        self.move_placed(file, target_id)
    }

    fn move_placed(&mut self, file: FileItem, target_id: &str) -> Result<MoveOutcome> {
        self.sync_storage();
        self.require(target_id)?;

        let had_hunks = self.reassign(&file, target_id);
        tracing::info!(
            "Moved {} from {} to {}",
            file.path,
            file.changelist_id.as_deref().unwrap_or("unversioned"),
            target_id
        );

        self.push_pending(PendingMove::new(
            &file.path,
            file.changelist_id.clone(),
            MoveTarget::Changelist(target_id.to_string()),
        ));
        self.touch();
        self.rebuild();

        Ok(MoveOutcome { had_hunks })
    }

    /// Point one placement of a file at `target_id`; true if hunks moved
    fn reassign(&mut self, file: &FileItem, target_id: &str) -> bool {
        if file.hunks.is_empty() {
            self.store.assign_file(&file.path, target_id);
            return false;
        }

        for hunk in &file.hunks {
            self.store.assign_hunk(&hunk.id, target_id);
        }
        let source = file.changelist_id.clone();
        self.retag_cached(&file.path, |h| h.changelist_id == source, Some(target_id));
        true
    }

    /// Take a file out of every changelist, unstaging it if tracked
    pub fn move_file_to_unversioned(&mut self, file_id: &str) -> Result<()> {
        self.sync_storage();
        let file = self
            .partition
            .find_file(file_id)
            .cloned()
            .ok_or_else(|| ChangelistError::UnknownFile(file_id.to_string()))?;

        self.store.mark_unversioned(&file.path);
        if let Some(hunks) = self.previous_hunks.get(&file.path) {
            for hunk in hunks {
                self.store.unassign_hunk(&hunk.id);
            }
        }
        self.retag_cached(&file.path, |_| true, None);

        match self.vcs.is_tracked(&file.path) {
            Ok(true) => {
                if let Err(e) = self.vcs.unstage(&file.path) {
                    tracing::warn!("Failed to unstage {}: {}", file.path, e);
                }
            }
            Ok(false) => {}
            Err(e) => tracing::warn!("Failed to check whether {} is tracked: {}", file.path, e),
        }
        tracing::info!("Moved {} to unversioned", file.path);

        self.push_pending(PendingMove::new(
            &file.path,
            file.changelist_id.clone(),
            MoveTarget::Unversioned,
        ));
        self.touch();
        self.rebuild();
        Ok(())
    }

    /// Reassign a single hunk; the file's placement follows on rebuild
    pub fn move_hunk_to_changelist(&mut self, hunk_id: &str, target_id: &str) -> Result<()> {
        self.sync_storage();
        self.require(target_id)?;
        let path = self
            .partition
            .find_hunk(hunk_id)
            .map(|hunk| hunk.file_path.clone())
            .ok_or_else(|| ChangelistError::UnknownHunk(hunk_id.to_string()))?;

        self.store.assign_hunk(hunk_id, target_id);
        self.retag_cached(&path, |h| h.id == hunk_id, Some(target_id));
        self.drop_pending(&path);
        tracing::info!("Moved hunk {} to {}", hunk_id, target_id);

        self.touch();
        self.rebuild();
        Ok(())
    }

    /// Move every file of `source_id` to `target_id`; returns how many moved.
    ///
    /// Besides the file-level assignment, each file's hunks that sit in
    /// `source_id` move too. Hunk assignments left behind would pull the
    /// file back into `source_id` once the pending move expires.
    pub fn move_changelist_files(&mut self, source_id: &str, target_id: &str) -> Result<usize> {
        self.sync_storage();
        self.require(source_id)?;
        self.require(target_id)?;

        let files = self.partition.files(Some(source_id)).to_vec();
        for file in &files {
            self.reassign(file, target_id);
            self.store.assign_file(&file.path, target_id);
            self.push_pending(PendingMove::new(
                &file.path,
                Some(source_id.to_string()),
                MoveTarget::Changelist(target_id.to_string()),
            ));
        }
        tracing::info!("Moved {} files from {} to {}", files.len(), source_id, target_id);

        self.touch();
        self.rebuild();
        Ok(files.len())
    }

    /// Shield a move; an earlier move of the same path no longer applies
    fn push_pending(&mut self, mv: PendingMove) {
        self.drop_pending(&mv.path);
        self.pending_moves.push(mv);
    }

    fn drop_pending(&mut self, path: &str) {
        self.pending_moves.retain(|mv| mv.path != path);
    }

    fn retag_cached(&mut self, path: &str, filter: impl Fn(&Hunk) -> bool, target: Option<&str>) {
        if let Some(hunks) = self.previous_hunks.get_mut(path) {
            for hunk in hunks.iter_mut().filter(|h| filter(h)) {
                hunk.changelist_id = target.map(String::from);
            }
        }
    }

    // ==================== Selection ====================

    /// Flip the selection of one placement; returns the new state
    pub fn toggle_selection(&mut self, changelist_id: Option<&str>, file_id: &str) -> Result<bool> {
        let partition = Arc::make_mut(&mut self.partition);
        let file = partition
            .files_mut(changelist_id)
            .and_then(|files| files.iter_mut().find(|f| f.id == file_id))
            .ok_or_else(|| ChangelistError::UnknownFile(file_id.to_string()))?;

        file.is_selected = !file.is_selected;
        Ok(file.is_selected)
    }

    pub fn select_all(&mut self) {
        self.set_all_selected(true);
    }

    pub fn deselect_all(&mut self) {
        self.set_all_selected(false);
    }

    fn set_all_selected(&mut self, selected: bool) {
        let partition = Arc::make_mut(&mut self.partition);
        for view in &mut partition.changelists {
            for file in &mut view.files {
                file.is_selected = selected;
            }
        }
        for file in &mut partition.unversioned {
            file.is_selected = selected;
        }
    }

    /// Select every file of one changelist (`None`: unversioned)
    pub fn select_changelist(&mut self, changelist_id: Option<&str>) -> Result<usize> {
        let partition = Arc::make_mut(&mut self.partition);
        let files = partition.files_mut(changelist_id).ok_or_else(|| {
            ChangelistError::UnknownChangelist(changelist_id.unwrap_or_default().to_string())
        })?;

        for file in files.iter_mut() {
            file.is_selected = true;
        }
        Ok(files.len())
    }

    /// Paths of selected files, each once
    pub fn selected_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for file in self.partition.selected_files() {
            if !paths.contains(&file.path) {
                paths.push(file.path.clone());
            }
        }
        paths
    }

    // ==================== VCS actions ====================

    /// Commit exactly the selected files; returns the committed paths
    pub fn commit_selected(&mut self, message: &str, amend: bool) -> Result<Vec<String>> {
        let message = require_message(message)?;
        let paths = self.require_selection()?;

        self.vcs
            .commit(&paths, message, CommitOptions { amend })
            .inspect_err(|e| tracing::warn!("Commit failed: {}", e))?;
        tracing::info!("Committed {} files", paths.len());

        self.touch();
        Ok(paths)
    }

    /// Discard the changes of the selected files
    pub fn revert_selected(&mut self) -> Result<Vec<String>> {
        let paths = self.require_selection()?;

        self.vcs
            .revert(&paths)
            .inspect_err(|e| tracing::warn!("Revert failed: {}", e))?;
        tracing::info!("Reverted {} files", paths.len());

        self.touch();
        Ok(paths)
    }

    /// Stash the selected files under `message`
    pub fn stash_selected(&mut self, message: &str) -> Result<Vec<String>> {
        let message = require_message(message)?;
        let paths = self.require_selection()?;

        self.vcs
            .stash(&paths, message)
            .inspect_err(|e| tracing::warn!("Stash failed: {}", e))?;
        tracing::info!("Stashed {} files", paths.len());

        self.touch();
        Ok(paths)
    }

    fn require_selection(&self) -> Result<Vec<String>> {
        let paths = self.selected_paths();
        if paths.is_empty() {
            return Err(ChangelistError::NoFilesSelected);
        }
        Ok(paths)
    }

    // ==================== Reset ====================

    /// Forget all changelists and assignments
    pub fn clear_state(&mut self) -> anyhow::Result<()> {
        self.storage.clear()?;

        self.store = AssignmentStore::default();
        self.previous_hunks.clear();
        self.pending_moves.clear();
        self.partition = Arc::new(Partition::default());
        tracing::info!("Cleared changelist state");

        self.rebuild();
        Ok(())
    }
}

fn require_message(message: &str) -> Result<&str> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ChangelistError::EmptyMessage);
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelist::DEFAULT_CHANGELIST_ID;
    use crate::hunk::path_id;
    use crate::repo::fake::FakeVcs;
    use crate::storage::{Database, StateSnapshot};

    fn diff(ranges: &[(u32, u32, u32, u32)]) -> String {
        ranges
            .iter()
            .map(|(a, b, c, d)| format!("@@ -{},{} +{},{} @@\n+x\n", a, b, c, d))
            .collect()
    }

    fn manager_with(vcs: &Arc<FakeVcs>, options: ManagerOptions) -> ChangelistManager {
        let storage = Database::open_in_memory().unwrap();
        ChangelistManager::new(vcs.clone(), Box::new(storage), options)
    }

    fn manager(vcs: &Arc<FakeVcs>) -> ChangelistManager {
        manager_with(vcs, ManagerOptions::default())
    }

    fn paths(partition: &Partition, changelist_id: Option<&str>) -> Vec<String> {
        partition
            .files(changelist_id)
            .iter()
            .map(|f| f.path.clone())
            .collect()
    }

    fn no_shield() -> ManagerOptions {
        ManagerOptions {
            pending_move_window: Duration::ZERO,
            ..Default::default()
        }
    }

    /// A store whose writes always fail
    struct BrokenStorage;

    impl StateStore for BrokenStorage {
        fn load_snapshot(&self) -> anyhow::Result<Option<StateSnapshot>> {
            anyhow::bail!("disk on fire")
        }
        fn save_snapshot(&self, _: &StateSnapshot) -> anyhow::Result<()> {
            anyhow::bail!("disk on fire")
        }
        fn load_hunk_cache(&self) -> anyhow::Result<HashMap<String, Vec<Hunk>>> {
            anyhow::bail!("disk on fire")
        }
        fn save_hunk_cache(&self, _: &HashMap<String, Vec<Hunk>>) -> anyhow::Result<()> {
            anyhow::bail!("disk on fire")
        }
        fn clear(&self) -> anyhow::Result<()> {
            anyhow::bail!("disk on fire")
        }
    }

    #[test]
    fn test_refresh_builds_partition() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4)]));
        let mut manager = manager(&vcs);

        assert!(manager.refresh());

        let partition = manager.partition();
        assert_eq!(paths(&partition, Some(DEFAULT_CHANGELIST_ID)), vec!["a.txt"]);
        assert!(partition.changelists[0].is_active);
    }

    #[test]
    fn test_failed_refresh_keeps_partition() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4)]));
        let mut manager = manager(&vcs);
        manager.refresh();

        vcs.fail_reads(true);
        assert!(!manager.refresh());
        assert_eq!(paths(&manager.partition(), Some(DEFAULT_CHANGELIST_ID)), vec!["a.txt"]);
    }

    #[test]
    fn test_hunk_move_then_line_drift() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4)]));
        let mut manager = manager(&vcs);
        manager.refresh();

        let feature = manager.create_changelist("Feature", None).unwrap();
        manager.set_active(&feature).unwrap();
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4), (20, 2, 21, 3)]));
        manager.refresh();

        let partition = manager.partition();
        assert_eq!(paths(&partition, Some(DEFAULT_CHANGELIST_ID)), vec!["a.txt"]);
        assert_eq!(paths(&partition, Some(&feature)), vec!["a.txt"]);

        manager.move_hunk_to_changelist("a.txt:5:5", &feature).unwrap();
        let partition = manager.partition();
        assert!(partition.files(Some(DEFAULT_CHANGELIST_ID)).is_empty());
        assert_eq!(partition.files(Some(&feature))[0].hunks.len(), 2);

        // a line inserted above the first hunk
        vcs.modify("a.txt", &diff(&[(6, 3, 6, 4), (20, 2, 22, 3)]));
        manager.refresh();
        let partition = manager.partition();
        let file = &partition.files(Some(&feature))[0];
        assert_eq!(file.hunks.len(), 2);
        assert_eq!(file.hunks[0].id, "a.txt:6:6");
        assert!(partition.files(Some(DEFAULT_CHANGELIST_ID)).is_empty());
    }

    #[test]
    fn test_hunk_moved_back_while_file_move_is_shielded() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4), (20, 2, 21, 3)]));
        let mut manager = manager(&vcs);
        manager.refresh();
        let feature = manager.create_changelist("Feature", None).unwrap();

        manager
            .move_file_to_changelist(&path_id("a.txt"), &feature)
            .unwrap();
        manager
            .move_hunk_to_changelist("a.txt:5:5", DEFAULT_CHANGELIST_ID)
            .unwrap();

        let check = |manager: &ChangelistManager| {
            let partition = manager.partition();
            let default = partition.files(Some(DEFAULT_CHANGELIST_ID));
            assert_eq!(default.len(), 1);
            assert_eq!(default[0].hunks[0].id, "a.txt:5:5");
            assert_eq!(partition.files(Some(&feature))[0].hunks[0].id, "a.txt:20:21");
            assert_eq!(
                manager.store().hunk_assignment("a.txt:5:5"),
                Some(DEFAULT_CHANGELIST_ID)
            );
        };
        check(&manager);

        manager.refresh();
        check(&manager);
    }

    #[test]
    fn test_external_revert_prunes_assignments() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4)]));
        let mut manager = manager(&vcs);
        manager.refresh();

        vcs.clean("a.txt");
        manager.refresh();

        assert_eq!(manager.partition().all_files().count(), 0);
        let snapshot = manager.store().save();
        assert!(snapshot.file_assignments.is_empty());
        assert!(snapshot.hunk_assignments.is_empty());
    }

    #[test]
    fn test_move_file_takes_only_source_hunks() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4), (40, 1, 41, 1)]));
        let mut manager = manager(&vcs);
        let feature = manager.create_changelist("Feature", None).unwrap();
        let other = manager.create_changelist("Other", None).unwrap();
        manager.refresh();
        manager.move_hunk_to_changelist("a.txt:40:41", &other).unwrap();

        let outcome = manager
            .move_file_from(&path_id("a.txt"), Some(DEFAULT_CHANGELIST_ID), &feature)
            .unwrap();

        assert!(outcome.had_hunks);
        let partition = manager.partition();
        assert!(partition.files(Some(DEFAULT_CHANGELIST_ID)).is_empty());
        assert_eq!(partition.files(Some(&feature))[0].hunks[0].id, "a.txt:5:5");
        assert_eq!(partition.files(Some(&other))[0].hunks[0].id, "a.txt:40:41");
    }

    #[test]
    fn test_move_file_without_hunks() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.set_status("logo.png", crate::repo::FileStatus::Modified, false);
        let mut manager = manager_with(&vcs, no_shield());
        let feature = manager.create_changelist("Feature", None).unwrap();
        manager.refresh();

        let outcome = manager
            .move_file_to_changelist(&path_id("logo.png"), &feature)
            .unwrap();
        assert!(!outcome.had_hunks);

        // survives a refresh once the move is no longer shielded
        manager.refresh();
        assert_eq!(paths(&manager.partition(), Some(&feature)), vec!["logo.png"]);
    }

    #[test]
    fn test_move_untracked_file_into_changelist() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.add_untracked("new.txt");
        let mut manager = manager_with(&vcs, no_shield());
        manager.refresh();
        assert_eq!(paths(&manager.partition(), None), vec!["new.txt"]);

        manager
            .move_file_to_changelist(&path_id("new.txt"), DEFAULT_CHANGELIST_ID)
            .unwrap();
        manager.refresh();
        assert_eq!(paths(&manager.partition(), Some(DEFAULT_CHANGELIST_ID)), vec!["new.txt"]);
    }

    #[test]
    fn test_move_to_unknown_targets_fails() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4)]));
        let mut manager = manager(&vcs);
        manager.refresh();

        assert!(matches!(
            manager.move_file_to_changelist(&path_id("a.txt"), "nope"),
            Err(ChangelistError::UnknownChangelist(_))
        ));
        assert!(matches!(
            manager.move_file_to_changelist("missing", DEFAULT_CHANGELIST_ID),
            Err(ChangelistError::UnknownFile(_))
        ));
        assert!(matches!(
            manager.move_hunk_to_changelist("a.txt:9:9", DEFAULT_CHANGELIST_ID),
            Err(ChangelistError::UnknownHunk(_))
        ));
    }

    #[test]
    fn test_move_to_unversioned_unstages_tracked_file() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4)]));
        let mut manager = manager_with(&vcs, no_shield());
        manager.refresh();

        manager.move_file_to_unversioned(&path_id("a.txt")).unwrap();

        assert_eq!(vcs.calls(), vec!["unstage a.txt"]);
        assert_eq!(paths(&manager.partition(), None), vec!["a.txt"]);

        // the continuation of an unversioned hunk stays unversioned
        vcs.modify("a.txt", &diff(&[(6, 3, 6, 4)]));
        manager.refresh();
        assert_eq!(paths(&manager.partition(), None), vec!["a.txt"]);
    }

    #[test]
    fn test_file_without_hunks_stays_unversioned() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("state.db");
        let vcs = Arc::new(FakeVcs::new());
        vcs.set_status("logo.png", crate::repo::FileStatus::Modified, false);

        {
            let storage = Database::open(&db_path).unwrap();
            let mut manager = ChangelistManager::new(vcs.clone(), Box::new(storage), no_shield());
            manager.refresh();
            manager.move_file_to_unversioned(&path_id("logo.png")).unwrap();

            manager.refresh();
            let partition = manager.partition();
            assert_eq!(paths(&partition, None), vec!["logo.png"]);
            assert!(partition.files(Some(DEFAULT_CHANGELIST_ID)).is_empty());
        }

        let storage = Database::open(&db_path).unwrap();
        let mut manager = ChangelistManager::new(vcs.clone(), Box::new(storage), no_shield());
        manager.refresh();
        assert_eq!(paths(&manager.partition(), None), vec!["logo.png"]);

        // moving it back clears the mark
        manager
            .move_file_to_changelist(&path_id("logo.png"), DEFAULT_CHANGELIST_ID)
            .unwrap();
        manager.refresh();
        assert_eq!(paths(&manager.partition(), Some(DEFAULT_CHANGELIST_ID)), vec!["logo.png"]);
    }

    #[test]
    fn test_unstage_failure_does_not_block_move() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4)]));
        let mut manager = manager(&vcs);
        manager.refresh();
        vcs.fail_writes(true);

        manager.move_file_to_unversioned(&path_id("a.txt")).unwrap();
        assert_eq!(paths(&manager.partition(), None), vec!["a.txt"]);
    }

    #[test]
    fn test_move_changelist_files() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4)]));
        vcs.set_status("b.bin", crate::repo::FileStatus::Added, true);
        let mut manager = manager_with(&vcs, no_shield());
        manager.refresh();
        let feature = manager.create_changelist("Feature", None).unwrap();

        let moved = manager
            .move_changelist_files(DEFAULT_CHANGELIST_ID, &feature)
            .unwrap();
        assert_eq!(moved, 2);

        manager.refresh();
        let partition = manager.partition();
        assert!(partition.files(Some(DEFAULT_CHANGELIST_ID)).is_empty());
        assert_eq!(paths(&partition, Some(&feature)), vec!["a.txt", "b.bin"]);
        assert_eq!(manager.store().hunk_assignment("a.txt:5:5"), Some(feature.as_str()));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let vcs = Arc::new(FakeVcs::new());
        let mut manager = manager(&vcs);
        let feature = manager.create_changelist("Feature", None).unwrap();

        assert!(matches!(
            manager.create_changelist(" feature ", None),
            Err(ChangelistError::DuplicateName(_))
        ));
        assert!(matches!(
            manager.create_changelist("  ", None),
            Err(ChangelistError::EmptyName)
        ));
        assert!(matches!(
            manager.rename_changelist(&feature, "DEFAULT"),
            Err(ChangelistError::DuplicateName(_))
        ));
        assert_eq!(manager.store().changelists().len(), 2);
        assert_eq!(manager.store().get(&feature).unwrap().name, "Feature");
    }

    #[test]
    fn test_delete_changelist_keeps_files() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4)]));
        let mut manager = manager(&vcs);
        let feature = manager.create_changelist("Feature", None).unwrap();
        manager.set_active(&feature).unwrap();
        manager.refresh();
        assert_eq!(paths(&manager.partition(), Some(&feature)), vec!["a.txt"]);

        assert!(matches!(
            manager.delete_changelist(DEFAULT_CHANGELIST_ID),
            Err(ChangelistError::DefaultChangelist)
        ));

        manager.delete_changelist(&feature).unwrap();
        manager.refresh();
        assert_eq!(manager.store().active_id(), DEFAULT_CHANGELIST_ID);
        assert_eq!(paths(&manager.partition(), Some(DEFAULT_CHANGELIST_ID)), vec!["a.txt"]);
    }

    #[test]
    fn test_find_changelist_by_name_or_id() {
        let vcs = Arc::new(FakeVcs::new());
        let mut manager = manager(&vcs);
        let id = manager.create_changelist("Feature", None).unwrap();

        assert_eq!(manager.find_changelist(&id).unwrap().name, "Feature");
        assert_eq!(manager.find_changelist(" FEATURE").unwrap().id, id);
        assert!(manager.find_changelist("nope").is_none());
    }

    #[test]
    fn test_selection_is_in_memory_only() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4)]));
        vcs.add_untracked("new.txt");
        let mut manager = manager(&vcs);
        manager.refresh();
        let before = manager.store().save();

        assert!(manager
            .toggle_selection(Some(DEFAULT_CHANGELIST_ID), &path_id("a.txt"))
            .unwrap());
        assert_eq!(manager.selected_paths(), vec!["a.txt"]);
        manager.refresh();
        assert_eq!(manager.selected_paths(), vec!["a.txt"]);

        manager.select_all();
        assert_eq!(manager.selected_paths().len(), 2);
        manager.deselect_all();
        assert!(manager.selected_paths().is_empty());

        assert_eq!(manager.select_changelist(None).unwrap(), 1);
        assert_eq!(manager.selected_paths(), vec!["new.txt"]);
        assert_eq!(manager.store().save(), before);
    }

    #[test]
    fn test_commit_validates_before_calling_vcs() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4)]));
        let mut manager = manager(&vcs);
        manager.refresh();

        assert!(matches!(
            manager.commit_selected("fix", false),
            Err(ChangelistError::NoFilesSelected)
        ));
        manager.select_changelist(Some(DEFAULT_CHANGELIST_ID)).unwrap();
        assert!(matches!(
            manager.commit_selected("   ", false),
            Err(ChangelistError::EmptyMessage)
        ));
        assert!(vcs.calls().is_empty());

        let committed = manager.commit_selected(" fix parser ", true).unwrap();
        assert_eq!(committed, vec!["a.txt"]);
        assert_eq!(vcs.calls(), vec!["commit --amend [a.txt] fix parser"]);
    }

    #[test]
    fn test_vcs_action_failure_is_reported() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4)]));
        let mut manager = manager(&vcs);
        manager.refresh();
        manager.select_all();
        vcs.fail_writes(true);

        assert!(matches!(manager.revert_selected(), Err(ChangelistError::Vcs(_))));
        assert!(matches!(
            manager.stash_selected("wip"),
            Err(ChangelistError::Vcs(_))
        ));

        vcs.fail_writes(false);
        manager.stash_selected("wip").unwrap();
        manager.revert_selected().unwrap();
        assert_eq!(vcs.calls(), vec!["stash [a.txt] wip", "revert [a.txt]"]);
    }

    #[test]
    fn test_state_survives_restart() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("state.db");
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4)]));

        let feature = {
            let storage = Database::open(&db_path).unwrap();
            let mut manager =
                ChangelistManager::new(vcs.clone(), Box::new(storage), ManagerOptions::default());
            manager.refresh();
            let feature = manager.create_changelist("Feature", None).unwrap();
            manager.move_hunk_to_changelist("a.txt:5:5", &feature).unwrap();
            feature
        };

        // the hunk drifted while nothing was running
        vcs.modify("a.txt", &diff(&[(7, 3, 7, 4)]));
        let storage = Database::open(&db_path).unwrap();
        let mut manager = ChangelistManager::new(vcs.clone(), Box::new(storage), ManagerOptions::default());
        manager.refresh();

        assert_eq!(paths(&manager.partition(), Some(&feature)), vec!["a.txt"]);
    }

    #[test]
    fn test_changes_saved_by_another_manager_survive() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("state.db");
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4)]));

        let open = || {
            let storage = Database::open(&db_path).unwrap();
            ChangelistManager::new(vcs.clone(), Box::new(storage), ManagerOptions::default())
        };
        let mut watcher = open();
        watcher.refresh();

        let mut other = open();
        other.refresh();
        let feature = other.create_changelist("Feature", None).unwrap();
        other.move_hunk_to_changelist("a.txt:5:5", &feature).unwrap();

        watcher.refresh();
        assert!(watcher.store().contains(&feature));
        assert_eq!(paths(&watcher.partition(), Some(&feature)), vec!["a.txt"]);

        // mutations start from the latest saved state too
        other.rename_changelist(&feature, "Parser").unwrap();
        watcher.create_changelist("Docs", None).unwrap();

        let names: Vec<String> = open()
            .store()
            .changelists()
            .iter()
            .map(|cl| cl.name.clone())
            .collect();
        assert_eq!(names, vec!["Default", "Parser", "Docs"]);
    }

    #[test]
    fn test_persistence_failure_is_not_fatal() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4)]));
        let mut manager = ChangelistManager::new(vcs.clone(), Box::new(BrokenStorage), ManagerOptions::default());

        assert!(manager.refresh());
        let feature = manager.create_changelist("Feature", None).unwrap();
        manager
            .move_file_to_changelist(&path_id("a.txt"), &feature)
            .unwrap();
        assert_eq!(paths(&manager.partition(), Some(&feature)), vec!["a.txt"]);
        assert!(manager.clear_state().is_err());
    }

    #[test]
    fn test_one_notification_per_pass() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4)]));
        let mut manager = manager(&vcs);
        let mut updates = manager.subscribe();

        manager.refresh();
        manager.toggle_selection(Some(DEFAULT_CHANGELIST_ID), &path_id("a.txt")).unwrap();
        manager.create_changelist("Feature", None).unwrap();

        let first = updates.try_recv().unwrap();
        assert_eq!(first.files(Some(DEFAULT_CHANGELIST_ID)).len(), 1);
        let second = updates.try_recv().unwrap();
        assert_eq!(second.changelists.len(), 2);
        assert!(updates.try_recv().is_err());
    }

    #[test]
    fn test_clear_state_resets_to_default() {
        let vcs = Arc::new(FakeVcs::new());
        vcs.modify("a.txt", &diff(&[(5, 3, 5, 4)]));
        let mut manager = manager(&vcs);
        manager.refresh();
        let feature = manager.create_changelist("Feature", None).unwrap();
        manager.set_active(&feature).unwrap();
        manager.move_hunk_to_changelist("a.txt:5:5", &feature).unwrap();

        manager.clear_state().unwrap();

        assert_eq!(manager.store().changelists().len(), 1);
        assert_eq!(manager.store().active_id(), DEFAULT_CHANGELIST_ID);
        assert_eq!(paths(&manager.partition(), Some(DEFAULT_CHANGELIST_ID)), vec!["a.txt"]);
    }

    #[test]
    fn test_quiet_window_after_mutation() {
        let vcs = Arc::new(FakeVcs::new());
        let mut manager = manager(&vcs);
        let window = Duration::from_secs(60);
        assert!(manager.quiet_remaining(window).is_none());

        manager.create_changelist("Feature", None).unwrap();
        assert!(manager.quiet_remaining(window).is_some());
        assert!(manager.quiet_remaining(Duration::ZERO).is_none());
    }
}
