//! Reconciliation engine
//!
//! Combines one refresh's view of the working tree with the assignment
//! store, the previous refresh's hunks and recent manual moves, and produces
//! the new partition of files into changelists.

use super::{AssignmentStore, ChangelistView, FileItem, MoveTarget, Partition, PendingMove};
use crate::hunk::{parse_hunks, ContinuationMatcher, Hunk, ProximityMatcher};
use crate::repo::{StatusEntry, VcsProvider, VcsResult};
use std::collections::{HashMap, HashSet};

/// What the collaborator reported during one refresh
#[derive(Debug, Clone, Default)]
pub struct Observation {
    /// Tracked files with changes
    pub statuses: Vec<StatusEntry>,
    pub untracked: Vec<String>,
    /// Hunks per tracked, non-deleted file: unstaged first, then staged
    pub hunks: HashMap<String, Vec<Hunk>>,
}

impl Observation {
    /// Read status and diffs from the collaborator.
    ///
    /// A failing status read fails the whole observation. A failing diff only
    /// affects its file, which keeps the hunks it had last time.
    pub fn collect(
        vcs: &dyn VcsProvider,
        previous: &HashMap<String, Vec<Hunk>>,
    ) -> VcsResult<Self> {
        let statuses = vcs.status()?;
        let untracked = vcs.untracked_files()?;

        let mut hunks = HashMap::new();
        for entry in statuses.iter().filter(|e| e.has_content()) {
            match read_hunks(vcs, &entry.path) {
                Ok(file_hunks) => {
                    hunks.insert(entry.path.clone(), file_hunks);
                }
                Err(e) => {
                    tracing::warn!("Failed to diff {}, keeping previous hunks: {}", entry.path, e);
                    if let Some(prev) = previous.get(&entry.path) {
                        hunks.insert(entry.path.clone(), prev.clone());
                    }
                }
            }
        }

        Ok(Self {
            statuses,
            untracked,
            hunks,
        })
    }

    /// Every path the collaborator currently reports
    pub fn valid_paths(&self) -> HashSet<&str> {
        self.statuses
            .iter()
            .map(|s| s.path.as_str())
            .chain(self.untracked.iter().map(String::as_str))
            .collect()
    }
}

fn read_hunks(vcs: &dyn VcsProvider, path: &str) -> VcsResult<Vec<Hunk>> {
    let mut hunks = parse_hunks(path, &vcs.diff(path, false)?, false);
    hunks.extend(parse_hunks(path, &vcs.diff(path, true)?, true));
    Ok(hunks)
}

/// Inputs of one reconciliation pass besides the assignment store
pub struct ReconcileInput<'a> {
    pub observation: &'a Observation,
    /// Hunks per path from the previous pass, with their changelists
    pub previous_hunks: &'a HashMap<String, Vec<Hunk>>,
    /// Previous partition, for carrying selection over
    pub previous: &'a Partition,
    /// Unexpired manual moves, oldest first
    pub pending_moves: &'a [PendingMove],
}

/// Output of one reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub partition: Partition,
    /// Hunks per path with their resolved changelists
    pub hunks: HashMap<String, Vec<Hunk>>,
}

/// Builds partitions from observations
pub struct Reconciler {
    matcher: Box<dyn ContinuationMatcher>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(Box::new(ProximityMatcher::default()))
    }
}

impl Reconciler {
    pub fn new(matcher: Box<dyn ContinuationMatcher>) -> Self {
        Self { matcher }
    }

    pub fn with_threshold(threshold: u32) -> Self {
        Self::new(Box::new(ProximityMatcher::new(threshold)))
    }

    /// Run one pass, updating the store's assignments in place
    pub fn reconcile(&self, store: &mut AssignmentStore, input: ReconcileInput<'_>) -> Reconciliation {
        let observation = input.observation;
        let valid_paths = observation.valid_paths();

        // Reverted or committed files vanish from every changelist
        store.retain_files(|path| valid_paths.contains(path));

        // Later moves of the same path win
        let pending: HashMap<&str, &PendingMove> = input
            .pending_moves
            .iter()
            .filter(|mv| valid_paths.contains(mv.path.as_str()))
            .map(|mv| (mv.path.as_str(), mv))
            .collect();

        let mut hunks = self.assign_hunks(store, observation, input.previous_hunks);
        apply_pending_moves(store, &pending, &mut hunks);

        let live: HashSet<&str> = hunks
            .values()
            .flat_map(|file_hunks| file_hunks.iter().map(|h| h.id.as_str()))
            .collect();
        store.retain_hunks(|id| live.contains(id));

        let mut placements: HashMap<Option<String>, Vec<FileItem>> = HashMap::new();

        for entry in &observation.statuses {
            let file_hunks = hunks.get(&entry.path).cloned().unwrap_or_default();

            if file_hunks.is_empty() {
                let stays_unversioned =
                    is_pending_unversioned(&pending, &entry.path) || store.is_unversioned(&entry.path);
                let changelist_id = if stays_unversioned {
                    None
                } else {
                    Some(file_level_assignment(store, &entry.path))
                };
                let item = FileItem::from_status(entry, changelist_id.clone(), Vec::new());
                placements.entry(changelist_id).or_default().push(item);
                continue;
            }

            for (changelist_id, group) in group_by_changelist(file_hunks) {
                let item = FileItem::from_status(entry, changelist_id.clone(), group);
                placements.entry(changelist_id).or_default().push(item);
            }
        }

        for path in &observation.untracked {
            let changelist_id = if is_pending_unversioned(&pending, path) {
                None
            } else {
                store.file_assignment(path).map(String::from)
            };
            let item = FileItem::untracked(path, changelist_id.clone());
            placements.entry(changelist_id).or_default().push(item);
        }

        let selection = SelectionCarry::from_partition(input.previous);
        let mut take = |key: Option<&str>| {
            let mut files = placements.remove(&key.map(String::from)).unwrap_or_default();
            for file in &mut files {
                file.is_selected = selection.was_selected(key, &file.id);
            }
            files.sort_by_cached_key(|file| file.name.to_lowercase());
            files
        };

        let changelists = store
            .changelists()
            .iter()
            .map(|cl| ChangelistView {
                changelist: cl.clone(),
                is_active: cl.id == store.active_id(),
                files: take(Some(&cl.id)),
            })
            .collect();
        let unversioned = take(None);

        tracing::debug!(
            files = valid_paths.len(),
            hunks = live.len(),
            pending = pending.len(),
            "reconciled"
        );

        Reconciliation {
            partition: Partition {
                changelists,
                unversioned,
            },
            hunks,
        }
    }

    /// Resolve every fresh hunk's changelist
    fn assign_hunks(
        &self,
        store: &mut AssignmentStore,
        observation: &Observation,
        previous_hunks: &HashMap<String, Vec<Hunk>>,
    ) -> HashMap<String, Vec<Hunk>> {
        let mut resolved = HashMap::new();

        for entry in &observation.statuses {
            let Some(fresh) = observation.hunks.get(&entry.path) else {
                continue;
            };
            let previous = previous_hunks
                .get(&entry.path)
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            let mut file_hunks = fresh.clone();
            for hunk in &mut file_hunks {
                hunk.changelist_id = self.resolve_hunk(store, hunk, previous);
            }
            resolved.insert(entry.path.clone(), file_hunks);
        }

        resolved
    }

    /// Known id, else continuation of a previous hunk, else the active
    /// changelist
    fn resolve_hunk(&self, store: &mut AssignmentStore, hunk: &Hunk, previous: &[Hunk]) -> Option<String> {
        if let Some(id) = store.hunk_assignment(&hunk.id) {
            return Some(id.to_string());
        }

        if let Some(prev) = self.matcher.match_continuation(hunk, previous) {
            let inherited = store
                .hunk_assignment(&prev.id)
                .map(String::from)
                .or_else(|| prev.changelist_id.clone());

            match inherited {
                Some(id) if store.contains(&id) => {
                    tracing::debug!(from = %prev.id, to = %hunk.id, "hunk continues previous hunk");
                    store.assign_hunk(&hunk.id, &id);
                    return Some(id);
                }
                // The previous hunk was unversioned; so is its continuation
                None => return None,
                Some(_) => {}
            }
        }

        let active = store.active_id().to_string();
        store.assign_hunk(&hunk.id, &active);
        Some(active)
    }
}

/// Force recent manual moves over whatever the pass derived
fn apply_pending_moves(
    store: &mut AssignmentStore,
    pending: &HashMap<&str, &PendingMove>,
    hunks: &mut HashMap<String, Vec<Hunk>>,
) {
    for (path, mv) in pending {
        match &mv.target {
            MoveTarget::Changelist(target) => {
                if !store.assign_file(path, target) {
                    continue;
                }
                if let Some(file_hunks) = hunks.get_mut(*path) {
                    for hunk in file_hunks.iter_mut().filter(|h| h.changelist_id == mv.source) {
                        hunk.changelist_id = Some(target.clone());
                        store.assign_hunk(&hunk.id, target);
                    }
                }
            }
            MoveTarget::Unversioned => {
                store.mark_unversioned(path);
                if let Some(file_hunks) = hunks.get_mut(*path) {
                    for hunk in file_hunks.iter_mut() {
                        hunk.changelist_id = None;
                        store.unassign_hunk(&hunk.id);
                    }
                }
            }
        }
    }
}

fn is_pending_unversioned(pending: &HashMap<&str, &PendingMove>, path: &str) -> bool {
    pending
        .get(path)
        .is_some_and(|mv| mv.target == MoveTarget::Unversioned)
}

/// Assignment of a tracked file without hunks; first-seen files go to the
/// active changelist and stay there
fn file_level_assignment(store: &mut AssignmentStore, path: &str) -> String {
    if let Some(id) = store.file_assignment(path) {
        return id.to_string();
    }
    let active = store.active_id().to_string();
    store.assign_file(path, &active);
    active
}

/// Split hunks by changelist, in order of first appearance
fn group_by_changelist(hunks: Vec<Hunk>) -> Vec<(Option<String>, Vec<Hunk>)> {
    let mut groups: Vec<(Option<String>, Vec<Hunk>)> = Vec::new();
    for hunk in hunks {
        match groups.iter_mut().find(|(id, _)| *id == hunk.changelist_id) {
            Some((_, group)) => group.push(hunk),
            None => groups.push((hunk.changelist_id.clone(), vec![hunk])),
        }
    }
    groups
}

/// Selection of the previous partition
struct SelectionCarry {
    exact: HashSet<(Option<String>, String)>,
    any: HashSet<String>,
    placed: HashSet<(Option<String>, String)>,
}

impl SelectionCarry {
    fn from_partition(partition: &Partition) -> Self {
        let mut carry = Self {
            exact: HashSet::new(),
            any: HashSet::new(),
            placed: HashSet::new(),
        };
        for file in partition.all_files() {
            let key = (file.changelist_id.clone(), file.id.clone());
            if file.is_selected {
                carry.exact.insert(key.clone());
                carry.any.insert(file.id.clone());
            }
            carry.placed.insert(key);
        }
        carry
    }

    /// Same placement keeps its state; a file that moved keeps the
    /// selection it had anywhere
    fn was_selected(&self, changelist_id: Option<&str>, file_id: &str) -> bool {
        let key = (changelist_id.map(String::from), file_id.to_string());
        if self.placed.contains(&key) {
            self.exact.contains(&key)
        } else {
            self.any.contains(file_id)
        }
    }
}
