//! Assignment store
//!
//! Owns the changelists and the two assignment maps. Every assignment names
//! a changelist that exists; references to unknown changelists are dropped on
//! load and when a changelist is deleted.

use super::{Changelist, ChangelistError, Result, DEFAULT_CHANGELIST_ID};
use crate::storage::StateSnapshot;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Changelists plus file- and hunk-level assignments
#[derive(Debug, Clone)]
pub struct AssignmentStore {
    changelists: Vec<Changelist>,
    active_id: String,
    /// path -> changelist id
    file_assignments: HashMap<String, String>,
    /// hunk id -> changelist id
    hunk_assignments: HashMap<String, String>,
    /// Paths moved to the unversioned bucket by hand
    unversioned: BTreeSet<String>,
}

impl Default for AssignmentStore {
    fn default() -> Self {
        Self {
            changelists: vec![Changelist::new_default()],
            active_id: DEFAULT_CHANGELIST_ID.to_string(),
            file_assignments: HashMap::new(),
            hunk_assignments: HashMap::new(),
            unversioned: BTreeSet::new(),
        }
    }
}

impl AssignmentStore {
    /// Rebuild from a persisted snapshot, repairing what doesn't hold
    pub fn load(snapshot: Option<StateSnapshot>) -> Self {
        let Some(snapshot) = snapshot else {
            return Self::default();
        };

        let mut seen = HashSet::new();
        let mut changelists: Vec<Changelist> = snapshot
            .changelists
            .into_iter()
            .filter(|cl| seen.insert(cl.id.clone()))
            .collect();

        // Exactly one default
        let mut has_default = false;
        for cl in &mut changelists {
            if cl.is_default && has_default {
                cl.is_default = false;
            }
            has_default |= cl.is_default;
        }
        if !has_default {
            match changelists.iter_mut().find(|cl| cl.id == DEFAULT_CHANGELIST_ID) {
                Some(cl) => cl.is_default = true,
                None => changelists.insert(0, Changelist::new_default()),
            }
        }

        let mut store = Self {
            changelists,
            active_id: String::new(),
            file_assignments: snapshot.file_assignments.into_iter().collect(),
            hunk_assignments: snapshot.hunk_assignments.into_iter().collect(),
            unversioned: snapshot.unversioned_files,
        };

        store.active_id = snapshot
            .active_changelist_id
            .filter(|id| store.contains(id))
            .unwrap_or_else(|| store.default_id().to_string());
        store.prune_unknown_changelists();

        store
    }

    /// Snapshot of everything that is persisted
    pub fn save(&self) -> StateSnapshot {
        StateSnapshot {
            changelists: self.changelists.clone(),
            file_assignments: self
                .file_assignments
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            hunk_assignments: self
                .hunk_assignments
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            active_changelist_id: Some(self.active_id.clone()),
            unversioned_files: self.unversioned.clone(),
        }
    }

    // ==================== Changelists ====================

    pub fn changelists(&self) -> &[Changelist] {
        &self.changelists
    }

    pub fn get(&self, id: &str) -> Option<&Changelist> {
        self.changelists.iter().find(|cl| cl.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn default_id(&self) -> &str {
        self.changelists
            .iter()
            .find(|cl| cl.is_default)
            .map(|cl| cl.id.as_str())
            .unwrap_or(DEFAULT_CHANGELIST_ID)
    }

    /// Target for changes never seen before
    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    /// Whether a changelist other than `except` already uses `name`
    pub fn is_name_taken(&self, name: &str, except: Option<&str>) -> bool {
        self.changelists
            .iter()
            .filter(|cl| Some(cl.id.as_str()) != except)
            .any(|cl| cl.has_name(name))
    }

    /// Append a changelist. Name uniqueness is checked by the caller.
    pub fn create_changelist(&mut self, name: &str, description: Option<String>) -> String {
        let changelist = Changelist::new(name, description);
        let id = changelist.id.clone();
        self.changelists.push(changelist);
        id
    }

    /// Delete a non-default changelist, moving its assignments to the active
    /// changelist (or the default when it was the active one).
    ///
    /// Returns the changelist that received the assignments, or `None` when
    /// nothing was deleted.
    pub fn delete_changelist(&mut self, id: &str) -> Option<String> {
        let cl = self.get(id)?;
        if cl.is_default {
            return None;
        }

        let target = if self.active_id == id {
            self.default_id().to_string()
        } else {
            self.active_id.clone()
        };

        for assigned in self
            .file_assignments
            .values_mut()
            .chain(self.hunk_assignments.values_mut())
        {
            if assigned == id {
                *assigned = target.clone();
            }
        }

        self.changelists.retain(|cl| cl.id != id);
        if self.active_id == id {
            self.active_id = self.default_id().to_string();
        }

        Some(target)
    }

    pub fn rename_changelist(&mut self, id: &str, new_name: &str) -> Result<()> {
        if new_name.trim().is_empty() {
            return Err(ChangelistError::EmptyName);
        }
        if !self.contains(id) {
            return Err(ChangelistError::UnknownChangelist(id.to_string()));
        }
        if self.is_name_taken(new_name, Some(id)) {
            return Err(ChangelistError::DuplicateName(new_name.trim().to_string()));
        }

        if let Some(cl) = self.changelists.iter_mut().find(|cl| cl.id == id) {
            cl.name = new_name.trim().to_string();
        }
        Ok(())
    }

    /// Make `id` the target for new changes; false if unknown
    pub fn set_active(&mut self, id: &str) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.active_id = id.to_string();
        true
    }

    pub fn set_expanded(&mut self, id: &str, expanded: bool) -> bool {
        match self.changelists.iter_mut().find(|cl| cl.id == id) {
            Some(cl) => {
                cl.is_expanded = expanded;
                true
            }
            None => false,
        }
    }

    // ==================== Assignments ====================

    pub fn file_assignment(&self, path: &str) -> Option<&str> {
        self.file_assignments.get(path).map(String::as_str)
    }

    /// Assign a file; ignored if the changelist doesn't exist
    pub fn assign_file(&mut self, path: &str, changelist_id: &str) -> bool {
        if !self.contains(changelist_id) {
            return false;
        }
        self.file_assignments
            .insert(path.to_string(), changelist_id.to_string());
        self.unversioned.remove(path);
        true
    }

    /// Drop the file's assignment and keep it unversioned until it is
    /// assigned again
    pub fn mark_unversioned(&mut self, path: &str) {
        self.file_assignments.remove(path);
        self.unversioned.insert(path.to_string());
    }

    pub fn is_unversioned(&self, path: &str) -> bool {
        self.unversioned.contains(path)
    }

    pub fn hunk_assignment(&self, hunk_id: &str) -> Option<&str> {
        self.hunk_assignments.get(hunk_id).map(String::as_str)
    }

    /// Assign a hunk; ignored if the changelist doesn't exist
    pub fn assign_hunk(&mut self, hunk_id: &str, changelist_id: &str) -> bool {
        if !self.contains(changelist_id) {
            return false;
        }
        self.hunk_assignments
            .insert(hunk_id.to_string(), changelist_id.to_string());
        true
    }

    pub fn unassign_hunk(&mut self, hunk_id: &str) {
        self.hunk_assignments.remove(hunk_id);
    }

    /// Keep only file assignments whose path passes `keep`
    pub fn retain_files(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.file_assignments.retain(|path, _| keep(path));
        self.unversioned.retain(|path| keep(path));
    }

    /// Keep only hunk assignments whose id passes `keep`
    pub fn retain_hunks(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.hunk_assignments.retain(|id, _| keep(id));
    }

    pub fn file_assignment_count(&self) -> usize {
        self.file_assignments.len()
    }

    pub fn hunk_assignment_count(&self) -> usize {
        self.hunk_assignments.len()
    }

    fn prune_unknown_changelists(&mut self) {
        let known: HashSet<String> = self.changelists.iter().map(|cl| cl.id.clone()).collect();
        self.file_assignments.retain(|_, id| known.contains(id));
        self.hunk_assignments.retain(|_, id| known.contains(id));
    }
}
