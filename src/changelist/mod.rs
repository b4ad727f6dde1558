//! Changelists: named groups of pending changes
//!
//! This module partitions a working tree's changes into changelists:
//! - The data model for changelists, files and their per-changelist views
//! - The assignment store that remembers where every file and hunk belongs
//! - Reconciliation of fresh VCS state with stored and in-flight assignments
//! - Mutations, refresh scheduling and change notification

mod error;
mod manager;
mod reconcile;
mod scheduler;
mod service;
mod store;

pub use error::{ChangelistError, Result};
pub use manager::{ChangelistManager, ManagerOptions, MoveOutcome};
pub use reconcile::{Observation, ReconcileInput, Reconciler, Reconciliation};
pub use scheduler::{RefreshOutcome, RefreshScheduler, SchedulerState, SharedManager};
pub use service::ChangelistService;
pub use store::AssignmentStore;

use crate::hunk::{path_id, Hunk};
use crate::repo::{FileStatus, StatusEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Id of the changelist synthesized on first run
pub const DEFAULT_CHANGELIST_ID: &str = "default";

/// Name of the changelist synthesized on first run
pub const DEFAULT_CHANGELIST_NAME: &str = "Default";

/// A user-defined group of pending changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Changelist {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_expanded")]
    pub is_expanded: bool,
    pub created_at: DateTime<Utc>,
}

fn default_expanded() -> bool {
    true
}

impl Changelist {
    /// Create a new, non-default changelist
    pub fn new(name: &str, description: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            description,
            is_default: false,
            is_expanded: true,
            created_at: Utc::now(),
        }
    }

    /// Create the default changelist
    pub fn new_default() -> Self {
        Self {
            id: DEFAULT_CHANGELIST_ID.to_string(),
            name: DEFAULT_CHANGELIST_NAME.to_string(),
            description: None,
            is_default: true,
            is_expanded: true,
            created_at: Utc::now(),
        }
    }

    /// Case-insensitive, trimmed name comparison
    pub fn has_name(&self, name: &str) -> bool {
        self.name.trim().to_lowercase() == name.trim().to_lowercase()
    }
}

/// A changed file as shown in one changelist.
///
/// Rebuilt on every refresh. A file whose hunks span several changelists is
/// materialized once per changelist, each copy holding only that
/// changelist's hunks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileItem {
    /// Derived from the path only
    pub id: String,
    pub path: String,
    /// Display name (last path component)
    pub name: String,
    pub status: FileStatus,
    pub is_selected: bool,
    pub is_staged: bool,
    pub changelist_id: Option<String>,
    pub hunks: Vec<Hunk>,
}

impl FileItem {
    pub(crate) fn from_status(entry: &StatusEntry, changelist_id: Option<String>, hunks: Vec<Hunk>) -> Self {
        let is_staged = if hunks.is_empty() {
            entry.is_staged
        } else {
            hunks.iter().any(|h| h.is_staged)
        };

        Self {
            id: path_id(&entry.path),
            path: entry.path.clone(),
            name: display_name(&entry.path),
            status: entry.status,
            is_selected: false,
            is_staged,
            changelist_id,
            hunks,
        }
    }

    pub(crate) fn untracked(path: &str, changelist_id: Option<String>) -> Self {
        Self {
            id: path_id(path),
            path: path.to_string(),
            name: display_name(path),
            status: FileStatus::Untracked,
            is_selected: false,
            is_staged: false,
            changelist_id,
            hunks: Vec::new(),
        }
    }
}

fn display_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// A changelist with the files currently placed in it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangelistView {
    #[serde(flatten)]
    pub changelist: Changelist,
    pub is_active: bool,
    pub files: Vec<FileItem>,
}

/// The result of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    pub changelists: Vec<ChangelistView>,
    /// Files with no changelist
    pub unversioned: Vec<FileItem>,
}

impl Partition {
    /// Files of one changelist, `None` for the unversioned bucket
    pub fn files(&self, changelist_id: Option<&str>) -> &[FileItem] {
        match changelist_id {
            None => &self.unversioned,
            Some(id) => self
                .changelists
                .iter()
                .find(|view| view.changelist.id == id)
                .map(|view| view.files.as_slice())
                .unwrap_or(&[]),
        }
    }

    pub(crate) fn files_mut(&mut self, changelist_id: Option<&str>) -> Option<&mut Vec<FileItem>> {
        match changelist_id {
            None => Some(&mut self.unversioned),
            Some(id) => self
                .changelists
                .iter_mut()
                .find(|view| view.changelist.id == id)
                .map(|view| &mut view.files),
        }
    }

    /// Every placement, changelists first, then unversioned
    pub fn all_files(&self) -> impl Iterator<Item = &FileItem> {
        self.changelists
            .iter()
            .flat_map(|view| view.files.iter())
            .chain(self.unversioned.iter())
    }

    /// First placement of a file, by file id
    pub fn find_file(&self, file_id: &str) -> Option<&FileItem> {
        self.all_files().find(|file| file.id == file_id)
    }

    /// A file by path as placed in one changelist
    pub fn find_in(&self, changelist_id: Option<&str>, file_id: &str) -> Option<&FileItem> {
        self.files(changelist_id).iter().find(|file| file.id == file_id)
    }

    /// Changelists a path currently appears in, `None` for unversioned
    pub fn placements(&self, path: &str) -> Vec<Option<&str>> {
        self.all_files()
            .filter(|file| file.path == path)
            .map(|file| file.changelist_id.as_deref())
            .collect()
    }

    pub fn find_hunk(&self, hunk_id: &str) -> Option<&Hunk> {
        self.all_files()
            .flat_map(|file| file.hunks.iter())
            .find(|hunk| hunk.id == hunk_id)
    }

    pub fn selected_files(&self) -> impl Iterator<Item = &FileItem> {
        self.all_files().filter(|file| file.is_selected)
    }
}

/// Where a manual move sends a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveTarget {
    Changelist(String),
    Unversioned,
}

/// A recent manual move that overrides what a refresh observes
#[derive(Debug, Clone)]
pub struct PendingMove {
    pub path: String,
    /// Bucket the file's hunks were taken from, `None` for unversioned
    pub source: Option<String>,
    pub target: MoveTarget,
    pub at: Instant,
}

impl PendingMove {
    pub fn new(path: &str, source: Option<String>, target: MoveTarget) -> Self {
        Self {
            path: path.to_string(),
            source,
            target,
            at: Instant::now(),
        }
    }

    pub fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.at) >= window
    }
}
