//! Working-tree change types reported by the version-control collaborator

use serde::{Deserialize, Serialize};

/// Status of a changed file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileStatus {
    /// File was modified
    Modified,
    /// File was added to the index
    Added,
    /// File was deleted
    Deleted,
    /// File is not known to version control
    Untracked,
    /// File was renamed
    Renamed,
}

impl FileStatus {
    /// Single-letter code, as shown by `git status --short`
    pub fn code(&self) -> char {
        match self {
            FileStatus::Modified => 'M',
            FileStatus::Added => 'A',
            FileStatus::Deleted => 'D',
            FileStatus::Untracked => '?',
            FileStatus::Renamed => 'R',
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::Modified => write!(f, "modified"),
            FileStatus::Added => write!(f, "added"),
            FileStatus::Deleted => write!(f, "deleted"),
            FileStatus::Untracked => write!(f, "untracked"),
            FileStatus::Renamed => write!(f, "renamed"),
        }
    }
}

/// A tracked file with pending changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Path relative to the repository root
    pub path: String,
    /// Kind of change
    pub status: FileStatus,
    /// Whether the index differs from HEAD for this path
    pub is_staged: bool,
}

impl StatusEntry {
    /// Create a new status entry
    pub fn new(path: &str, status: FileStatus, is_staged: bool) -> Self {
        Self {
            path: path.to_string(),
            status,
            is_staged,
        }
    }

    /// Deleted files have no diff worth parsing
    pub fn has_content(&self) -> bool {
        self.status != FileStatus::Deleted
    }
}

/// Options for a commit
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitOptions {
    /// Amend the previous commit instead of creating a new one
    pub amend: bool,
}
