//! Error types for changelist operations

use crate::repo::VcsError;

/// All possible changelist errors
#[derive(Debug, thiserror::Error)]
pub enum ChangelistError {
    /// Another changelist already uses this name (case-insensitive, trimmed)
    #[error("a changelist named '{0}' already exists")]
    DuplicateName(String),

    #[error("changelist name cannot be empty")]
    EmptyName,

    #[error("changelist not found: {0}")]
    UnknownChangelist(String),

    #[error("the default changelist cannot be deleted")]
    DefaultChangelist,

    #[error("file not found in any changelist: {0}")]
    UnknownFile(String),

    #[error("hunk not found: {0}")]
    UnknownHunk(String),

    #[error("no files selected")]
    NoFilesSelected,

    #[error("commit message cannot be empty")]
    EmptyMessage,

    /// A collaborator call failed; in-memory state is unchanged
    #[error(transparent)]
    Vcs(#[from] VcsError),
}

/// Convenience alias for changelist results
pub type Result<T> = std::result::Result<T, ChangelistError>;
