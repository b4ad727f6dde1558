//! Changelists - named groups of pending changes for git working trees
//!
//! This library partitions a repository's uncommitted changes into
//! user-defined changelists, down to individual diff hunks, and keeps that
//! grouping stable across refreshes while the working tree changes underneath.

pub mod changelist;
pub mod cli;
pub mod hunk;
pub mod repo;
pub mod storage;

/// Re-export commonly used types
pub use changelist::{
    Changelist, ChangelistError, ChangelistManager, ChangelistService, FileItem, ManagerOptions,
    Partition,
};
pub use hunk::Hunk;
pub use repo::{GitVcs, RepoConfig, VcsProvider};
pub use storage::Database;

/// Application-wide error type
pub use anyhow::Result;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "changelists";
