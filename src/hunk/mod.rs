//! Diff hunk records and hunk identity
//!
//! This module handles:
//! - Parsing unified-diff text into structured hunks
//! - Positional hunk identifiers
//! - Detecting when a new hunk continues a previously tracked one

pub mod extension;
pub mod parser;

pub use extension::{ContinuationMatcher, ProximityMatcher, DEFAULT_PROXIMITY_THRESHOLD};
pub use parser::parse_hunks;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A contiguous block of changed lines from a unified diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hunk {
    /// Positional identifier, see [`hunk_id`]
    pub id: String,
    /// Path of the file relative to the repository root
    pub file_path: String,
    /// First line of the hunk in the old file
    pub old_start: u32,
    /// Number of old-file lines covered
    pub old_lines: u32,
    /// First line of the hunk in the new file
    pub new_start: u32,
    /// Number of new-file lines covered
    pub new_lines: u32,
    /// Raw `+`/`-`/context lines following the header
    pub content: String,
    /// Whether the hunk comes from the staged (HEAD to index) diff
    pub is_staged: bool,
    /// Changelist the hunk is assigned to, `None` when unversioned
    #[serde(default)]
    pub changelist_id: Option<String>,
}

impl Hunk {
    /// Create an unassigned hunk, deriving its id from its position
    pub fn new(
        file_path: &str,
        old_start: u32,
        old_lines: u32,
        new_start: u32,
        new_lines: u32,
        content: String,
        is_staged: bool,
    ) -> Self {
        Self {
            id: hunk_id(file_path, old_start, new_start),
            file_path: file_path.to_string(),
            old_start,
            old_lines,
            new_start,
            new_lines,
            content,
            is_staged,
            changelist_id: None,
        }
    }

    /// Last line of the old range
    pub fn old_end(&self) -> u32 {
        self.old_start.saturating_add(self.old_lines)
    }

    /// Last line of the new range
    pub fn new_end(&self) -> u32 {
        self.new_start.saturating_add(self.new_lines)
    }

    /// The header line as git prints it
    pub fn header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_lines, self.new_start, self.new_lines
        )
    }

    /// Number of added and removed lines
    pub fn line_counts(&self) -> (usize, usize) {
        let added = self.content.lines().filter(|l| l.starts_with('+')).count();
        let removed = self.content.lines().filter(|l| l.starts_with('-')).count();
        (added, removed)
    }
}

/// Positional hunk identifier.
///
/// Only the file path and the two start lines take part, so the id changes
/// whenever an edit above the hunk shifts it. [`extension`] compensates.
pub fn hunk_id(file_path: &str, old_start: u32, new_start: u32) -> String {
    format!("{}:{}:{}", file_path, old_start, new_start)
}

/// Stable, content-free identifier for a file path
pub fn path_id(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hex::encode(&hasher.finalize()[..8])
}
