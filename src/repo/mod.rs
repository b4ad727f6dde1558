//! Version-control collaborator
//!
//! This module handles Git working-tree operations including:
//! - Status of tracked and untracked files
//! - Per-file unified diffs, staged and unstaged
//! - Staging, committing, reverting and stashing paths

mod change;
mod config;
#[cfg(test)]
pub(crate) mod fake;

pub use change::{CommitOptions, FileStatus, StatusEntry};
pub use config::{RepoConfig, STATE_DIR_NAME};

use git2::build::CheckoutBuilder;
use git2::{DiffFormat, DiffOptions, ErrorCode, ObjectType, Repository as GitRepo, Status, StatusOptions};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Errors reported by the version-control collaborator
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{command} failed: {message}")]
    Command { command: String, message: String },

    #[error("repository has no working directory (bare repo?)")]
    NoWorkdir,
}

/// Convenience alias for collaborator results
pub type VcsResult<T> = std::result::Result<T, VcsError>;

/// Operations the changelist manager needs from version control.
///
/// Every call may block on an external process or the filesystem.
pub trait VcsProvider: Send + Sync {
    /// Tracked files with pending changes
    fn status(&self) -> VcsResult<Vec<StatusEntry>>;

    /// Files not known to version control
    fn untracked_files(&self) -> VcsResult<Vec<String>>;

    /// Unified diff of a single file, HEAD to index when `staged`,
    /// index to working tree otherwise
    fn diff(&self, path: &str, staged: bool) -> VcsResult<String>;

    fn stage(&self, path: &str) -> VcsResult<()>;

    fn unstage(&self, path: &str) -> VcsResult<()>;

    fn is_tracked(&self, path: &str) -> VcsResult<bool>;

    /// Commit exactly `paths`, regardless of what else is staged
    fn commit(&self, paths: &[String], message: &str, options: CommitOptions) -> VcsResult<()>;

    /// Discard all changes to `paths`
    fn revert(&self, paths: &[String]) -> VcsResult<()>;

    fn stash(&self, paths: &[String], message: &str) -> VcsResult<()>;
}

/// A Git working tree
pub struct GitVcs {
    /// Path to the working tree root
    root: PathBuf,
    /// Path to the `.git` directory
    git_dir: PathBuf,
}

impl GitVcs {
    /// Open the repository containing the given path
    pub fn open<P: AsRef<Path>>(path: P) -> VcsResult<Self> {
        let repo = GitRepo::discover(path.as_ref())?;
        let root = repo.workdir().ok_or(VcsError::NoWorkdir)?.to_path_buf();
        let git_dir = repo.path().to_path_buf();

        Ok(Self { root, git_dir })
    }

    /// Get the working tree root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding changelist state. Lives inside the git directory so
    /// it never shows up as an untracked file.
    pub fn state_dir(&self) -> PathBuf {
        self.git_dir.join(STATE_DIR_NAME)
    }

    /// Create the state directory if it doesn't exist
    pub fn init_state_dir(&self) -> VcsResult<PathBuf> {
        let state_dir = self.state_dir();
        if !state_dir.exists() {
            std::fs::create_dir_all(&state_dir)?;
        }
        Ok(state_dir)
    }

    // libgit2 handles are not Sync, so every call opens its own
    fn repo(&self) -> VcsResult<GitRepo> {
        Ok(GitRepo::open(&self.root)?)
    }

    fn run_git(&self, args: &[&str]) -> VcsResult<()> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .output()?;

        if output.status.success() {
            Ok(())
        } else {
            Err(VcsError::Command {
                command: format!("git {}", args.first().copied().unwrap_or_default()),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// HEAD's tree, or `None` on an unborn branch
fn head_tree(repo: &GitRepo) -> VcsResult<Option<git2::Tree<'_>>> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_tree()?)),
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn map_status(status: Status) -> Option<FileStatus> {
    if status.is_index_new() {
        Some(FileStatus::Added)
    } else if status.is_index_renamed() || status.is_wt_renamed() {
        Some(FileStatus::Renamed)
    } else if status.is_index_deleted() || status.is_wt_deleted() {
        Some(FileStatus::Deleted)
    } else if status.is_index_modified()
        || status.is_wt_modified()
        || status.is_index_typechange()
        || status.is_wt_typechange()
        || status.is_conflicted()
    {
        Some(FileStatus::Modified)
    } else {
        None
    }
}

/// Render a diff as patch text, without the no-newline markers
fn format_patch(diff: &git2::Diff<'_>) -> VcsResult<String> {
    let mut output = String::new();

    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        match line.origin() {
            '+' | '-' | ' ' => output.push(line.origin()),
            '=' | '>' | '<' => return true,
            _ => {}
        }
        output.push_str(&String::from_utf8_lossy(line.content()));
        true
    })?;

    Ok(output)
}

impl VcsProvider for GitVcs {
    fn status(&self) -> VcsResult<Vec<StatusEntry>> {
        let repo = self.repo()?;

        let mut opts = StatusOptions::new();
        opts.include_untracked(false)
            .include_ignored(false)
            .renames_head_to_index(true);

        let statuses = repo.statuses(Some(&mut opts))?;
        let staged_mask = Status::INDEX_NEW
            | Status::INDEX_MODIFIED
            | Status::INDEX_DELETED
            | Status::INDEX_RENAMED
            | Status::INDEX_TYPECHANGE;

        let mut entries = Vec::new();
        for entry in statuses.iter() {
            let status = entry.status();
            let Some(kind) = map_status(status) else {
                continue;
            };

            let renamed_to = entry
                .head_to_index()
                .filter(|_| status.is_index_renamed())
                .and_then(|delta| delta.new_file().path())
                .and_then(|p| p.to_str())
                .map(String::from);

            let Some(path) = renamed_to.or_else(|| entry.path().map(String::from)) else {
                continue;
            };

            entries.push(StatusEntry::new(&path, kind, status.intersects(staged_mask)));
        }

        Ok(entries)
    }

    fn untracked_files(&self) -> VcsResult<Vec<String>> {
        let repo = self.repo()?;

        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = repo.statuses(Some(&mut opts))?;
        Ok(statuses
            .iter()
            .filter(|entry| entry.status() == Status::WT_NEW)
            .filter_map(|entry| entry.path().map(String::from))
            .collect())
    }

    fn diff(&self, path: &str, staged: bool) -> VcsResult<String> {
        let repo = self.repo()?;

        let mut opts = DiffOptions::new();
        opts.pathspec(path).disable_pathspec_match(true);

        let diff = if staged {
            let tree = head_tree(&repo)?;
            repo.diff_tree_to_index(tree.as_ref(), None, Some(&mut opts))?
        } else {
            repo.diff_index_to_workdir(None, Some(&mut opts))?
        };

        format_patch(&diff)
    }

    fn stage(&self, path: &str) -> VcsResult<()> {
        let repo = self.repo()?;
        let mut index = repo.index()?;

        if self.root.join(path).exists() {
            index.add_path(Path::new(path))?;
        } else {
            index.remove_path(Path::new(path))?;
        }
        index.write()?;

        Ok(())
    }

    fn unstage(&self, path: &str) -> VcsResult<()> {
        let repo = self.repo()?;

        match repo.head() {
            Ok(head) => {
                let commit = head.peel(ObjectType::Commit)?;
                repo.reset_default(Some(&commit), [path])?;
            }
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                let mut index = repo.index()?;
                index.remove_path(Path::new(path))?;
                index.write()?;
            }
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }

    fn is_tracked(&self, path: &str) -> VcsResult<bool> {
        let repo = self.repo()?;

        if repo.index()?.get_path(Path::new(path), 0).is_some() {
            return Ok(true);
        }

        let tracked = head_tree(&repo)?
            .map(|tree| tree.get_path(Path::new(path)).is_ok())
            .unwrap_or(false);
        Ok(tracked)
    }

    fn commit(&self, paths: &[String], message: &str, options: CommitOptions) -> VcsResult<()> {
        for path in paths {
            if !self.is_tracked(path)? {
                self.stage(path)?;
            }
        }

        let mut args = vec!["commit", "--only", "--message", message];
        if options.amend {
            args.push("--amend");
        }
        args.push("--");
        args.extend(paths.iter().map(String::as_str));

        self.run_git(&args)
    }

    fn revert(&self, paths: &[String]) -> VcsResult<()> {
        let repo = self.repo()?;
        let tree = head_tree(&repo)?;
        let mut index = repo.index()?;

        let mut restore = Vec::new();
        for path in paths {
            let in_head = tree
                .as_ref()
                .map(|t| t.get_path(Path::new(path)).is_ok())
                .unwrap_or(false);

            if in_head {
                restore.push(path.as_str());
                continue;
            }

            // Never committed: forget it and remove it from disk
            if index.get_path(Path::new(path), 0).is_some() {
                index.remove_path(Path::new(path))?;
            }
            let full_path = self.root.join(path);
            if full_path.exists() {
                std::fs::remove_file(&full_path)?;
            }
        }
        index.write()?;

        if !restore.is_empty() {
            let head = repo.head()?.peel(ObjectType::Commit)?;
            repo.reset_default(Some(&head), restore.iter().copied())?;

            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            for path in &restore {
                checkout.path(*path);
            }
            repo.checkout_head(Some(&mut checkout))?;
        }

        Ok(())
    }

    fn stash(&self, paths: &[String], message: &str) -> VcsResult<()> {
        let mut args = vec!["stash", "push", "--include-untracked", "--message", message, "--"];
        args.extend(paths.iter().map(String::as_str));

        self.run_git(&args)
    }
}
