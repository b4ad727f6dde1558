//! Scripted in-memory collaborator for tests

use super::{CommitOptions, FileStatus, StatusEntry, VcsError, VcsProvider, VcsResult};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct FakeState {
    statuses: Vec<StatusEntry>,
    untracked: Vec<String>,
    diffs: HashMap<(String, bool), String>,
    fail_reads: bool,
    fail_writes: bool,
    failing_diffs: HashSet<String>,
    calls: Vec<String>,
}

/// A working tree whose status and diffs are set directly by the test
#[derive(Default)]
pub(crate) struct FakeVcs {
    state: Mutex<FakeState>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a tracked file as modified with the given unstaged diff
    pub fn modify(&self, path: &str, diff: &str) {
        self.set_status(path, FileStatus::Modified, false);
        self.set_diff(path, false, diff);
    }

    pub fn set_status(&self, path: &str, status: FileStatus, is_staged: bool) {
        let mut state = self.state.lock().unwrap();
        state.statuses.retain(|s| s.path != path);
        state.statuses.push(StatusEntry::new(path, status, is_staged));
    }

    pub fn set_diff(&self, path: &str, staged: bool, diff: &str) {
        let mut state = self.state.lock().unwrap();
        state.diffs.insert((path.to_string(), staged), diff.to_string());
    }

    pub fn add_untracked(&self, path: &str) {
        self.state.lock().unwrap().untracked.push(path.to_string());
    }

    /// Drop every trace of a path, as if reverted or committed
    pub fn clean(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        state.statuses.retain(|s| s.path != path);
        state.untracked.retain(|p| p != path);
        state.diffs.retain(|(p, _), _| p != path);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_reads = fail;
    }

    /// Make diffs of one path fail while status keeps working
    pub fn fail_diff(&self, path: &str) {
        self.state.lock().unwrap().failing_diffs.insert(path.to_string());
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    /// Mutating calls made so far, e.g. `unstage a.txt`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn read(&self) -> VcsResult<std::sync::MutexGuard<'_, FakeState>> {
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(VcsError::Command {
                command: "git status".to_string(),
                message: "index.lock exists".to_string(),
            });
        }
        Ok(state)
    }

    fn write(&self, call: String) -> VcsResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(VcsError::Command {
                command: call,
                message: "rejected".to_string(),
            });
        }
        state.calls.push(call);
        Ok(())
    }
}

impl VcsProvider for FakeVcs {
    fn status(&self) -> VcsResult<Vec<StatusEntry>> {
        Ok(self.read()?.statuses.clone())
    }

    fn untracked_files(&self) -> VcsResult<Vec<String>> {
        Ok(self.read()?.untracked.clone())
    }

    fn diff(&self, path: &str, staged: bool) -> VcsResult<String> {
        let state = self.read()?;
        if state.failing_diffs.contains(path) {
            return Err(VcsError::Command {
                command: format!("git diff {}", path),
                message: "bad object".to_string(),
            });
        }
        Ok(state
            .diffs
            .get(&(path.to_string(), staged))
            .cloned()
            .unwrap_or_default())
    }

    fn stage(&self, path: &str) -> VcsResult<()> {
        self.write(format!("stage {}", path))
    }

    fn unstage(&self, path: &str) -> VcsResult<()> {
        self.write(format!("unstage {}", path))
    }

    fn is_tracked(&self, path: &str) -> VcsResult<bool> {
        let state = self.read()?;
        Ok(state.statuses.iter().any(|s| s.path == path))
    }

    fn commit(&self, paths: &[String], message: &str, options: CommitOptions) -> VcsResult<()> {
        let amend = if options.amend { " --amend" } else { "" };
        self.write(format!("commit{} [{}] {}", amend, paths.join(","), message))
    }

    fn revert(&self, paths: &[String]) -> VcsResult<()> {
        self.write(format!("revert [{}]", paths.join(",")))
    }

    fn stash(&self, paths: &[String], message: &str) -> VcsResult<()> {
        self.write(format!("stash [{}] {}", paths.join(","), message))
    }
}
