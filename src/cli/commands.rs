//! Command implementations

use crate::changelist::{ChangelistManager, FileItem, ManagerOptions, Partition};
use crate::hunk::path_id;
use crate::repo::{GitVcs, RepoConfig};
use crate::storage::Database;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name of the state database inside the state directory
pub const DB_FILE_NAME: &str = "state.db";

/// Keyword for the unversioned bucket in `move --from`
const UNVERSIONED: &str = "unversioned";

/// An opened repository with its manager
pub struct Session {
    pub manager: ChangelistManager,
    pub config: RepoConfig,
    pub root: PathBuf,
}

impl Session {
    /// Open the repository at `path` without reading the working tree yet
    pub fn open(path: &Path) -> Result<Self> {
        let vcs = GitVcs::open(path)
            .with_context(|| format!("Failed to open git repository at {:?}", path))?;
        let state_dir = vcs
            .init_state_dir()
            .context("Failed to create changelist state directory")?;

        let config = RepoConfig::load_or_default(&state_dir)?;
        let db = Database::open(state_dir.join(DB_FILE_NAME))?;
        let root = vcs.root().to_path_buf();

        let manager = ChangelistManager::new(Arc::new(vcs), Box::new(db), ManagerOptions::from(&config));

        Ok(Self {
            manager,
            config,
            root,
        })
    }

    /// Open the repository and read the working tree
    pub fn load(path: &Path) -> Result<Self> {
        let mut session = Self::open(path)?;
        if !session.manager.refresh() {
            anyhow::bail!("Failed to read the state of {:?}", session.root);
        }
        Ok(session)
    }

    /// Id of a changelist given by name or id
    pub fn resolve(&self, name_or_id: &str) -> Result<String> {
        self.manager
            .find_changelist(name_or_id)
            .map(|cl| cl.id.clone())
            .ok_or_else(|| anyhow::anyhow!("Changelist not found: {}", name_or_id))
    }

    fn name_of(&self, id: &str) -> String {
        self.manager
            .store()
            .get(id)
            .map(|cl| cl.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

/// Repository-relative path as used in status output
fn normalize_path(file: &str) -> String {
    file.trim_start_matches("./").replace('\\', "/")
}

/// Show changelists and their files
pub fn status(session: &Session, show_hunks: bool) {
    print_partition_text(&session.manager.partition(), show_hunks);
}

/// Create a changelist
pub fn create(session: &mut Session, name: &str, description: Option<String>, activate: bool) -> Result<String> {
    let id = session.manager.create_changelist(name, description)?;
    if activate {
        session.manager.set_active(&id)?;
    }

    println!("✓ Created changelist '{}'", session.name_of(&id));
    println!("  ID: {}", id);
    if activate {
        println!("  Active: yes");
    }

    Ok(id)
}

/// Delete a changelist
pub fn delete(session: &mut Session, changelist: &str) -> Result<()> {
    let id = session.resolve(changelist)?;
    let name = session.name_of(&id);
    session.manager.delete_changelist(&id)?;

    let active = session.manager.store().active_id().to_string();
    println!("✓ Deleted changelist '{}'", name);
    println!("  Files moved to '{}'", session.name_of(&active));

    Ok(())
}

/// Rename a changelist
pub fn rename(session: &mut Session, changelist: &str, new_name: &str) -> Result<()> {
    let id = session.resolve(changelist)?;
    let old_name = session.name_of(&id);
    session.manager.rename_changelist(&id, new_name)?;

    println!("✓ Renamed '{}' to '{}'", old_name, session.name_of(&id));
    Ok(())
}

/// Make a changelist active
pub fn activate(session: &mut Session, changelist: &str) -> Result<()> {
    let id = session.resolve(changelist)?;
    session.manager.set_active(&id)?;

    println!("✓ '{}' is now the active changelist", session.name_of(&id));
    Ok(())
}

/// Move a file to a changelist
pub fn move_file(session: &mut Session, file: &str, changelist: &str, from: Option<&str>) -> Result<()> {
    let path = normalize_path(file);
    let target = session.resolve(changelist)?;
    let file_id = path_id(&path);

    let outcome = match from {
        Some(source) if source.eq_ignore_ascii_case(UNVERSIONED) => {
            session.manager.move_file_from(&file_id, None, &target)?
        }
        Some(source) => {
            let source = session.resolve(source)?;
            session.manager.move_file_from(&file_id, Some(&source), &target)?
        }
        None => session.manager.move_file_to_changelist(&file_id, &target)?,
    };
    session.manager.refresh();

    println!("✓ Moved {} to '{}'", path, session.name_of(&target));
    if outcome.had_hunks {
        let placements = session.manager.partition().placements(&path).len();
        if placements > 1 {
            println!("  Other hunks keep the file in {} more place(s)", placements - 1);
        }
    }

    Ok(())
}

/// Move one hunk to a changelist
pub fn move_hunk(session: &mut Session, hunk_id: &str, changelist: &str) -> Result<()> {
    let target = session.resolve(changelist)?;
    session.manager.move_hunk_to_changelist(hunk_id, &target)?;
    session.manager.refresh();

    println!("✓ Moved hunk {} to '{}'", hunk_id, session.name_of(&target));
    Ok(())
}

/// Take a file out of every changelist
pub fn unversion(session: &mut Session, file: &str) -> Result<()> {
    let path = normalize_path(file);
    session.manager.move_file_to_unversioned(&path_id(&path))?;
    session.manager.refresh();

    println!("✓ Moved {} to unversioned", path);
    Ok(())
}

/// Move every file of one changelist to another
pub fn move_all(session: &mut Session, from: &str, to: &str) -> Result<usize> {
    let source = session.resolve(from)?;
    let target = session.resolve(to)?;
    let moved = session.manager.move_changelist_files(&source, &target)?;
    session.manager.refresh();

    println!(
        "✓ Moved {} file(s) from '{}' to '{}'",
        moved,
        session.name_of(&source),
        session.name_of(&target)
    );
    Ok(moved)
}

/// Commit the files of a changelist
pub fn commit(session: &mut Session, changelist: &str, message: &str, amend: bool) -> Result<()> {
    let id = select(session, changelist)?;
    let paths = session.manager.commit_selected(message, amend)?;
    session.manager.refresh();

    println!("✓ Committed {} file(s) from '{}'", paths.len(), session.name_of(&id));
    for path in &paths {
        println!("  {}", path);
    }
    Ok(())
}

/// Discard the changes of a changelist
pub fn revert(session: &mut Session, changelist: &str) -> Result<()> {
    let id = select(session, changelist)?;
    let paths = session.manager.revert_selected()?;
    session.manager.refresh();

    println!("✓ Reverted {} file(s) from '{}'", paths.len(), session.name_of(&id));
    Ok(())
}

/// Stash the files of a changelist
pub fn stash(session: &mut Session, changelist: &str, message: &str) -> Result<()> {
    let id = select(session, changelist)?;
    let paths = session.manager.stash_selected(message)?;
    session.manager.refresh();

    println!("✓ Stashed {} file(s) from '{}'", paths.len(), session.name_of(&id));
    Ok(())
}

fn select(session: &mut Session, changelist: &str) -> Result<String> {
    let id = session.resolve(changelist)?;
    session.manager.deselect_all();
    session.manager.select_changelist(Some(&id))?;
    Ok(id)
}

/// Reset to a single default changelist
pub fn clear(session: &mut Session, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("This forgets every changelist and assignment. Re-run with --yes to confirm.");
    }
    session.manager.clear_state()?;

    println!("✓ Cleared changelist state");
    Ok(())
}

/// Show or edit configuration
pub fn config(path: &Path, show: bool, set: Option<&str>, get: Option<&str>, reset: bool) -> Result<()> {
    let vcs = GitVcs::open(path)
        .with_context(|| format!("Failed to open git repository at {:?}", path))?;
    let state_dir = vcs.init_state_dir()?;
    let mut config = RepoConfig::load_or_default(&state_dir)?;

    if reset {
        config = RepoConfig::default();
        config.save(&state_dir)?;
        println!("✓ Configuration reset to defaults");
    }

    if let Some(assignment) = set {
        config.set(assignment)?;
        config.save(&state_dir)?;
        println!("✓ Set {}", assignment.trim());
    }

    if let Some(key) = get {
        match config.get(key) {
            Some(value) => println!("{}", value),
            None => anyhow::bail!("Unknown config key: {}", key),
        }
    }

    if show || (!reset && set.is_none() && get.is_none()) {
        print_config(&config);
    }

    Ok(())
}

fn print_config(config: &RepoConfig) {
    println!("Changelists Configuration");
    println!("=========================\n");

    println!("Proximity threshold: {} lines", config.proximity_threshold);
    println!("Pending move window: {}ms", config.pending_move_window_ms);
    println!("Quiet window: {}ms", config.quiet_window_ms);
    println!("Settle delay: {}ms", config.settle_delay_ms);
    println!("Watch debounce: {}ms", config.watch_debounce_ms);

    println!("\nIgnore patterns:");
    for pattern in &config.ignore_patterns {
        println!("  - {}", pattern);
    }
}

/// Print a partition in JSON format
pub fn print_partition_json(partition: &Partition) -> Result<()> {
    let json = serde_json::to_string_pretty(partition)?;
    println!("{}", json);
    Ok(())
}

/// Print a partition in text format
pub fn print_partition_text(partition: &Partition, show_hunks: bool) {
    for view in &partition.changelists {
        let marker = if view.is_active { "*" } else { " " };
        println!(
            "{} {} ({})",
            marker,
            view.changelist.name,
            file_count(view.files.len())
        );
        if let Some(ref description) = view.changelist.description {
            println!("    {}", description);
        }
        if view.changelist.is_expanded {
            print_files(&view.files, show_hunks);
        }
    }

    if !partition.unversioned.is_empty() {
        println!("\n  Unversioned ({})", file_count(partition.unversioned.len()));
        print_files(&partition.unversioned, show_hunks);
    }
}

fn print_files(files: &[FileItem], show_hunks: bool) {
    for file in files {
        let staged = if file.is_staged { "+" } else { " " };
        let hunks = match file.hunks.len() {
            0 => String::new(),
            1 => "  [1 hunk]".to_string(),
            n => format!("  [{} hunks]", n),
        };
        println!("    {}{} {}{}", file.status.code(), staged, file.path, hunks);

        if show_hunks {
            for hunk in &file.hunks {
                let (added, removed) = hunk.line_counts();
                println!("        {}  +{} -{}  {}", hunk.header(), added, removed, hunk.id);
            }
        }
    }
}

fn file_count(n: usize) -> String {
    if n == 1 {
        "1 file".to_string()
    } else {
        format!("{} files", n)
    }
}

/// One-line summary for watch mode
pub fn summary_line(partition: &Partition) -> String {
    let mut parts: Vec<String> = partition
        .changelists
        .iter()
        .map(|view| format!("{}: {}", view.changelist.name, view.files.len()))
        .collect();
    parts.push(format!("unversioned: {}", partition.unversioned.len()));
    parts.join(", ")
}
