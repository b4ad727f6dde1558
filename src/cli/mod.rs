//! CLI interface using clap
//!
//! Provides the command-line interface for changelists

mod commands;

pub use commands::*;

use clap::{Parser, Subcommand};

/// Changelists - group pending git changes into named changelists
#[derive(Parser, Debug)]
#[command(name = "changelists")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the repository (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    pub path: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(short = 'o', long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show changelists and the files in them
    Status(StatusArgs),

    /// Create a changelist
    Create(CreateArgs),

    /// Delete a changelist, moving its files to the active changelist
    Delete(ChangelistArgs),

    /// Rename a changelist
    Rename(RenameArgs),

    /// Make a changelist the target for new changes
    Activate(ChangelistArgs),

    /// Move a file to a changelist
    Move(MoveArgs),

    /// Move a single hunk to a changelist
    MoveHunk(MoveHunkArgs),

    /// Take a file out of every changelist
    Unversion(UnversionArgs),

    /// Move every file of one changelist to another
    MoveAll(MoveAllArgs),

    /// Commit the files of a changelist
    Commit(CommitArgs),

    /// Discard the changes of a changelist
    Revert(ChangelistArgs),

    /// Stash the files of a changelist
    Stash(StashArgs),

    /// Forget all changelists and assignments
    Clear(ClearArgs),

    /// Show configuration
    Config(ConfigArgs),

    /// Watch the working tree and print changelists as they change
    Watch(WatchArgs),
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Arguments for status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// List hunks under each file
    #[arg(long)]
    pub hunks: bool,
}

/// Arguments for create command
#[derive(Parser, Debug)]
pub struct CreateArgs {
    /// Name of the new changelist
    pub name: String,

    /// Optional description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Make it the active changelist
    #[arg(short, long)]
    pub activate: bool,
}

/// A changelist given by name or id
#[derive(Parser, Debug)]
pub struct ChangelistArgs {
    /// Changelist name or id
    pub changelist: String,
}

/// Arguments for rename command
#[derive(Parser, Debug)]
pub struct RenameArgs {
    /// Changelist name or id
    pub changelist: String,

    /// New name
    pub name: String,
}

/// Arguments for move command
#[derive(Parser, Debug)]
pub struct MoveArgs {
    /// File path relative to the repository root
    pub file: String,

    /// Target changelist name or id
    pub changelist: String,

    /// Only move the part of the file in this changelist ("unversioned" for
    /// the unversioned bucket)
    #[arg(long)]
    pub from: Option<String>,
}

/// Arguments for move-hunk command
#[derive(Parser, Debug)]
pub struct MoveHunkArgs {
    /// Hunk id as shown by `status --hunks`
    pub hunk_id: String,

    /// Target changelist name or id
    pub changelist: String,
}

/// Arguments for unversion command
#[derive(Parser, Debug)]
pub struct UnversionArgs {
    /// File path relative to the repository root
    pub file: String,
}

/// Arguments for move-all command
#[derive(Parser, Debug)]
pub struct MoveAllArgs {
    /// Source changelist name or id
    pub from: String,

    /// Target changelist name or id
    pub to: String,
}

/// Arguments for commit command
#[derive(Parser, Debug)]
pub struct CommitArgs {
    /// Changelist name or id
    pub changelist: String,

    /// Commit message
    #[arg(short, long)]
    pub message: String,

    /// Amend the previous commit
    #[arg(long)]
    pub amend: bool,
}

/// Arguments for stash command
#[derive(Parser, Debug)]
pub struct StashArgs {
    /// Changelist name or id
    pub changelist: String,

    /// Stash message
    #[arg(short, long)]
    pub message: String,
}

/// Arguments for clear command
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Clear without asking
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for watch command
#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Debounce interval in milliseconds (defaults to the configured value)
    #[arg(short, long)]
    pub debounce: Option<u64>,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Set a configuration value (key=value)
    #[arg(long)]
    pub set: Option<String>,

    /// Get a configuration value
    #[arg(long)]
    pub get: Option<String>,

    /// Reset to defaults
    #[arg(long)]
    pub reset: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
