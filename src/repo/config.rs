//! Configuration for the changelist manager

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the directory holding changelist state inside the git directory
pub const STATE_DIR_NAME: &str = "changelists";

/// Configuration for a repository's changelists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Line distance under which hunk boundaries count as the same edit
    #[serde(default = "default_proximity_threshold")]
    pub proximity_threshold: u32,

    /// How long a manual move overrides what a refresh observes
    #[serde(default = "default_pending_move_window_ms")]
    pub pending_move_window_ms: u64,

    /// Refresh requests within this window after a mutation are delayed
    #[serde(default = "default_quiet_window_ms")]
    pub quiet_window_ms: u64,

    /// Delay of the follow-up refresh after moving a file with hunks
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Debounce interval for file watcher events
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,

    /// Paths whose changes never trigger a refresh (glob patterns)
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
}

fn default_proximity_threshold() -> u32 {
    crate::hunk::DEFAULT_PROXIMITY_THRESHOLD
}

fn default_pending_move_window_ms() -> u64 {
    2000
}

fn default_quiet_window_ms() -> u64 {
    500
}

fn default_settle_delay_ms() -> u64 {
    750
}

fn default_watch_debounce_ms() -> u64 {
    300
}

fn default_ignore_patterns() -> Vec<String> {
    vec![
        ".git/objects/**".to_string(),
        ".git/logs/**".to_string(),
        ".git/changelists/**".to_string(),
        "target/**".to_string(),
        "*.lock".to_string(),
    ]
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            proximity_threshold: default_proximity_threshold(),
            pending_move_window_ms: default_pending_move_window_ms(),
            quiet_window_ms: default_quiet_window_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            watch_debounce_ms: default_watch_debounce_ms(),
            ignore_patterns: default_ignore_patterns(),
        }
    }
}

impl RepoConfig {
    /// Load configuration from the state directory, then the user config
    /// directory, or return defaults
    pub fn load_or_default(state_dir: &Path) -> Result<Self> {
        let candidates = [Some(state_dir.join("config.toml")), user_config_path()];

        for config_path in candidates.into_iter().flatten() {
            if config_path.exists() {
                let content = std::fs::read_to_string(&config_path)
                    .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
                let config: RepoConfig = toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;
                return Ok(config);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to the state directory
    pub fn save(&self, state_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(state_dir)?;

        let config_path = state_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    pub fn pending_move_window(&self) -> Duration {
        Duration::from_millis(self.pending_move_window_ms)
    }

    pub fn quiet_window(&self) -> Duration {
        Duration::from_millis(self.quiet_window_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    /// Check if changes to a path should be ignored by the watcher
    pub fn should_ignore(&self, path: &str) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| glob_match_simple(pattern, path))
    }

    /// Look up a single value by key, for `config --get`
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "proximity_threshold" => Some(self.proximity_threshold.to_string()),
            "pending_move_window_ms" => Some(self.pending_move_window_ms.to_string()),
            "quiet_window_ms" => Some(self.quiet_window_ms.to_string()),
            "settle_delay_ms" => Some(self.settle_delay_ms.to_string()),
            "watch_debounce_ms" => Some(self.watch_debounce_ms.to_string()),
            "ignore_patterns" => Some(self.ignore_patterns.join(",")),
            _ => None,
        }
    }

    /// Set a single value from `key=value`, for `config --set`
    pub fn set(&mut self, assignment: &str) -> Result<()> {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Expected key=value, got: {}", assignment))?;
        let value = value.trim();

        match key.trim() {
            "proximity_threshold" => self.proximity_threshold = value.parse()?,
            "pending_move_window_ms" => self.pending_move_window_ms = value.parse()?,
            "quiet_window_ms" => self.quiet_window_ms = value.parse()?,
            "settle_delay_ms" => self.settle_delay_ms = value.parse()?,
            "watch_debounce_ms" => self.watch_debounce_ms = value.parse()?,
            "ignore_patterns" => {
                self.ignore_patterns = value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect()
            }
            other => anyhow::bail!("Unknown config key: {}", other),
        }

        Ok(())
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(STATE_DIR_NAME).join("config.toml"))
}

/// Simple glob matching helper
fn glob_match_simple(pattern: &str, path: &str) -> bool {
    if pattern.contains("**") {
        let parts: Vec<&str> = pattern.split("**").collect();
        if parts.len() == 2 {
            let prefix = parts[0].trim_end_matches('/');
            let suffix = parts[1].trim_start_matches('/');
            return (prefix.is_empty() || path.starts_with(prefix))
                && (suffix.is_empty() || path.ends_with(suffix));
        }
    }

    if pattern.contains('*') {
        let parts: Vec<&str> = pattern.split('*').collect();
        if parts.len() == 2 {
            return path.starts_with(parts[0]) && path.ends_with(parts[1]);
        }
    }

    path == pattern || path.ends_with(&format!("/{}", pattern))
}
