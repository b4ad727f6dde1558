//! SQLite storage layer for changelist state
//!
//! This module handles persistent storage of:
//! - The changelist snapshot (changelists, assignments, active changelist)
//! - The hunk cache from the most recent refresh

mod schema;

pub use schema::SCHEMA;

use crate::changelist::Changelist;
use crate::hunk::Hunk;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Persisted changelist state.
///
/// Files and hunks themselves are never stored; they are rebuilt from the
/// working tree on every refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    #[serde(default)]
    pub changelists: Vec<Changelist>,
    /// path -> changelist id
    #[serde(default)]
    pub file_assignments: BTreeMap<String, String>,
    /// hunk id -> changelist id
    #[serde(default)]
    pub hunk_assignments: BTreeMap<String, String>,
    #[serde(default)]
    pub active_changelist_id: Option<String>,
    /// Tracked paths explicitly taken out of every changelist
    #[serde(default)]
    pub unversioned_files: BTreeSet<String>,
}

/// Where changelist state is persisted
pub trait StateStore: Send {
    /// Load the snapshot, `None` when absent or unreadable
    fn load_snapshot(&self) -> Result<Option<StateSnapshot>>;

    fn save_snapshot(&self, snapshot: &StateSnapshot) -> Result<()>;

    /// Hunks of the last refresh, keyed by path
    fn load_hunk_cache(&self) -> Result<HashMap<String, Vec<Hunk>>>;

    fn save_hunk_cache(&self, cache: &HashMap<String, Vec<Hunk>>) -> Result<()>;

    /// Forget everything
    fn clear(&self) -> Result<()>;

    /// Changes whenever another writer commits; stores with a single
    /// writer keep the default
    fn data_version(&self) -> Result<i64> {
        Ok(0)
    }
}

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", path.as_ref()))?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn initialize(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("Failed to initialize database schema")?;
        Ok(())
    }

    /// Store a raw snapshot payload (tests use this to simulate corruption)
    fn write_snapshot_payload(&self, payload: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO state_snapshot (id, payload, saved_at) VALUES (1, ?1, datetime('now'))",
                params![payload],
            )
            .context("Failed to save state snapshot")?;
        Ok(())
    }
}

impl StateStore for Database {
    fn load_snapshot(&self) -> Result<Option<StateSnapshot>> {
        let payload: Option<String> = self
            .conn
            .query_row("SELECT payload FROM state_snapshot WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .context("Failed to load state snapshot")?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        match serde_json::from_str(&payload) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                tracing::warn!("Ignoring malformed state snapshot: {}", e);
                Ok(None)
            }
        }
    }

    fn save_snapshot(&self, snapshot: &StateSnapshot) -> Result<()> {
        let payload = serde_json::to_string(snapshot).context("Failed to serialize snapshot")?;
        self.write_snapshot_payload(&payload)
    }

    fn load_hunk_cache(&self) -> Result<HashMap<String, Vec<Hunk>>> {
        let mut stmt = self.conn.prepare("SELECT path, hunks FROM hunk_cache")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut cache = HashMap::new();
        for row in rows {
            let (path, hunks) = row?;
            match serde_json::from_str::<Vec<Hunk>>(&hunks) {
                Ok(hunks) => {
                    cache.insert(path, hunks);
                }
                Err(e) => tracing::warn!("Skipping cached hunks for {}: {}", path, e),
            }
        }

        Ok(cache)
    }

    fn save_hunk_cache(&self, cache: &HashMap<String, Vec<Hunk>>) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to start transaction")?;

        tx.execute("DELETE FROM hunk_cache", [])?;
        for (path, hunks) in cache {
            let payload = serde_json::to_string(hunks)?;
            tx.execute(
                "INSERT INTO hunk_cache (path, hunks, updated_at) VALUES (?1, ?2, datetime('now'))",
                params![path, payload],
            )?;
        }

        tx.commit().context("Failed to save hunk cache")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.conn
            .execute_batch("DELETE FROM state_snapshot; DELETE FROM hunk_cache;")
            .context("Failed to clear state")?;
        Ok(())
    }

    fn data_version(&self) -> Result<i64> {
        self.conn
            .query_row("PRAGMA data_version", [], |row| row.get(0))
            .context("Failed to read database version")
    }
}
