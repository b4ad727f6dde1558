//! Database schema definition

/// SQL schema for the changelist state database
pub const SCHEMA: &str = r#"
-- Persisted changelists and assignments, stored as one JSON document
CREATE TABLE IF NOT EXISTS state_snapshot (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    payload TEXT NOT NULL,
    saved_at TEXT NOT NULL
);

-- Hunks seen by the last refresh, used to detect shifted hunks across runs
CREATE TABLE IF NOT EXISTS hunk_cache (
    path TEXT PRIMARY KEY,
    hunks TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;
