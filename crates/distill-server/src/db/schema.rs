// crates/distill-server/src/db/schema.rs
// Per-session database schema

use anyhow::Result;
use rusqlite::Connection;

/// Run all schema setup.
///
/// Called on every open; the statements are idempotent so first open
/// creates the schema and later opens are no-ops.
pub fn run_all_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Database schema SQL
///
/// `entries_fts` is a standalone FTS5 table (not content-synced): rows
/// are deleted and reinserted explicitly on annotation, with `fts_map`
/// keeping the rowid <-> entry id bijection. A content-synced table
/// cannot survive in-place mutation of its base rows without index
/// corruption, which is exactly what annotation does.
pub const SCHEMA: &str = r#"
-- =======================================
-- ENTRIES: logical units of activity
-- =======================================
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY,
    prompt_index INTEGER NOT NULL,
    file_path TEXT,                                 -- semantic key; NULL for summaries
    entry_type TEXT NOT NULL,                       -- file_change | research | command | web | summary
    tool_calls TEXT NOT NULL DEFAULT '[]',          -- JSON array of call summaries
    description TEXT,
    tags TEXT NOT NULL DEFAULT '',                  -- comma-separated, lowercased
    related_files TEXT NOT NULL DEFAULT '[]',       -- JSON array of paths
    semantic_group TEXT NOT NULL DEFAULT '',
    confidence REAL NOT NULL DEFAULT 0.0,
    low_relevance INTEGER NOT NULL DEFAULT 0,
    annotation_status TEXT NOT NULL DEFAULT 'pending',
    created_at INTEGER NOT NULL                     -- ms epoch
);
CREATE INDEX IF NOT EXISTS idx_entries_prompt ON entries(prompt_index);
CREATE INDEX IF NOT EXISTS idx_entries_status ON entries(annotation_status);
CREATE INDEX IF NOT EXISTS idx_entries_group ON entries(semantic_group);

-- =======================================
-- FULL-TEXT INDEX (standalone) + rowid map
-- =======================================
CREATE VIRTUAL TABLE IF NOT EXISTS entries_fts USING fts5(
    file_path,
    description,
    tags,
    semantic_group,
    tokenize = 'porter unicode61'
);

CREATE TABLE IF NOT EXISTS fts_map (
    fts_rowid INTEGER PRIMARY KEY,
    entry_id INTEGER NOT NULL UNIQUE REFERENCES entries(id)
);

-- =======================================
-- LINKS: directed typed edges between entries
-- =======================================
CREATE TABLE IF NOT EXISTS entry_links (
    id INTEGER PRIMARY KEY,
    source_id INTEGER NOT NULL REFERENCES entries(id),
    target_id INTEGER NOT NULL REFERENCES entries(id),
    link_type TEXT NOT NULL,                        -- depends_on | extends | reverts | related
    created_at INTEGER NOT NULL,
    UNIQUE(source_id, target_id, link_type)
);

-- =======================================
-- SESSION STATE: key/value scratchpad
-- =======================================
CREATE TABLE IF NOT EXISTS session_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER
);
"#;
