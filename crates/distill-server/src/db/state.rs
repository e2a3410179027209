// crates/distill-server/src/db/state.rs
// Session state scratchpad: prompt index + raw prompt texts

use rusqlite::{Connection, OptionalExtension, params};

use crate::utils::now_millis;

const PROMPT_INDEX_KEY: &str = "prompt_index";

pub fn get_state_sync(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM session_state WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_state_sync(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO session_state (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, now_millis()],
    )?;
    Ok(())
}

/// Current prompt index; 0 before the first prompt of the session.
pub fn get_prompt_index_sync(conn: &Connection) -> rusqlite::Result<i64> {
    Ok(get_state_sync(conn, PROMPT_INDEX_KEY)?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

pub fn set_prompt_index_sync(conn: &Connection, index: i64) -> rusqlite::Result<()> {
    set_state_sync(conn, PROMPT_INDEX_KEY, &index.to_string())
}

/// Persist the raw user prompt text for a turn under `prompt_<N>`.
pub fn store_prompt_sync(conn: &Connection, index: i64, text: &str) -> rusqlite::Result<()> {
    set_state_sync(conn, &format!("prompt_{index}"), text)
}

pub fn get_prompt_sync(conn: &Connection, index: i64) -> rusqlite::Result<Option<String>> {
    get_state_sync(conn, &format!("prompt_{index}"))
}
