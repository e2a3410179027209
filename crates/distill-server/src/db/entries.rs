// crates/distill-server/src/db/entries.rs
// Entry CRUD and the FTS bijection discipline
//
// Every write that touches entries + entries_fts + fts_map runs inside
// a single transaction: a reader must never observe an entry without
// exactly one FTS row, including mid-annotation.

use anyhow::{Result, bail};
use rusqlite::{Connection, OptionalExtension, params};

use crate::utils::now_millis;

use super::types::{
    AnnotationStatus, AnnotationUpdate, CallSummary, Entry, EntryCounts, EntryType,
    HistoricalEntry,
};

/// Insert one FTS document for an entry and record the rowid mapping.
/// Must be called inside the caller's transaction.
fn index_entry(
    conn: &Connection,
    entry_id: i64,
    file_path: &str,
    description: &str,
    tags: &str,
    semantic_group: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO entries_fts (file_path, description, tags, semantic_group)
         VALUES (?1, ?2, ?3, ?4)",
        params![file_path, description, tags, semantic_group],
    )?;
    let fts_rowid = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO fts_map (fts_rowid, entry_id) VALUES (?1, ?2)",
        params![fts_rowid, entry_id],
    )?;
    Ok(())
}

/// Remove an entry's FTS document and mapping, if present.
/// Must be called inside the caller's transaction.
fn deindex_entry(conn: &Connection, entry_id: i64) -> rusqlite::Result<()> {
    let old_rowid: Option<i64> = conn
        .query_row(
            "SELECT fts_rowid FROM fts_map WHERE entry_id = ?1",
            params![entry_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(rowid) = old_rowid {
        conn.execute("DELETE FROM entries_fts WHERE rowid = ?1", params![rowid])?;
        conn.execute("DELETE FROM fts_map WHERE entry_id = ?1", params![entry_id])?;
    }
    Ok(())
}

/// Insert a new entry in `pending` state, with its initial FTS row.
/// Returns the entry id.
pub fn insert_entry_sync(
    conn: &Connection,
    prompt_index: i64,
    file_path: Option<&str>,
    entry_type: EntryType,
    calls: &[CallSummary],
) -> Result<i64> {
    let tool_calls = serde_json::to_string(calls)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO entries (prompt_index, file_path, entry_type, tool_calls, annotation_status, created_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
        params![prompt_index, file_path, entry_type.as_str(), tool_calls, now_millis()],
    )?;
    let id = tx.last_insert_rowid();
    index_entry(&tx, id, file_path.unwrap_or(""), "", "", "")?;
    tx.commit()?;
    Ok(id)
}

/// Insert a per-turn summary entry, pre-marked `annotated`.
/// Summaries bypass the pending state machine and index only
/// description + tags.
pub fn insert_summary_sync(
    conn: &Connection,
    prompt_index: i64,
    description: &str,
    tags: &str,
) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO entries (prompt_index, file_path, entry_type, description, tags,
                              semantic_group, confidence, annotation_status, created_at)
         VALUES (?1, NULL, 'summary', ?2, ?3, '', 1.0, 'annotated', ?4)",
        params![prompt_index, description, tags, now_millis()],
    )?;
    let id = tx.last_insert_rowid();
    index_entry(&tx, id, "", description, tags, "")?;
    tx.commit()?;
    Ok(id)
}

/// Apply an annotation to an entry and atomically reindex it.
///
/// Contract: update the entries row, delete the old FTS row by rowid,
/// delete the old map row, insert a fresh FTS row with the updated
/// fields, insert the new mapping. One transaction end to end; a crash
/// between delete and insert would otherwise leave the entry
/// FTS-invisible. Safe to reapply (delete-and-reinsert is idempotent).
pub fn annotate_entry_sync(conn: &Connection, id: i64, update: &AnnotationUpdate) -> Result<()> {
    let related_files = serde_json::to_string(&update.related_files)?;
    let tx = conn.unchecked_transaction()?;
    let changed = tx.execute(
        "UPDATE entries
         SET description = ?2, tags = ?3, semantic_group = ?4, related_files = ?5,
             confidence = ?6, low_relevance = ?7, annotation_status = 'annotated'
         WHERE id = ?1",
        params![
            id,
            update.description,
            update.tags,
            update.semantic_group,
            related_files,
            update.confidence,
            update.low_relevance as i64,
        ],
    )?;
    if changed == 0 {
        bail!("no entry with id {id}");
    }

    let file_path: Option<String> = tx.query_row(
        "SELECT file_path FROM entries WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;

    deindex_entry(&tx, id)?;
    index_entry(
        &tx,
        id,
        file_path.as_deref().unwrap_or(""),
        &update.description,
        &update.tags,
        &update.semantic_group,
    )?;
    tx.commit()?;
    Ok(())
}

/// Move a set of entries to `annotating`.
pub fn mark_annotating_sync(conn: &Connection, ids: &[i64]) -> rusqlite::Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "UPDATE entries SET annotation_status = 'annotating' WHERE id IN ({placeholders})"
    );
    conn.execute(&sql, rusqlite::params_from_iter(ids.iter()))?;
    Ok(())
}

/// Mark every pending/annotating entry of a turn as `failed`.
/// Returns the number of entries affected.
pub fn mark_failed_sync(conn: &Connection, prompt_index: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE entries SET annotation_status = 'failed'
         WHERE prompt_index = ?1 AND annotation_status IN ('pending', 'annotating')",
        params![prompt_index],
    )
}

/// Move a single entry to a new annotation status.
pub fn set_status_sync(
    conn: &Connection,
    id: i64,
    status: AnnotationStatus,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE entries SET annotation_status = ?2 WHERE id = ?1",
        params![id, status.as_str()],
    )?;
    Ok(())
}

const ENTRY_COLUMNS: &str = "id, prompt_index, file_path, entry_type, tool_calls, description, \
     tags, related_files, semantic_group, confidence, low_relevance, annotation_status, created_at";

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<Entry> {
    let entry_type: String = row.get(3)?;
    let tool_calls: String = row.get(4)?;
    let related_files: String = row.get(7)?;
    let status: String = row.get(11)?;
    Ok(Entry {
        id: row.get(0)?,
        prompt_index: row.get(1)?,
        file_path: row.get(2)?,
        entry_type: EntryType::from_str(&entry_type).unwrap_or(EntryType::Research),
        tool_calls: serde_json::from_str(&tool_calls).unwrap_or_default(),
        description: row.get(5)?,
        tags: row.get(6)?,
        related_files: serde_json::from_str(&related_files).unwrap_or_default(),
        semantic_group: row.get(8)?,
        confidence: row.get(9)?,
        low_relevance: row.get::<_, i64>(10)? != 0,
        annotation_status: AnnotationStatus::from_str(&status).unwrap_or(AnnotationStatus::Failed),
        created_at: row.get(12)?,
    })
}

/// Entries of a turn still awaiting annotation (pending or annotating).
pub fn get_pending_sync(conn: &Connection, prompt_index: i64) -> rusqlite::Result<Vec<Entry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM entries
         WHERE prompt_index = ?1
           AND annotation_status IN ('pending', 'annotating')
           AND entry_type != 'summary'
         ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![prompt_index], row_to_entry)?;
    rows.collect()
}

/// Most recent failed entries across the session, for the retry channel.
pub fn get_failed_sync(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<Entry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM entries
         WHERE annotation_status = 'failed'
         ORDER BY id DESC
         LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit as i64], row_to_entry)?;
    rows.collect()
}

/// Metadata of recent annotated entries before a turn, newest first.
/// Summaries are excluded; they would drown the activity metadata.
pub fn get_historical_sync(
    conn: &Connection,
    before_prompt: i64,
    limit: usize,
) -> rusqlite::Result<Vec<HistoricalEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, prompt_index, file_path, description, tags, semantic_group
         FROM entries
         WHERE prompt_index < ?1
           AND annotation_status = 'annotated'
           AND entry_type != 'summary'
         ORDER BY prompt_index DESC, id DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![before_prompt, limit as i64], |row| {
        Ok(HistoricalEntry {
            id: row.get(0)?,
            prompt_index: row.get(1)?,
            file_path: row.get(2)?,
            description: row.get(3)?,
            tags: row.get(4)?,
            semantic_group: row.get(5)?,
        })
    })?;
    rows.collect()
}

/// Description of the summary entry for a turn, if one exists.
pub fn get_summary_sync(conn: &Connection, prompt_index: i64) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT description FROM entries
         WHERE entry_type = 'summary' AND prompt_index = ?1
         ORDER BY id DESC
         LIMIT 1",
        params![prompt_index],
        |row| row.get(0),
    )
    .optional()
    .map(Option::flatten)
}

/// Load one entry by id.
pub fn get_entry_sync(conn: &Connection, id: i64) -> rusqlite::Result<Option<Entry>> {
    conn.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1"),
        params![id],
        row_to_entry,
    )
    .optional()
}

/// Most recent entries, for `inspect`.
pub fn get_recent_entries_sync(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<Entry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM entries ORDER BY id DESC LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit as i64], row_to_entry)?;
    rows.collect()
}

/// Per-status entry counts for `status`.
pub fn get_counts_sync(conn: &Connection) -> rusqlite::Result<EntryCounts> {
    conn.query_row(
        "SELECT COUNT(*),
                SUM(annotation_status = 'pending'),
                SUM(annotation_status = 'annotating'),
                SUM(annotation_status = 'annotated'),
                SUM(annotation_status = 'failed'),
                SUM(entry_type = 'summary')
         FROM entries",
        [],
        |row| {
            Ok(EntryCounts {
                total: row.get(0)?,
                pending: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                annotating: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                annotated: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                failed: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                summaries: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
            })
        },
    )
}

/// Count (entries without FTS row, map rows without entry) orphans.
/// Both must always be zero; exposed for invariant checks.
pub fn fts_orphans_sync(conn: &Connection) -> rusqlite::Result<(i64, i64)> {
    let missing: i64 = conn.query_row(
        "SELECT COUNT(*) FROM entries e
         WHERE NOT EXISTS (SELECT 1 FROM fts_map m WHERE m.entry_id = e.id)",
        [],
        |row| row.get(0),
    )?;
    let dangling: i64 = conn.query_row(
        "SELECT COUNT(*) FROM fts_map m
         WHERE NOT EXISTS (SELECT 1 FROM entries e WHERE e.id = m.entry_id)",
        [],
        |row| row.get(0),
    )?;
    Ok((missing, dangling))
}
