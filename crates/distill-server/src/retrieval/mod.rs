// crates/distill-server/src/retrieval/mod.rs
// Prompt-time retrieval: tokenize, BM25 search, group expansion,
// token-budgeted context assembly
//
// BM25 supplies lexical recall; semantic-group expansion surfaces
// coherent work-streams that don't match the current prompt's tokens;
// the previous turn's summary provides continuity even when lexical
// recall fails entirely.

use anyhow::Result;
use rusqlite::{Connection, params};

use crate::db;

/// 1 token is approximated as 4 chars for budgeting.
const CHARS_PER_TOKEN: usize = 4;
/// BM25 result cap before budgeting.
const SEARCH_LIMIT: usize = 50;
/// Max query terms taken from the prompt.
const MAX_QUERY_TERMS: usize = 16;
/// Extra entries pulled per seen semantic group.
const GROUP_EXPANSION_LIMIT: usize = 3;

/// English function words plus coding verbs too common to discriminate.
/// Shared with the self-annotator's keyword extraction.
pub const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "day", "get", "has", "him", "his", "how", "man", "new", "now", "old", "see",
    "two", "way", "who", "did", "its", "let", "put", "say", "she", "too", "use", "that", "with",
    "have", "this", "will", "your", "from", "they", "know", "want", "been", "good", "much",
    "some", "time", "very", "when", "come", "here", "just", "like", "long", "make", "many",
    "more", "only", "over", "such", "take", "than", "them", "well", "were", "what", "about",
    "after", "again", "also", "back", "because", "before", "being", "between", "both", "could",
    "does", "doing", "down", "each", "even", "first", "into", "then", "there", "these", "thing",
    "think", "should", "would", "please", "need", "needs", "using", "where", "which", "while",
    // Common coding-session verbs: present in nearly every prompt
    "add", "fix", "change", "update", "create", "delete", "remove", "check", "look", "find",
    "show", "run", "test", "write", "read", "file", "code", "help",
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Extract lowercased alphanumeric keywords of length > 2, stopwords
/// removed, first-occurrence order, capped at `limit`.
pub fn keywords(text: &str, limit: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for token in lowered.split(|c: char| !c.is_ascii_alphanumeric()) {
        if token.len() <= 2 || is_stopword(token) {
            continue;
        }
        if seen.insert(token.to_string()) {
            out.push(token.to_string());
            if out.len() >= limit {
                break;
            }
        }
    }
    out
}

/// Build the FTS MATCH expression from a raw prompt.
///
/// Lowercase; anything outside `[A-Za-z0-9_/.-]` becomes a space;
/// tokens of length <= 2 and stopwords are dropped; the first 16
/// survivors are double-quoted (exact-term match, no FTS operators)
/// and OR-joined. Returns None when nothing survives.
pub fn build_match_query(prompt: &str) -> Option<String> {
    let cleaned: String = prompt
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '/' | '.' | '-') {
                c
            } else {
                ' '
            }
        })
        .collect();

    let terms: Vec<String> = cleaned
        .split_whitespace()
        .filter(|t| t.len() > 2 && !is_stopword(t))
        .take(MAX_QUERY_TERMS)
        // Embedded quotes cannot appear (stripped above), so plain
        // quoting is safe against FTS syntax injection.
        .map(|t| format!("\"{t}\""))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// One retrieval hit, enough to format a context line.
#[derive(Debug, Clone)]
pub struct RetrievedEntry {
    pub id: i64,
    pub prompt_index: i64,
    pub file_path: Option<String>,
    pub entry_type: String,
    pub semantic_group: String,
    pub description: Option<String>,
}

fn row_to_retrieved(row: &rusqlite::Row) -> rusqlite::Result<RetrievedEntry> {
    Ok(RetrievedEntry {
        id: row.get(0)?,
        prompt_index: row.get(1)?,
        file_path: row.get(2)?,
        entry_type: row.get(3)?,
        semantic_group: row.get(4)?,
        description: row.get(5)?,
    })
}

/// BM25 search joined back to entries through the rowid map.
///
/// Only annotated, relevant entries from earlier turns are candidates;
/// rank ascending is best-first for FTS5.
pub fn search_entries_sync(
    conn: &Connection,
    match_query: &str,
    current_index: i64,
    limit: usize,
) -> rusqlite::Result<Vec<RetrievedEntry>> {
    let mut stmt = conn.prepare(
        "SELECT e.id, e.prompt_index, e.file_path, e.entry_type, e.semantic_group, e.description
         FROM entries_fts f
         JOIN fts_map m ON f.rowid = m.fts_rowid
         JOIN entries e ON e.id = m.entry_id
         WHERE entries_fts MATCH ?1
           AND e.low_relevance = 0
           AND e.annotation_status = 'annotated'
           AND e.prompt_index < ?2
         ORDER BY rank
         LIMIT ?3",
    )?;
    let rows = stmt.query_map(
        params![match_query, current_index, limit as i64],
        row_to_retrieved,
    )?;
    rows.collect()
}

/// Recent annotated entries sharing a semantic group, newest first.
pub fn entries_in_group_sync(
    conn: &Connection,
    group: &str,
    current_index: i64,
    limit: usize,
) -> rusqlite::Result<Vec<RetrievedEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, prompt_index, file_path, entry_type, semantic_group, description
         FROM entries
         WHERE semantic_group = ?1
           AND low_relevance = 0
           AND annotation_status = 'annotated'
           AND entry_type != 'summary'
           AND prompt_index < ?2
         ORDER BY prompt_index DESC, id DESC
         LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![group, current_index, limit as i64], row_to_retrieved)?;
    rows.collect()
}

fn format_line(entry: &RetrievedEntry) -> Option<String> {
    let description = entry.description.as_deref().filter(|d| !d.is_empty())?;
    let subject = entry
        .file_path
        .as_deref()
        .filter(|p| !p.is_empty())
        .unwrap_or(&entry.entry_type);
    Some(format!(
        "[Prompt {}]: {} ({}) \u{2014} {}",
        entry.prompt_index, subject, entry.semantic_group, description
    ))
}

/// Assemble the context block for a new prompt.
///
/// Returns None when there is nothing to inject. The assembled
/// `<relevant_context>` body never exceeds `token_budget * 4` chars and
/// truncates at line boundaries.
pub fn build_context_sync(
    conn: &Connection,
    prompt: &str,
    current_index: i64,
    token_budget: usize,
) -> Result<Option<String>> {
    // Previous-turn continuity, included unconditionally when present.
    let last_activity = db::get_summary_sync(conn, current_index - 1)?;

    let budget = token_budget * CHARS_PER_TOKEN;
    let mut lines: Vec<String> = Vec::new();
    let mut used = 0usize;
    let mut selected: Vec<i64> = Vec::new();
    let mut seen_groups: Vec<String> = Vec::new();

    if let Some(match_query) = build_match_query(prompt) {
        let hits = search_entries_sync(conn, &match_query, current_index, SEARCH_LIMIT)?;
        for hit in &hits {
            let Some(line) = format_line(hit) else {
                continue;
            };
            if used + line.len() > budget {
                break;
            }
            used += line.len();
            lines.push(line);
            selected.push(hit.id);
            if !hit.semantic_group.is_empty() && !seen_groups.contains(&hit.semantic_group) {
                seen_groups.push(hit.semantic_group.clone());
            }
        }

        // Pull a few more entries from each work-stream the hits touched.
        for group in &seen_groups {
            let extra = entries_in_group_sync(
                conn,
                group,
                current_index,
                GROUP_EXPANSION_LIMIT + selected.len(),
            )?;
            let mut added = 0;
            for hit in extra {
                if added >= GROUP_EXPANSION_LIMIT {
                    break;
                }
                if selected.contains(&hit.id) {
                    continue;
                }
                let Some(line) = format_line(&hit) else {
                    continue;
                };
                if used + line.len() > budget {
                    break;
                }
                used += line.len();
                lines.push(line);
                selected.push(hit.id);
                added += 1;
            }
        }
    }

    let mut sections: Vec<String> = Vec::new();
    if let Some(summary) = last_activity.filter(|s| !s.is_empty()) {
        sections.push(format!("<last_activity>{summary}</last_activity>"));
    }
    if !lines.is_empty() {
        sections.push(format!(
            "<relevant_context>\n{}\n</relevant_context>",
            lines.join("\n")
        ));
    }

    if sections.is_empty() {
        return Ok(None);
    }
    Ok(Some(format!(
        "<distilled_session_context>\n{}\n</distilled_session_context>",
        sections.join("\n")
    )))
}
