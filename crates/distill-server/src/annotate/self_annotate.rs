// crates/distill-server/src/annotate/self_annotate.rs
// Rule-based annotation: instant, zero-dependency, coarse
//
// Derives a description, tags, and semantic group from tool-call
// metadata alone, then writes one summary entry for the turn. The rule
// engine cannot judge relevance, so every entry gets confidence 0.3 and
// low_relevance = false; the LLM pipeline may overwrite both later.

use anyhow::Result;
use rusqlite::Connection;

use crate::db::{self, AnnotationUpdate, CallSummary, Entry, EntryType};
use crate::retrieval::keywords;
use crate::utils::truncate;

/// Rule-engine confidence, uniform across entries.
const SELF_CONFIDENCE: f64 = 0.3;
/// Max length of inline values (paths, queries, commands) in descriptions.
const INLINE_MAX: usize = 72;
/// Keywords taken from the user prompt into every entry's tags.
const PROMPT_KEYWORD_LIMIT: usize = 5;
/// Descriptions included verbatim in the turn summary.
const SUMMARY_DESCRIPTIONS: usize = 3;

/// Shorten a deep path to its last three segments: `.../c/d/e.rs`.
pub fn short_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() > 3 {
        format!(".../{}", segments[segments.len() - 3..].join("/"))
    } else {
        path.to_string()
    }
}

fn inline(value: &str) -> String {
    truncate(value, INLINE_MAX)
}

fn find_call<'a>(calls: &'a [CallSummary], tools: &[&str]) -> Option<&'a CallSummary> {
    calls.iter().find(|c| tools.contains(&c.tool.as_str()))
}

/// Template-based description by entry type.
fn describe(entry: &Entry) -> String {
    let subject = entry.file_path.as_deref().unwrap_or("_unknown");
    let short = inline(&short_path(subject));
    let calls = &entry.tool_calls;

    match entry.entry_type {
        EntryType::FileChange => {
            let edits = calls
                .iter()
                .filter(|c| matches!(c.tool.as_str(), "Edit" | "NotebookEdit"))
                .count();
            if edits > 0 {
                format!(
                    "Modified {short} ({edits} edit{})",
                    if edits == 1 { "" } else { "s" }
                )
            } else if calls.iter().all(|c| c.tool == "Write") {
                format!("Created {short}")
            } else {
                format!("Changed {short}")
            }
        }
        EntryType::Research => {
            if let Some(search) = find_call(calls, &["Glob", "Grep"]) {
                let pattern = search.key.as_deref().unwrap_or(subject);
                format!("Searched for \"{}\"", inline(pattern))
            } else if find_call(calls, &["Read"]).is_some() {
                format!("Read {short}")
            } else if let Some(task) = find_call(calls, &["Task"]) {
                let what = task
                    .description
                    .as_deref()
                    .or(task.key.as_deref())
                    .unwrap_or(subject);
                format!("Subagent: {}", inline(what))
            } else {
                format!("Researched {short}")
            }
        }
        EntryType::Command => {
            let what = calls
                .first()
                .and_then(|c| c.description.as_deref().or(c.key.as_deref()))
                .unwrap_or(subject);
            format!("Ran: {}", inline(what))
        }
        EntryType::Web => {
            if let Some(search) = find_call(calls, &["WebSearch"]) {
                let query = search.key.as_deref().unwrap_or(subject);
                format!("Web search: {}", inline(query))
            } else {
                let url = calls.first().and_then(|c| c.key.as_deref()).unwrap_or(subject);
                format!("Fetched: {}", inline(url))
            }
        }
        EntryType::Summary => entry.description.clone().unwrap_or_default(),
    }
}

fn push_tag(tags: &mut Vec<String>, tag: &str) {
    let tag = tag.trim().to_lowercase();
    if !tag.is_empty() && !tags.contains(&tag) {
        tags.push(tag);
    }
}

/// Tag union: filename, extension, parent dir, entry type, tool names,
/// call-description keywords, first five prompt keywords.
fn derive_tags(entry: &Entry, user_prompt: &str) -> String {
    let mut tags: Vec<String> = Vec::new();

    if let Some(path) = entry.file_path.as_deref() {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if let Some(filename) = segments.last() {
            push_tag(&mut tags, filename);
            if let Some((_, ext)) = filename.rsplit_once('.')
                && !ext.is_empty()
            {
                push_tag(&mut tags, ext);
            }
        }
        if segments.len() >= 2 {
            push_tag(&mut tags, segments[segments.len() - 2]);
        }
    }

    push_tag(&mut tags, entry.entry_type.as_str());

    for call in &entry.tool_calls {
        push_tag(&mut tags, &call.tool);
        if let Some(description) = call.description.as_deref() {
            for word in keywords(description, PROMPT_KEYWORD_LIMIT) {
                push_tag(&mut tags, &word);
            }
        }
    }

    for word in keywords(user_prompt, PROMPT_KEYWORD_LIMIT) {
        push_tag(&mut tags, &word);
    }

    tags.join(",")
}

/// Semantic group: the immediate parent directory of the file path,
/// the sole segment when there is only one, else the entry type.
fn semantic_group_for(entry: &Entry) -> String {
    if let Some(path) = entry.file_path.as_deref() {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.len() {
            0 => {}
            1 => return segments[0].to_lowercase(),
            n => return segments[n - 2].to_lowercase(),
        }
    }
    entry.entry_type.as_str().to_string()
}

/// Annotate every pending entry of a turn and insert the turn summary.
/// Returns the number of entries annotated.
pub fn annotate_turn_sync(conn: &Connection, prompt_index: i64, user_prompt: &str) -> Result<usize> {
    let entries = db::get_pending_sync(conn, prompt_index)?;
    if entries.is_empty() {
        return Ok(0);
    }

    let mut descriptions: Vec<String> = Vec::new();
    let mut summary_tags: Vec<String> = Vec::new();

    for entry in &entries {
        let update = AnnotationUpdate {
            description: describe(entry),
            tags: derive_tags(entry, user_prompt),
            semantic_group: semantic_group_for(entry),
            related_files: Vec::new(),
            confidence: SELF_CONFIDENCE,
            low_relevance: false,
        };
        descriptions.push(update.description.clone());
        for tag in update.tags.split(',') {
            push_tag(&mut summary_tags, tag);
        }
        db::annotate_entry_sync(conn, entry.id, &update)?;
    }

    let summary = if descriptions.len() == 1 {
        descriptions[0].clone()
    } else {
        format!(
            "{} activities: {}...",
            descriptions.len(),
            descriptions
                .iter()
                .take(SUMMARY_DESCRIPTIONS)
                .cloned()
                .collect::<Vec<_>>()
                .join("; ")
        )
    };
    db::insert_summary_sync(conn, prompt_index, &summary, &summary_tags.join(","))?;

    Ok(entries.len())
}
