// crates/distill-server/src/grouper.rs
// Fold a turn's buffered tool calls into logical entries
//
// File tools group by their path key (reads and edits of one file make
// one entry); everything else becomes a standalone entry. Planning and
// task-list tools carry no recall value and are dropped outright.

use anyhow::Result;
use rusqlite::Connection;

use crate::buffer::BufferedCall;
use crate::db::{self, CallSummary, EntryType};
use crate::utils::truncate;

/// Tools excluded from recording entirely.
const IGNORED_TOOLS: &[&str] = &[
    "EnterPlanMode",
    "ExitPlanMode",
    "AskUserQuestion",
    "TodoRead",
    "TodoWrite",
    "TaskCreate",
    "TaskUpdate",
    "TaskList",
    "TaskGet",
];

/// Tools grouped by their path key.
const FILE_TOOLS: &[&str] = &["Read", "Write", "Edit", "Glob", "Grep", "NotebookEdit"];

/// Subset of file tools that mutate the file.
const WRITE_TOOLS: &[&str] = &["Write", "Edit", "NotebookEdit"];

/// Max stored length of a key-field value.
const KEY_MAX: usize = 300;
/// Max stored length of tool-specific extras (edit strings, descriptions).
const EXTRA_MAX: usize = 200;

/// The key field carrying each tool's semantic identity.
fn key_field(tool: &str) -> &'static str {
    match tool {
        "Read" | "Write" | "Edit" => "file_path",
        "NotebookEdit" => "notebook_path",
        "Glob" | "Grep" => "pattern",
        "Bash" => "command",
        "WebSearch" => "query",
        "WebFetch" => "url",
        "Task" => "prompt",
        _ => "",
    }
}

pub fn is_file_tool(tool: &str) -> bool {
    FILE_TOOLS.contains(&tool)
}

pub fn is_write_tool(tool: &str) -> bool {
    WRITE_TOOLS.contains(&tool)
}

fn is_ignored(tool: &str) -> bool {
    IGNORED_TOOLS.contains(&tool)
}

/// A grouped unit ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedEntry {
    /// Path key for file groups; pattern/URL/command for standalone tools.
    pub file_path: String,
    pub entry_type: EntryType,
    pub calls: Vec<CallSummary>,
}

fn str_field(input: &serde_json::Value, field: &str) -> Option<String> {
    input.get(field).and_then(|v| v.as_str()).map(String::from)
}

/// Compact a raw call down to what retrieval and annotation need:
/// the tool name, the key-field value, and a few tool-specific extras.
fn summarize_call(call: &BufferedCall) -> CallSummary {
    let mut summary = CallSummary::new(call.tool_name.clone());

    let field = key_field(&call.tool_name);
    if !field.is_empty() {
        summary.key = str_field(&call.tool_input, field).map(|v| truncate(&v, KEY_MAX));
    }

    match call.tool_name.as_str() {
        "Edit" => {
            summary.old_string =
                str_field(&call.tool_input, "old_string").map(|v| truncate(&v, EXTRA_MAX));
            summary.new_string =
                str_field(&call.tool_input, "new_string").map(|v| truncate(&v, EXTRA_MAX));
        }
        "Grep" => {
            summary.glob = str_field(&call.tool_input, "glob");
            summary.path = str_field(&call.tool_input, "path");
        }
        "Bash" | "Task" => {
            summary.description =
                str_field(&call.tool_input, "description").map(|v| truncate(&v, EXTRA_MAX));
        }
        _ => {}
    }

    summary
}

/// Entry type for a standalone (non-file) tool.
fn classify_standalone(tool: &str) -> EntryType {
    match tool {
        "Bash" => EntryType::Command,
        "WebSearch" | "WebFetch" => EntryType::Web,
        _ => EntryType::Research,
    }
}

/// Fold an ordered batch of buffered calls into logical entries.
///
/// Deterministic: entries appear in first-occurrence order, and group
/// members preserve input order.
pub fn group_calls(calls: &[BufferedCall]) -> Vec<GroupedEntry> {
    let mut groups: Vec<GroupedEntry> = Vec::new();
    // Index into `groups` per file key, so repeated touches of the same
    // file fold into one entry.
    let mut key_index: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for call in calls {
        if is_ignored(&call.tool_name) {
            continue;
        }
        let summary = summarize_call(call);

        if is_file_tool(&call.tool_name) {
            let key = summary.key.clone().unwrap_or_else(|| "_unknown".to_string());
            match key_index.get(&key) {
                Some(&idx) => {
                    if is_write_tool(&call.tool_name) {
                        groups[idx].entry_type = EntryType::FileChange;
                    }
                    groups[idx].calls.push(summary);
                }
                None => {
                    let entry_type = if is_write_tool(&call.tool_name) {
                        EntryType::FileChange
                    } else {
                        EntryType::Research
                    };
                    key_index.insert(key.clone(), groups.len());
                    groups.push(GroupedEntry {
                        file_path: key,
                        entry_type,
                        calls: vec![summary],
                    });
                }
            }
        } else {
            groups.push(GroupedEntry {
                file_path: summary.key.clone().unwrap_or_default(),
                entry_type: classify_standalone(&call.tool_name),
                calls: vec![summary],
            });
        }
    }

    groups
}

/// Group a drained buffer and insert the resulting entries for a turn.
/// Returns the new entry ids in insertion order.
pub fn flush_turn_sync(
    conn: &Connection,
    prompt_index: i64,
    calls: &[BufferedCall],
) -> Result<Vec<i64>> {
    let mut ids = Vec::new();
    for group in group_calls(calls) {
        let id = db::insert_entry_sync(
            conn,
            prompt_index,
            Some(&group.file_path),
            group.entry_type,
            &group.calls,
        )?;
        ids.push(id);
    }
    Ok(ids)
}
