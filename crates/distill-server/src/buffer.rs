// crates/distill-server/src/buffer.rs
// Per-session append-only log of raw tool calls between Stop events
//
// `on-tool` appends one JSON line and returns; `on-stop` drains the
// whole file. The host serializes hooks for a session, so there is
// never more than one writer and the drain cannot race an append.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::utils::now_millis;

/// One buffered tool invocation, as written by `on-tool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferedCall {
    pub tool_name: String,
    pub tool_input: serde_json::Value,
    pub ts: i64,
}

/// Append one tool call to the session buffer, creating the file (and
/// its parent directory) on first use.
pub fn append_call(path: &Path, tool_name: &str, tool_input: &serde_json::Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let record = BufferedCall {
        tool_name: tool_name.to_string(),
        tool_input: tool_input.clone(),
        ts: now_millis(),
    };
    let line = serde_json::to_string(&record)?;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open buffer {}", path.display()))?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Drain the session buffer: read everything, truncate the file, then
/// parse the in-memory copy. Malformed lines are dropped silently; a
/// missing or empty file yields an empty batch.
///
/// Parsing happens after the read, on the in-memory copy, so a bad
/// line can only lose itself, never the whole batch.
pub fn drain(path: &Path) -> Result<Vec<BufferedCall>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }

    fs::write(path, "").with_context(|| format!("failed to truncate {}", path.display()))?;

    let calls = contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();
    Ok(calls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn append_then_drain_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("buffers").join("s1.jsonl");

        append_call(&path, "Read", &json!({"file_path": "src/a.rs"})).unwrap();
        append_call(&path, "Bash", &json!({"command": "ls"})).unwrap();

        let calls = drain(&path).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].tool_name, "Read");
        assert_eq!(calls[0].tool_input["file_path"], "src/a.rs");
        assert_eq!(calls[1].tool_name, "Bash");
        assert!(calls[0].ts > 0);
    }

    #[test]
    fn drain_truncates_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("s.jsonl");
        append_call(&path, "Read", &json!({})).unwrap();

        drain(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
        assert!(drain(&path).unwrap().is_empty());
    }

    #[test]
    fn drain_missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let calls = drain(&tmp.path().join("nope.jsonl")).unwrap();
        assert!(calls.is_empty());
    }

    #[test]
    fn drain_drops_malformed_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("s.jsonl");
        append_call(&path, "Read", &json!({"file_path": "x"})).unwrap();
        {
            let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(f, "{{ broken json").unwrap();
            writeln!(f).unwrap();
        }
        append_call(&path, "Bash", &json!({"command": "ls"})).unwrap();

        let calls = drain(&path).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].tool_name, "Read");
        assert_eq!(calls[1].tool_name, "Bash");
    }
}
