// crates/distill-server/src/hooks/post_tool.rs
// PostToolUse hook handler - buffers one tool call and returns
//
// This is the hottest hook, so it touches no database: one JSONL append
// to the session buffer and out.

use anyhow::Result;

use crate::buffer;
use crate::config::{DistillConfig, DistillPaths};
use crate::hooks::{HookTimer, distill_enabled, input_str, read_hook_input, write_empty_output};

/// PostToolUse hook input from the host
#[derive(Debug)]
struct PostToolInput {
    session_id: String,
    tool_name: String,
    tool_input: serde_json::Value,
}

impl PostToolInput {
    fn from_json(json: &serde_json::Value) -> Self {
        Self {
            session_id: input_str(json, "session_id"),
            tool_name: input_str(json, "tool_name"),
            tool_input: json
                .get("tool_input")
                .cloned()
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Run PostToolUse hook
pub async fn run() -> Result<()> {
    let _timer = HookTimer::start("PostToolUse");
    let input = read_hook_input()?;

    let paths = DistillPaths::resolve();
    let config = DistillConfig::load(&paths);
    if !distill_enabled(&input, &config) {
        write_empty_output();
        return Ok(());
    }

    let post_input = PostToolInput::from_json(&input);
    if post_input.session_id.is_empty() || post_input.tool_name.is_empty() {
        write_empty_output();
        return Ok(());
    }

    buffer::append_call(
        &paths.buffer_path(&post_input.session_id),
        &post_input.tool_name,
        &post_input.tool_input,
    )?;

    write_empty_output();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_input_parses_all_fields() {
        let input = PostToolInput::from_json(&serde_json::json!({
            "session_id": "sess-abc",
            "tool_name": "Edit",
            "tool_input": {"file_path": "/src/main.rs"}
        }));
        assert_eq!(input.session_id, "sess-abc");
        assert_eq!(input.tool_name, "Edit");
        assert_eq!(input.tool_input["file_path"], "/src/main.rs");
    }

    #[test]
    fn post_input_defaults_on_empty_json() {
        let input = PostToolInput::from_json(&serde_json::json!({}));
        assert!(input.session_id.is_empty());
        assert!(input.tool_name.is_empty());
        assert!(input.tool_input.is_null());
    }
}
