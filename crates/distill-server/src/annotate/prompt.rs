// crates/distill-server/src/annotate/prompt.rs
// Fixed system prompt, user message assembly, and response parsing
// for the LLM annotation pass

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::db::{CallSummary, Entry, HistoricalEntry};

/// System prompt: pins the exact JSON response schema. The model is
/// told to annotate every entry it is given; ids missing from the
/// response are marked failed by the caller.
pub const SYSTEM_PROMPT: &str = r#"You annotate recorded coding-assistant activity so it can be retrieved in later turns of the same session.

You receive the user's prompt for this turn, the turn's recorded entries (with their raw tool calls), recent historical entries (metadata only), and possibly entries from earlier turns that still need annotation.

Respond with a single JSON object and nothing else, following exactly this schema:

{
  "annotations": [
    {
      "id": <entry id>,
      "description": "<1-2 sentence summary of what this activity did>",
      "tags": ["<lowercase keyword>", ...],
      "semantic_group": "<short-kebab-case-label>",
      "related_files": ["<path>", ...],
      "confidence": <0.0-1.0>,
      "low_relevance": <true if this entry is noise not worth retrieving>
    }
  ],
  "links": [
    {"source_id": <id>, "target_id": <id>, "link_type": "depends_on" | "extends" | "reverts" | "related"}
  ],
  "prompt_summary": {
    "description": "<one sentence describing what this turn accomplished>",
    "tags": ["<keyword>", ...]
  }
}

Rules:
- Include one annotation for every entry id you were given, including retry entries.
- Use the same semantic_group for entries belonging to the same work-stream, reusing groups from the historical entries where they fit.
- Only add links you are confident about; links may point at historical entry ids.
- Do not wrap the JSON in markdown fences or commentary."#;

/// Reduced view of a current/retry entry for the model: id, key, type,
/// and the full recorded tool calls.
#[derive(Serialize)]
struct EntryView<'a> {
    id: i64,
    prompt_index: i64,
    file_path: Option<&'a str>,
    entry_type: &'a str,
    tool_calls: &'a [CallSummary],
}

impl<'a> EntryView<'a> {
    fn from_entry(entry: &'a Entry) -> Self {
        Self {
            id: entry.id,
            prompt_index: entry.prompt_index,
            file_path: entry.file_path.as_deref(),
            entry_type: entry.entry_type.as_str(),
            tool_calls: &entry.tool_calls,
        }
    }
}

/// Assemble the single user message: each block wrapped in XML-style
/// delimiters so the model can tell the sections apart.
pub fn build_user_message(
    user_prompt: &str,
    current: &[Entry],
    historical: &[HistoricalEntry],
    retries: &[Entry],
) -> Result<String> {
    let current_views: Vec<EntryView> = current.iter().map(EntryView::from_entry).collect();
    let retry_views: Vec<EntryView> = retries.iter().map(EntryView::from_entry).collect();

    let mut message = String::new();
    message.push_str("<user_prompt>\n");
    message.push_str(user_prompt);
    message.push_str("\n</user_prompt>\n\n");

    message.push_str("<current_entries>\n");
    message.push_str(&serde_json::to_string_pretty(&current_views)?);
    message.push_str("\n</current_entries>\n");

    if !historical.is_empty() {
        message.push_str("\n<historical_entries>\n");
        message.push_str(&serde_json::to_string_pretty(historical)?);
        message.push_str("\n</historical_entries>\n");
    }

    if !retry_views.is_empty() {
        message.push_str("\n<retry_entries>\n");
        message.push_str(&serde_json::to_string_pretty(&retry_views)?);
        message.push_str("\n</retry_entries>\n");
    }

    Ok(message)
}

// ── Response types ──

#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationResponse {
    #[serde(default)]
    pub annotations: Vec<EntryAnnotation>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
    #[serde(default)]
    pub prompt_summary: Option<PromptSummary>,
}

fn default_confidence() -> f64 {
    0.5
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntryAnnotation {
    pub id: i64,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub semantic_group: String,
    #[serde(default)]
    pub related_files: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub low_relevance: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkSpec {
    pub source_id: i64,
    pub target_id: i64,
    pub link_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptSummary {
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Strip an optional Markdown code fence (``` or ```json) around the body.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") up to the first newline
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse the provider's response text into the typed schema.
pub fn parse_response(raw: &str) -> Result<AnnotationResponse> {
    let body = strip_code_fences(raw);
    serde_json::from_str(body).context("annotation response did not match the expected schema")
}
