// crates/distill-server/src/db/types.rs
// Typed model for entries, links, and call summaries

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entry kinds produced by the grouper (plus per-turn summaries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    FileChange,
    Research,
    Command,
    Web,
    Summary,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileChange => "file_change",
            Self::Research => "research",
            Self::Command => "command",
            Self::Web => "web",
            Self::Summary => "summary",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "file_change" => Some(Self::FileChange),
            "research" => Some(Self::Research),
            "command" => Some(Self::Command),
            "web" => Some(Self::Web),
            "summary" => Some(Self::Summary),
            _ => None,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Annotation state machine: pending -> annotating -> annotated | failed.
/// Failed entries re-enter the next turn's annotation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationStatus {
    Pending,
    Annotating,
    Annotated,
    Failed,
}

impl AnnotationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Annotating => "annotating",
            Self::Annotated => "annotated",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "annotating" => Some(Self::Annotating),
            "annotated" => Some(Self::Annotated),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for AnnotationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed, typed edge between two entries in the same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    DependsOn,
    Extends,
    Reverts,
    Related,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DependsOn => "depends_on",
            Self::Extends => "extends",
            Self::Reverts => "reverts",
            Self::Related => "related",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "depends_on" => Some(Self::DependsOn),
            "extends" => Some(Self::Extends),
            "reverts" => Some(Self::Reverts),
            "related" => Some(Self::Related),
            _ => None,
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compact record of one tool call, as stored in the entry's
/// `tool_calls` JSON column. `key` holds the tool's key-field value
/// (file path, pattern, command, query, url, or subagent prompt); the
/// remaining fields are tool-specific extras, everything else from the
/// raw input is discarded to keep storage compact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSummary {
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CallSummary {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            key: None,
            old_string: None,
            new_string: None,
            glob: None,
            path: None,
            description: None,
        }
    }
}

/// One logical unit of recorded activity within a prompt turn.
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: i64,
    pub prompt_index: i64,
    pub file_path: Option<String>,
    pub entry_type: EntryType,
    pub tool_calls: Vec<CallSummary>,
    pub description: Option<String>,
    pub tags: String,
    pub related_files: Vec<String>,
    pub semantic_group: String,
    pub confidence: f64,
    pub low_relevance: bool,
    pub annotation_status: AnnotationStatus,
    pub created_at: i64,
}

/// Metadata-only view of an annotated entry, used as historical context
/// in the LLM annotation prompt.
#[derive(Debug, Clone, Serialize)]
pub struct HistoricalEntry {
    pub id: i64,
    pub prompt_index: i64,
    pub file_path: Option<String>,
    pub description: Option<String>,
    pub tags: String,
    pub semantic_group: String,
}

/// Fields applied to an entry by either annotation pipeline.
#[derive(Debug, Clone)]
pub struct AnnotationUpdate {
    pub description: String,
    pub tags: String,
    pub semantic_group: String,
    pub related_files: Vec<String>,
    pub confidence: f64,
    pub low_relevance: bool,
}

/// Link row as stored.
#[derive(Debug, Clone)]
pub struct EntryLink {
    pub source_id: i64,
    pub target_id: i64,
    pub link_type: LinkType,
}

/// Per-status entry counts for the `status` command.
#[derive(Debug, Clone, Default)]
pub struct EntryCounts {
    pub total: i64,
    pub pending: i64,
    pub annotating: i64,
    pub annotated: i64,
    pub failed: i64,
    pub summaries: i64,
}
