// crates/distill-server/src/llm/provider.rs
// Provider variants: two wire shapes, one operation

use serde::Deserialize;
use std::fmt;

/// LLM provider wire shapes.
///
/// The annotation pipeline needs exactly one operation,
/// `annotate(system, user) -> text`, so providers are a flat variant
/// rather than a trait hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Anthropic messages API.
    #[default]
    Anthropic,
    /// OpenAI-style chat-completions API (also covers compatible gateways).
    #[serde(rename = "openai")]
    OpenAiCompat,
}

impl Provider {
    /// Parse provider from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "anthropic" => Some(Self::Anthropic),
            "openai" => Some(Self::OpenAiCompat),
            _ => None,
        }
    }

    /// Default endpoint base URL for this provider
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com",
            Self::OpenAiCompat => "https://api.openai.com/v1",
        }
    }

    /// Default model for this provider
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::OpenAiCompat => "gpt-4o-mini",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenAiCompat => write!(f, "openai"),
        }
    }
}
