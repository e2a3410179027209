// crates/distill-server/src/config/file.rs
// File-based configuration from ~/.distill/config.json

use crate::config::paths::DistillPaths;
use crate::llm::Provider;
use serde::Deserialize;
use tracing::{debug, warn};

/// Which annotation pipeline runs after each turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum AnnotatorMode {
    /// Rule-based annotation, synchronous, no network.
    #[default]
    #[serde(rename = "self")]
    SelfRules,
    /// LLM enrichment in a detached background process.
    #[serde(rename = "haiku")]
    Haiku,
}

/// Top-level config structure (camelCase keys on disk).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DistillConfig {
    pub annotator: AnnotatorMode,
    pub provider: Provider,
    pub api_base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub token_budget: usize,
    pub enabled: bool,
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self {
            annotator: AnnotatorMode::SelfRules,
            provider: Provider::Anthropic,
            api_base_url: None,
            api_key: None,
            model: None,
            token_budget: 4000,
            enabled: true,
        }
    }
}

impl DistillConfig {
    /// Load config from `<root>/config.json`.
    ///
    /// A missing or unparseable file falls back to defaults; a broken
    /// config must never take the hook path down.
    pub fn load(paths: &DistillPaths) -> Self {
        let path = paths.config_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        }
    }

    /// Resolve the API key: config value first, then the
    /// `DISTILL_API_KEY` and `ANTHROPIC_API_KEY` environment fallbacks.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| read_key_env("DISTILL_API_KEY"))
            .or_else(|| read_key_env("ANTHROPIC_API_KEY"))
    }

    /// Provider base URL, defaulted per provider when unset.
    pub fn base_url(&self) -> String {
        self.api_base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_base_url().to_string())
    }

    /// Model name, defaulted per provider when unset.
    pub fn model_name(&self) -> String {
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }
}

/// Read an API key from the environment, filtering empty values.
fn read_key_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|k| !k.trim().is_empty())
}
