// crates/distill-server/src/llm/client.rs
// Annotation client: one operation, two wire shapes

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::config::DistillConfig;
use crate::llm::{LlmHttpClient, Provider};

/// Output cap for the annotation response
const MAX_TOKENS: u32 = 4096;
/// Anthropic messages API version header
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for the annotation call: `annotate(system, user) -> text`.
pub struct AnnotationClient {
    provider: Provider,
    base_url: String,
    api_key: String,
    model: String,
    http: LlmHttpClient,
}

impl AnnotationClient {
    /// Build a client from config. Fails when no API key can be resolved;
    /// that failure stays inside the detached annotator process.
    pub fn from_config(config: &DistillConfig) -> Result<Self> {
        let api_key = config
            .resolved_api_key()
            .context("no API key configured (set apiKey, DISTILL_API_KEY, or ANTHROPIC_API_KEY)")?;
        Ok(Self {
            provider: config.provider,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            api_key,
            model: config.model_name(),
            http: LlmHttpClient::new(),
        })
    }

    /// Send one system + user message pair, return the response text.
    pub async fn annotate(&self, system: &str, user: &str) -> Result<String> {
        match self.provider {
            Provider::Anthropic => self.annotate_anthropic(system, user).await,
            Provider::OpenAiCompat => self.annotate_openai(system, user).await,
        }
    }

    async fn annotate_openai(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };
        let body = serde_json::to_string(&request)?;
        let url = format!("{}/chat/completions", self.base_url);

        let raw = self
            .http
            .execute_request_with_retry("annotate", body, |client, body| {
                client
                    .post(url.as_str())
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .header("Content-Type", "application/json")
                    .body(body)
            })
            .await?;

        parse_chat_response(&raw)
    }

    async fn annotate_anthropic(&self, system: &str, user: &str) -> Result<String> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![ChatMessage {
                role: "user",
                content: user,
            }],
        };
        let body = serde_json::to_string(&request)?;
        let url = format!("{}/v1/messages", self.base_url);

        let raw = self
            .http
            .execute_request_with_retry("annotate", body, |client, body| {
                client
                    .post(url.as_str())
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .header("Content-Type", "application/json")
                    .body(body)
            })
            .await?;

        parse_messages_response(&raw)
    }
}

// ── OpenAI-compatible wire types ──

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Parse an OpenAI-compatible chat response: `choices[0].message.content`.
fn parse_chat_response(response_body: &str) -> Result<String> {
    let data: ChatResponse = serde_json::from_str(response_body)
        .map_err(|e| anyhow!("Failed to parse chat response: {}", e))?;
    data.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.is_empty())
        .context("chat response contained no content")
}

// ── Anthropic wire types ──

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

/// Parse an Anthropic messages response: concatenate all text blocks.
fn parse_messages_response(response_body: &str) -> Result<String> {
    let data: MessagesResponse = serde_json::from_str(response_body)
        .map_err(|e| anyhow!("Failed to parse messages response: {}", e))?;
    let text: String = data
        .content
        .into_iter()
        .filter(|b| b.block_type == "text")
        .filter_map(|b| b.text)
        .collect();
    if text.is_empty() {
        return Err(anyhow!("messages response contained no text blocks"));
    }
    Ok(text)
}
