//! OpenAI-style chat completions through the Hugging Face inference router.

use async_trait::async_trait;
use itertools::Itertools;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

pub const FALLBACK_REPLY: &str = "I couldn't generate a response right now.";

/// Chat-capable models that most providers serve.
pub const BASE_MODELS: &[&str] = &[
    "meta-llama/Llama-3.1-8B-Instruct",
    "Qwen/Qwen2.5-7B-Instruct",
    "mistralai/Mistral-7B-Instruct-v0.3",
    "google/gemma-2-9b-it",
];

/// Tried in this order. `hf-inference` goes last as it serves few chat models.
pub const PROVIDERS: &[&str] = &["cerebras", "together", "fireworks", "replicate", "hf-inference"];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(thiserror::Error, Debug)]
pub enum InferenceError {
    #[error("request to inference router failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The router rejected the request; the body usually says why (unsupported model, quota...).
    #[error("[{status}] {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// One chat message, forwarded as the client sent it.
///
/// `content` may be a string, an array of parts or null; other keys (`name`, ...) ride
/// along in `extra`.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            extra: Map::new(),
        }
    }
}

/// Sampling parameters sent with every candidate.
#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct ChatParams {
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
}

pub type DynChatBackend = Arc<dyn ChatBackend + Send + Sync>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChatBackend {
    /// `false` when no API key was configured; the chat route is then disabled.
    fn is_configured(&self) -> bool;

    /// Ask a single provider-qualified model for a reply.
    async fn complete(&self, model: &str, params: &ChatParams) -> Result<String, InferenceError>;
}

#[derive(serde::Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    #[serde(flatten)]
    params: &'a ChatParams,
    stream: bool,
}

#[derive(Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl InferenceClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("fitness-world-api/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }
}

#[async_trait]
impl ChatBackend for InferenceClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, model: &str, params: &ChatParams) -> Result<String, InferenceError> {
        let mut request = self.http.post(&self.endpoint).json(&CompletionRequest {
            model,
            params,
            stream: false,
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(InferenceError::Status { status, body });
        }

        Ok(extract_reply(&body))
    }
}

/// Pull `choices[0].message.content` out of a completion body.
///
/// Some providers answer with plain text; that is returned as-is.
pub fn extract_reply(raw: &str) -> String {
    let reply = match serde_json::from_str::<Value>(raw) {
        Ok(data) => data
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string(),
        Err(_) => raw.trim().to_string(),
    };

    if reply.is_empty() {
        FALLBACK_REPLY.to_string()
    } else {
        reply
    }
}

/// Build the ordered list of provider-qualified models to try.
///
/// A `preferred` model that already names its provider (`model:provider`) is tried alone,
/// otherwise it is expanded across every provider. The base models follow, and duplicates
/// keep their first position.
pub fn expand_candidates(preferred: Option<&str>) -> Vec<String> {
    let preferred = preferred.map(str::trim).filter(|p| !p.is_empty());

    let mut candidates = Vec::new();

    if let Some(preferred) = preferred {
        if preferred.contains(':') {
            candidates.push(preferred.to_string());
        } else {
            candidates.extend(PROVIDERS.iter().map(|p| format!("{}:{}", preferred, p)));
        }
    }

    candidates.extend(
        BASE_MODELS
            .iter()
            .cartesian_product(PROVIDERS.iter())
            .map(|(model, provider)| format!("{}:{}", model, provider)),
    );

    candidates.into_iter().unique().collect()
}
