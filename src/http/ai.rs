use crate::http::extractor::JsonBody;
use crate::http::{ApiContext, Error, Result};
use crate::upstream::inference::{expand_candidates, ChatMessage, ChatParams};
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

const SYSTEM_PROMPT: &str = "You are a helpful assistant for the Fitness World app.";
const MAX_TOKENS_CAP: u32 = 1024;

pub(crate) fn router() -> Router<ApiContext> {
    Router::new().route("/api/ai/chat", post(chat))
}

#[derive(serde::Deserialize, Debug)]
struct ChatRequest {
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_temperature")]
    temperature: f64,
    #[serde(default = "default_top_p")]
    top_p: f64,
}

fn default_max_tokens() -> u32 {
    256
}

fn default_temperature() -> f64 {
    0.7
}

fn default_top_p() -> f64 {
    1.0
}

#[derive(serde::Serialize)]
struct ChatReply {
    reply: String,
    model: String,
}

async fn chat(ctx: State<ApiContext>, JsonBody(req): JsonBody<ChatRequest>) -> Result<Json<ChatReply>> {
    if !ctx.chat.is_configured() {
        return Err(Error::NotConfigured(
            "AI not configured: missing HUGGINGFACE_API_KEY or HF_API_KEY".into(),
        ));
    }

    let params = ChatParams {
        messages: with_system_prompt(req.messages),
        temperature: req.temperature,
        max_tokens: req.max_tokens.min(MAX_TOKENS_CAP),
        top_p: req.top_p,
    };

    let preferred = req
        .model
        .as_deref()
        .filter(|model| !model.is_empty())
        .or(ctx.config.hf_model.as_deref());
    let candidates = expand_candidates(preferred);

    let mut last_error = None;
    for model in &candidates {
        log::info!("trying chat model {}", model);

        match ctx.chat.complete(model, &params).await {
            Ok(reply) => {
                return Ok(Json(ChatReply {
                    reply,
                    model: model.clone(),
                }))
            }
            Err(e) => {
                let message = e.to_string();
                log::warn!(
                    "chat model {} failed: {}",
                    model,
                    message.chars().take(300).collect::<String>()
                );
                last_error = Some(message);
            }
        }
    }

    Err(Error::ModelsExhausted {
        details: last_error.unwrap_or_else(|| "No candidates".to_string()),
        tried: candidates,
    })
}

/// Prepend the app's system prompt unless the client already sent a system message.
fn with_system_prompt(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    if messages.iter().any(|m| m.role == "system") {
        return messages;
    }

    let mut with_system = Vec::with_capacity(messages.len() + 1);
    with_system.push(ChatMessage::text("system", SYSTEM_PROMPT));
    with_system.extend(messages);
    with_system
}
