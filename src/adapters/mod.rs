//! Provider adapters — one per hosted backend.
//!
//! Every provider implements `ProviderAdapter`. The relay calls adapters;
//! adapters never see the vault, the state, or each other. Credentials are
//! resolved by the relay from the environment and passed in per call; an
//! adapter must not store, log, or cache the key.
//!
//! All failures are classified into `ChatError` here so the relay can make
//! retry and fail-over decisions from the variant alone.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

use crate::error::ChatError;
use crate::router::Provider;
use crate::state::{ChatMessage, Sender};

pub mod deepseek;
pub mod gemini;
pub mod groq;
pub mod openrouter;

// ── Wire Types ──────────────────────────────────────────────────────

/// One turn of history in provider-agnostic form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: String, // "user" | "assistant"
    pub content: String,
}

impl From<&ChatMessage> for Turn {
    fn from(msg: &ChatMessage) -> Self {
        Turn {
            role: match msg.sender {
                Sender::User => "user".into(),
                Sender::Bot => "assistant".into(),
            },
            content: msg.text.clone(),
        }
    }
}

/// A provider-agnostic chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub history: Vec<Turn>,
    #[serde(default)]
    pub system_instruction: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// A normalized reply: plain text plus bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub text: String,
    pub model: String,
    pub provider: Provider,
    pub latency_ms: u64,
}

// ── Adapter Trait ───────────────────────────────────────────────────

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Send one chat request with the given credential. The result text is
    /// already normalized; an empty body is `ChatError::EmptyResponse`.
    async fn chat(&self, req: &ChatRequest, key: &str) -> Result<ChatReply, ChatError>;
}

// ── Shared Classification ───────────────────────────────────────────

/// Map a non-success HTTP response into the failure taxonomy.
/// 429 and quota-flavored bodies are quota exhaustion; everything else is
/// transient and handed to the retry policy.
pub(crate) fn classify_status(provider: Provider, status: u16, body: &str) -> ChatError {
    let quota_body = body.contains("RESOURCE_EXHAUSTED")
        || body.contains("rate_limit")
        || body.to_ascii_lowercase().contains("quota");
    if status == 429 || quota_body {
        return ChatError::QuotaExceeded { provider };
    }
    let message = extract_error_message(body);
    ChatError::Transient { status, message }
}

/// Pull a human-readable message out of a provider error body, falling
/// back to a truncated raw body for non-JSON responses.
fn extract_error_message(body: &str) -> String {
    let parsed: Value = serde_json::from_str(body).unwrap_or_default();
    let msg = parsed["error"]["message"]
        .as_str()
        .or_else(|| parsed["error"].as_str())
        .unwrap_or(body);
    msg.chars().take(300).collect()
}

// ── OpenAI-compatible Wire Format ───────────────────────────────────
// Groq, DeepSeek and OpenRouter all speak the /chat/completions shape;
// only base URL and headers differ.

pub(crate) fn openai_body(req: &ChatRequest) -> Value {
    let mut messages: Vec<Value> = Vec::with_capacity(req.history.len() + 1);
    if let Some(sys) = &req.system_instruction {
        messages.push(serde_json::json!({"role": "system", "content": sys}));
    }
    for turn in &req.history {
        messages.push(serde_json::json!({"role": turn.role, "content": turn.content}));
    }
    serde_json::json!({
        "model": req.model,
        "messages": messages,
        "max_tokens": req.max_tokens.unwrap_or(1024),
        "temperature": req.temperature.unwrap_or(0.9),
    })
}

pub(crate) async fn openai_chat(
    client: &reqwest::Client,
    provider: Provider,
    url: &str,
    extra_headers: &[(&str, &str)],
    req: &ChatRequest,
    key: &str,
) -> Result<ChatReply, ChatError> {
    let start = Instant::now();
    let mut builder = client.post(url).bearer_auth(key).json(&openai_body(req));
    for (name, value) in extra_headers {
        builder = builder.header(*name, *value);
    }
    let resp = builder.send().await?;
    let latency = start.elapsed().as_millis() as u64;

    let status = resp.status().as_u16();
    let body = resp.text().await?;
    if !(200..300).contains(&status) {
        return Err(classify_status(provider, status, &body));
    }

    let parsed: Value = serde_json::from_str(&body)
        .map_err(|e| ChatError::ParseFailure(format!("{provider}: {e}")))?;
    let text = parsed["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("")
        .trim()
        .to_string();
    if text.is_empty() {
        return Err(ChatError::EmptyResponse);
    }

    Ok(ChatReply {
        text,
        model: req.model.clone(),
        provider,
        latency_ms: latency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_429_is_quota() {
        let err = classify_status(Provider::Gemini, 429, "{}");
        assert!(matches!(err, ChatError::QuotaExceeded { .. }));
    }

    #[test]
    fn test_classify_quota_body_without_429() {
        let body = r#"{"error":{"status":"RESOURCE_EXHAUSTED","message":"Quota exceeded"}}"#;
        let err = classify_status(Provider::Gemini, 403, body);
        assert!(matches!(err, ChatError::QuotaExceeded { .. }));
    }

    #[test]
    fn test_classify_5xx_is_transient() {
        let err = classify_status(Provider::Groq, 503, r#"{"error":{"message":"overloaded"}}"#);
        match err {
            ChatError::Transient { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("expected transient, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_message_from_non_json() {
        assert_eq!(
            extract_error_message("<html>bad gateway</html>"),
            "<html>bad gateway</html>"
        );
    }

    #[test]
    fn test_openai_body_places_system_first() {
        let req = ChatRequest {
            model: "deepseek-chat".into(),
            history: vec![Turn {
                role: "user".into(),
                content: "hi".into(),
            }],
            system_instruction: Some("Be kind.".into()),
            temperature: None,
            max_tokens: None,
        };
        let body = openai_body(&req);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["model"], "deepseek-chat");
    }
}
