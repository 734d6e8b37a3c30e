//! Gemini adapter — generativelanguage REST API.
//!
//! The primary chat provider. Quota errors from this family are the
//! trigger for the relay's DeepSeek fail-over.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Instant;

use super::{classify_status, ChatReply, ChatRequest, ProviderAdapter};
use crate::error::ChatError;
use crate::router::Provider;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiAdapter {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Override the endpoint. Tests point this at a local mock server.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn build_body(req: &ChatRequest) -> Value {
        let mut contents: Vec<Value> = Vec::with_capacity(req.history.len());
        for turn in &req.history {
            let role = match turn.role.as_str() {
                "assistant" => "model",
                _ => "user",
            };
            contents.push(serde_json::json!({
                "role": role,
                "parts": [{"text": &turn.content}]
            }));
        }

        let mut body = serde_json::json!({ "contents": contents });
        if let Some(sys) = &req.system_instruction {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{"text": sys}]
            });
        }

        let mut gen_config = serde_json::json!({});
        if let Some(t) = req.temperature {
            gen_config["temperature"] = serde_json::json!(t);
        }
        if let Some(m) = req.max_tokens {
            gen_config["maxOutputTokens"] = serde_json::json!(m);
        }
        body["generationConfig"] = gen_config;
        body
    }
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn chat(&self, req: &ChatRequest, key: &str) -> Result<ChatReply, ChatError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, req.model, key
        );
        let body = Self::build_body(req);

        let start = Instant::now();
        let resp = self.client.post(&url).json(&body).send().await?;
        let latency = start.elapsed().as_millis() as u64;

        let status = resp.status().as_u16();
        let raw = resp.text().await?;
        if !(200..300).contains(&status) {
            return Err(classify_status(Provider::Gemini, status, &raw));
        }

        let parsed: Value = serde_json::from_str(&raw)
            .map_err(|e| ChatError::ParseFailure(format!("gemini: {e}")))?;
        let text = parsed["candidates"][0]["content"]["parts"][0]["text"]
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
            provider: Provider::Gemini,
            latency_ms: latency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Turn;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gemini-2.5-flash".into(),
            history: vec![Turn {
                role: "user".into(),
                content: "hi".into(),
            }],
            system_instruction: Some("Stay in character.".into()),
            temperature: None,
            max_tokens: None,
        }
    }

    #[tokio::test]
    async fn test_chat_parses_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {"parts": [{"text": "Hello! *waves*"}], "role": "model"}
                }]
            })))
            .mount(&server)
            .await;

        let adapter = GeminiAdapter::with_base_url(server.uri());
        let reply = adapter.chat(&request(), "test-key").await.unwrap();
        assert_eq!(reply.text, "Hello! *waves*");
        assert_eq!(reply.provider, Provider::Gemini);
    }

    #[tokio::test]
    async fn test_429_classified_as_quota() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"status": "RESOURCE_EXHAUSTED", "message": "Quota exceeded"}
            })))
            .mount(&server)
            .await;

        let adapter = GeminiAdapter::with_base_url(server.uri());
        let err = adapter.chat(&request(), "test-key").await.unwrap_err();
        assert!(matches!(err, ChatError::QuotaExceeded { .. }));
    }

    #[tokio::test]
    async fn test_blank_candidate_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {"parts": [{"text": "   "}], "role": "model"}
                }]
            })))
            .mount(&server)
            .await;

        let adapter = GeminiAdapter::with_base_url(server.uri());
        let err = adapter.chat(&request(), "test-key").await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyResponse));
    }

    #[test]
    fn test_assistant_turns_map_to_model_role() {
        let req = ChatRequest {
            model: "gemini-2.5-flash".into(),
            history: vec![
                Turn {
                    role: "user".into(),
                    content: "hi".into(),
                },
                Turn {
                    role: "assistant".into(),
                    content: "hello".into(),
                },
            ],
            system_instruction: Some("Stay in character.".into()),
            temperature: Some(0.9),
            max_tokens: Some(512),
        };
        let body = GeminiAdapter::build_body(&req);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "Stay in character."
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 512);
    }
}
