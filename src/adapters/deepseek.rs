//! DeepSeek adapter — OpenAI-compatible API.
//!
//! Doubles as the fail-over target when Gemini reports quota exhaustion.

use async_trait::async_trait;

use super::{openai_chat, ChatReply, ChatRequest, ProviderAdapter};
use crate::error::ChatError;
use crate::router::Provider;

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

pub struct DeepSeekAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl DeepSeekAdapter {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for DeepSeekAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for DeepSeekAdapter {
    fn provider(&self) -> Provider {
        Provider::DeepSeek
    }

    async fn chat(&self, req: &ChatRequest, key: &str) -> Result<ChatReply, ChatError> {
        let url = format!("{}/chat/completions", self.base_url);
        openai_chat(&self.client, Provider::DeepSeek, &url, &[], req, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Turn;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "deepseek-chat".into(),
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
    async fn test_chat_sends_bearer_and_parses_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Hey you."}}]
            })))
            .mount(&server)
            .await;

        let adapter = DeepSeekAdapter::with_base_url(server.uri());
        let reply = adapter.chat(&request(), "test-key").await.unwrap();
        assert_eq!(reply.text, "Hey you.");
        assert_eq!(reply.model, "deepseek-chat");
    }

    #[tokio::test]
    async fn test_rate_limit_body_is_quota_even_without_429() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"type": "rate_limit_exceeded", "message": "slow down"}
            })))
            .mount(&server)
            .await;

        let adapter = DeepSeekAdapter::with_base_url(server.uri());
        let err = adapter.chat(&request(), "test-key").await.unwrap_err();
        assert!(matches!(err, ChatError::QuotaExceeded { .. }));
    }
}
