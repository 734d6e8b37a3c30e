//! Groq adapter — OpenAI-compatible API.

use async_trait::async_trait;

use super::{openai_chat, ChatReply, ChatRequest, ProviderAdapter};
use crate::error::ChatError;
use crate::router::Provider;

const DEFAULT_BASE_URL: &str = "https://api.groq.com";

pub struct GroqAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl GroqAdapter {
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

impl Default for GroqAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for GroqAdapter {
    fn provider(&self) -> Provider {
        Provider::Groq
    }

    async fn chat(&self, req: &ChatRequest, key: &str) -> Result<ChatReply, ChatError> {
        let url = format!("{}/openai/v1/chat/completions", self.base_url);
        openai_chat(&self.client, Provider::Groq, &url, &[], req, key).await
    }
}
