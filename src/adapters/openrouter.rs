//! OpenRouter adapter — OpenAI-compatible aggregator.
//!
//! Serves the vendor-prefixed model ids ("org/model"). OpenRouter asks
//! callers to identify themselves via Referer/X-Title headers.

use async_trait::async_trait;

use super::{openai_chat, ChatReply, ChatRequest, ProviderAdapter};
use crate::error::ChatError;
use crate::router::Provider;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai";

pub struct OpenRouterAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl OpenRouterAdapter {
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

impl Default for OpenRouterAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for OpenRouterAdapter {
    fn provider(&self) -> Provider {
        Provider::OpenRouter
    }

    async fn chat(&self, req: &ChatRequest, key: &str) -> Result<ChatReply, ChatError> {
        let url = format!("{}/api/v1/chat/completions", self.base_url);
        let headers = [
            ("HTTP-Referer", "https://companiond.local"),
            ("X-Title", "companiond"),
        ];
        openai_chat(&self.client, Provider::OpenRouter, &url, &headers, req, key).await
    }
}
