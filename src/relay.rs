//! Retry / fail-over relay — turns one chat request into one reply string.
//!
//! The contract at this boundary is "always produce a displayable reply":
//! every failure class is converted into an in-band message prefixed with
//! `REPLY_MARKER`, so the transcript always receives a bot-authored entry
//! and the chat never crashes.
//!
//! Per request: resolve the credential, call the routed adapter under a
//! deadline, retry transient and quota errors once with a short backoff,
//! and on persistent Gemini quota exhaustion fail over exactly once to
//! DeepSeek with a trimmed history. Missing credentials short-circuit:
//! they are configuration errors, not transient ones.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::adapters::{ChatRequest, ProviderAdapter, Turn};
use crate::error::ChatError;
use crate::router::{self, Provider, FALLBACK_MODEL};

/// Marker prefixing every in-band failure reply.
pub const REPLY_MARKER: &str = "⚠️";

// ── Credentials ─────────────────────────────────────────────────────

/// Where provider credentials come from. Production reads the
/// environment; tests inject a fixed map.
pub trait CredentialSource: Send + Sync {
    fn key_for(&self, provider: Provider) -> Option<String>;
}

pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn key_for(&self, provider: Provider) -> Option<String> {
        let var = provider.env_key()?;
        std::env::var(var).ok().filter(|v| !v.trim().is_empty())
    }
}

// ── Config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Deadline for a single provider call.
    pub request_timeout: Duration,
    /// Attempts against the primary (initial call plus retries).
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
    /// History turns handed to the fallback provider.
    pub fallback_history: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(22),
            max_attempts: 2,
            backoff: Duration::from_secs(1),
            fallback_history: 12,
        }
    }
}

// ── Delivery ────────────────────────────────────────────────────────

/// The relay's terminal output. `text` is always displayable;
/// `usage_events` carries `(model_id, quota_exceeded)` pairs for the
/// usage ledger, one per provider that was actually called to completion.
#[derive(Debug)]
pub struct Delivery {
    pub text: String,
    pub usage_events: Vec<(String, bool)>,
}

pub struct Relay {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
    credentials: Arc<dyn CredentialSource>,
    config: RelayConfig,
}

impl Relay {
    pub fn new(adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>) -> Self {
        Self::with_parts(adapters, Arc::new(EnvCredentials), RelayConfig::default())
    }

    pub fn with_parts(
        adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
        credentials: Arc<dyn CredentialSource>,
        config: RelayConfig,
    ) -> Self {
        Self {
            adapters,
            credentials,
            config,
        }
    }

    /// Produce a reply for `model_id`. Never returns an error: failures
    /// become marker-prefixed reply text. The caller is expected to have
    /// branched `Provider::Local` to the offline engine already.
    pub async fn deliver(
        &self,
        model_id: &str,
        history: &[Turn],
        system_instruction: &str,
    ) -> Delivery {
        let mut usage_events = Vec::new();
        let text = match self
            .try_deliver(model_id, history, system_instruction, &mut usage_events)
            .await
        {
            Ok(text) => text,
            Err(err) => {
                warn!(model = model_id, error = %err, "chat relay failed");
                render_failure(&err)
            }
        };
        Delivery { text, usage_events }
    }

    /// The typed path. Tests and the relay itself use this; the server
    /// goes through `deliver`.
    pub async fn try_deliver(
        &self,
        model_id: &str,
        history: &[Turn],
        system_instruction: &str,
        usage_events: &mut Vec<(String, bool)>,
    ) -> Result<String, ChatError> {
        let provider = router::route(model_id)?;

        let request = ChatRequest {
            model: model_id.to_string(),
            history: history.to_vec(),
            system_instruction: Some(system_instruction.to_string()),
            temperature: None,
            max_tokens: None,
        };

        match self.attempt(provider, &request).await {
            Ok(reply) => {
                usage_events.push((model_id.to_string(), false));
                Ok(reply.text)
            }
            Err(err) if err.is_quota() => {
                usage_events.push((model_id.to_string(), true));
                if provider == Provider::Gemini {
                    self.fail_over(&request, usage_events).await
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }

    /// One provider, bounded attempts with backoff between them.
    async fn attempt(
        &self,
        provider: Provider,
        request: &ChatRequest,
    ) -> Result<crate::adapters::ChatReply, ChatError> {
        let key = self
            .credentials
            .key_for(provider)
            .ok_or(ChatError::MissingCredential { provider })?;

        let adapter = self
            .adapters
            .get(&provider)
            .ok_or_else(|| ChatError::UnsupportedModel {
                model: request.model.clone(),
            })?;

        let mut attempt = 1;
        loop {
            debug!(provider = %provider, attempt, "calling provider");
            let result =
                match tokio::time::timeout(self.config.request_timeout, adapter.chat(request, &key))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ChatError::Timeout),
                };

            match result {
                Ok(reply) => return Ok(reply),
                Err(err) if err.is_retryable() && attempt < self.config.max_attempts => {
                    warn!(provider = %provider, attempt, error = %err, "retrying after backoff");
                    tokio::time::sleep(self.config.backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Single fallback call to DeepSeek with trimmed history. Invoked at
    /// most once per delivery; its own failures collapse into the generic
    /// "all providers busy" reply.
    async fn fail_over(
        &self,
        request: &ChatRequest,
        usage_events: &mut Vec<(String, bool)>,
    ) -> Result<String, ChatError> {
        warn!(fallback = FALLBACK_MODEL, "gemini quota exhausted, failing over");

        let start = request
            .history
            .len()
            .saturating_sub(self.config.fallback_history);
        let trimmed: Vec<Turn> = request.history[start..].to_vec();

        let fallback_request = ChatRequest {
            model: FALLBACK_MODEL.to_string(),
            history: trimmed,
            system_instruction: request.system_instruction.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let key = self
            .credentials
            .key_for(Provider::DeepSeek)
            .ok_or(ChatError::MissingCredential {
                provider: Provider::DeepSeek,
            })?;
        let adapter =
            self.adapters
                .get(&Provider::DeepSeek)
                .ok_or_else(|| ChatError::UnsupportedModel {
                    model: FALLBACK_MODEL.to_string(),
                })?;

        let result = match tokio::time::timeout(
            self.config.request_timeout,
            adapter.chat(&fallback_request, &key),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ChatError::Timeout),
        };

        match result {
            Ok(reply) => {
                usage_events.push((FALLBACK_MODEL.to_string(), false));
                Ok(reply.text)
            }
            Err(err) => {
                if err.is_quota() {
                    usage_events.push((FALLBACK_MODEL.to_string(), true));
                }
                warn!(error = %err, "fallback provider failed too");
                Err(err)
            }
        }
    }
}

// ── Failure Rendering ───────────────────────────────────────────────

/// Convert a terminal error into the in-band reply the transcript shows.
pub fn render_failure(err: &ChatError) -> String {
    match err {
        ChatError::MissingCredential { provider } => format!(
            "{REPLY_MARKER} No API key is configured for {provider}. Set {} and try again.",
            provider.env_key().unwrap_or("its API key")
        ),
        ChatError::QuotaExceeded { provider } => format!(
            "{REPLY_MARKER} {provider} has hit its usage limit for today. \
             Try again later or switch models in settings."
        ),
        ChatError::Timeout => {
            format!("{REPLY_MARKER} That reply took too long and timed out. Mind sending it again?")
        }
        ChatError::Transient { .. } | ChatError::Network(_) => format!(
            "{REPLY_MARKER} All providers are busy right now. Give it a moment and try again."
        ),
        ChatError::UnsupportedModel { model } => {
            format!("{REPLY_MARKER} \"{model}\" is not a model I know how to reach.")
        }
        ChatError::EmptyResponse => format!(
            "{REPLY_MARKER} ...I lost my train of thought there. Could you say that again?"
        ),
        ChatError::ParseFailure(_) => format!(
            "{REPLY_MARKER} I got a garbled answer back from the provider. Try once more?"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ChatReply;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted adapter: pops pre-programmed outcomes and counts calls.
    struct ScriptedAdapter {
        provider: Provider,
        outcomes: Mutex<Vec<Result<String, ChatError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedAdapter {
        fn new(provider: Provider, outcomes: Vec<Result<String, ChatError>>) -> Arc<Self> {
            Arc::new(Self {
                provider,
                outcomes: Mutex::new(outcomes),
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn chat(&self, req: &ChatRequest, _key: &str) -> Result<ChatReply, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            let outcome = if outcomes.is_empty() {
                Err(ChatError::EmptyResponse)
            } else {
                outcomes.remove(0)
            };
            outcome.map(|text| ChatReply {
                text,
                model: req.model.clone(),
                provider: self.provider,
                latency_ms: 1,
            })
        }
    }

    struct StaticCredentials(Vec<Provider>);

    impl CredentialSource for StaticCredentials {
        fn key_for(&self, provider: Provider) -> Option<String> {
            self.0.contains(&provider).then(|| "test-key".to_string())
        }
    }

    fn fast_config() -> RelayConfig {
        RelayConfig {
            request_timeout: Duration::from_secs(5),
            max_attempts: 2,
            backoff: Duration::from_millis(1),
            fallback_history: 12,
        }
    }

    fn quota(provider: Provider) -> ChatError {
        ChatError::QuotaExceeded { provider }
    }

    fn history() -> Vec<Turn> {
        vec![Turn {
            role: "user".into(),
            content: "hello".into(),
        }]
    }

    fn relay_with(
        gemini: Arc<ScriptedAdapter>,
        deepseek: Arc<ScriptedAdapter>,
        creds: Vec<Provider>,
    ) -> Relay {
        let mut adapters: HashMap<Provider, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert(Provider::Gemini, gemini);
        adapters.insert(Provider::DeepSeek, deepseek);
        Relay::with_parts(adapters, Arc::new(StaticCredentials(creds)), fast_config())
    }

    #[tokio::test]
    async fn test_success_signals_usage() {
        let gemini = ScriptedAdapter::new(Provider::Gemini, vec![Ok("hi there".into())]);
        let deepseek = ScriptedAdapter::new(Provider::DeepSeek, vec![]);
        let relay = relay_with(
            gemini.clone(),
            deepseek.clone(),
            vec![Provider::Gemini, Provider::DeepSeek],
        );

        let delivery = relay.deliver("gemini-2.5-flash", &history(), "sys").await;
        assert_eq!(delivery.text, "hi there");
        assert_eq!(delivery.usage_events, vec![("gemini-2.5-flash".to_string(), false)]);
        assert_eq!(gemini.call_count(), 1);
        assert_eq!(deepseek.call_count(), 0);
    }

    #[tokio::test]
    async fn test_persistent_quota_fails_over_exactly_once() {
        let gemini = ScriptedAdapter::new(
            Provider::Gemini,
            vec![Err(quota(Provider::Gemini)), Err(quota(Provider::Gemini))],
        );
        let deepseek = ScriptedAdapter::new(Provider::DeepSeek, vec![Ok("fallback reply".into())]);
        let relay = relay_with(
            gemini.clone(),
            deepseek.clone(),
            vec![Provider::Gemini, Provider::DeepSeek],
        );

        let delivery = relay.deliver("gemini-2.5-flash", &history(), "sys").await;
        assert_eq!(delivery.text, "fallback reply");
        // Primary: initial call plus one retry. Fallback: exactly one.
        assert_eq!(gemini.call_count(), 2);
        assert_eq!(deepseek.call_count(), 1);
        assert_eq!(
            delivery.usage_events,
            vec![
                ("gemini-2.5-flash".to_string(), true),
                ("deepseek-chat".to_string(), false),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_credential_short_circuits() {
        let gemini = ScriptedAdapter::new(Provider::Gemini, vec![Ok("never".into())]);
        let deepseek = ScriptedAdapter::new(Provider::DeepSeek, vec![Ok("never".into())]);
        let relay = relay_with(gemini.clone(), deepseek.clone(), vec![Provider::DeepSeek]);

        let delivery = relay.deliver("gemini-2.5-flash", &history(), "sys").await;
        assert!(delivery.text.starts_with(REPLY_MARKER));
        assert!(delivery.text.contains("GEMINI_API_KEY"));
        // No call, no retry, no fallback.
        assert_eq!(gemini.call_count(), 0);
        assert_eq!(deepseek.call_count(), 0);
        assert!(delivery.usage_events.is_empty());
    }

    #[tokio::test]
    async fn test_transient_retried_then_surfaced() {
        let gemini = ScriptedAdapter::new(
            Provider::Gemini,
            vec![
                Err(ChatError::Transient {
                    status: 503,
                    message: "overloaded".into(),
                }),
                Err(ChatError::Transient {
                    status: 503,
                    message: "overloaded".into(),
                }),
            ],
        );
        let deepseek = ScriptedAdapter::new(Provider::DeepSeek, vec![Ok("never".into())]);
        let relay = relay_with(
            gemini.clone(),
            deepseek.clone(),
            vec![Provider::Gemini, Provider::DeepSeek],
        );

        let delivery = relay.deliver("gemini-2.5-flash", &history(), "sys").await;
        assert!(delivery.text.starts_with(REPLY_MARKER));
        assert_eq!(gemini.call_count(), 2);
        // 5xx does not trigger the quota fail-over path.
        assert_eq!(deepseek.call_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_then_success_recovers() {
        let gemini = ScriptedAdapter::new(
            Provider::Gemini,
            vec![
                Err(ChatError::Transient {
                    status: 500,
                    message: "hiccup".into(),
                }),
                Ok("recovered".into()),
            ],
        );
        let deepseek = ScriptedAdapter::new(Provider::DeepSeek, vec![]);
        let relay = relay_with(gemini.clone(), deepseek, vec![Provider::Gemini]);

        let delivery = relay.deliver("gemini-2.5-flash", &history(), "sys").await;
        assert_eq!(delivery.text, "recovered");
        assert_eq!(gemini.call_count(), 2);
    }

    #[tokio::test]
    async fn test_non_gemini_quota_does_not_fail_over() {
        let groq = ScriptedAdapter::new(
            Provider::Groq,
            vec![Err(quota(Provider::Groq)), Err(quota(Provider::Groq))],
        );
        let deepseek = ScriptedAdapter::new(Provider::DeepSeek, vec![Ok("never".into())]);
        let mut adapters: HashMap<Provider, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert(Provider::Groq, groq.clone());
        adapters.insert(Provider::DeepSeek, deepseek.clone());
        let relay = Relay::with_parts(
            adapters,
            Arc::new(StaticCredentials(vec![Provider::Groq, Provider::DeepSeek])),
            fast_config(),
        );

        let delivery = relay
            .deliver("llama-3.3-70b-versatile", &history(), "sys")
            .await;
        assert!(delivery.text.starts_with(REPLY_MARKER));
        assert_eq!(deepseek.call_count(), 0);
        assert_eq!(
            delivery.usage_events,
            vec![("llama-3.3-70b-versatile".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn test_fallback_failure_renders_busy_message() {
        let gemini = ScriptedAdapter::new(
            Provider::Gemini,
            vec![Err(quota(Provider::Gemini)), Err(quota(Provider::Gemini))],
        );
        let deepseek = ScriptedAdapter::new(
            Provider::DeepSeek,
            vec![Err(ChatError::Transient {
                status: 502,
                message: "bad gateway".into(),
            })],
        );
        let relay = relay_with(
            gemini,
            deepseek.clone(),
            vec![Provider::Gemini, Provider::DeepSeek],
        );

        let delivery = relay.deliver("gemini-2.5-flash", &history(), "sys").await;
        assert!(delivery.text.starts_with(REPLY_MARKER));
        assert!(delivery.text.contains("busy"));
        assert_eq!(deepseek.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_response_is_terminal() {
        let gemini = ScriptedAdapter::new(Provider::Gemini, vec![Err(ChatError::EmptyResponse)]);
        let deepseek = ScriptedAdapter::new(Provider::DeepSeek, vec![Ok("never".into())]);
        let relay = relay_with(
            gemini.clone(),
            deepseek.clone(),
            vec![Provider::Gemini, Provider::DeepSeek],
        );

        let delivery = relay.deliver("gemini-2.5-flash", &history(), "sys").await;
        assert!(delivery.text.starts_with(REPLY_MARKER));
        assert_eq!(gemini.call_count(), 1, "empty response must not be retried");
        assert_eq!(deepseek.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_model_rejected_without_calls() {
        let gemini = ScriptedAdapter::new(Provider::Gemini, vec![Ok("never".into())]);
        let deepseek = ScriptedAdapter::new(Provider::DeepSeek, vec![]);
        let relay = relay_with(gemini.clone(), deepseek, vec![Provider::Gemini]);

        let delivery = relay.deliver("gpt-4o", &history(), "sys").await;
        assert!(delivery.text.starts_with(REPLY_MARKER));
        assert!(delivery.text.contains("gpt-4o"));
        assert_eq!(gemini.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fallback_history_is_trimmed() {
        let long_history: Vec<Turn> = (0..40)
            .map(|i| Turn {
                role: if i % 2 == 0 { "user" } else { "assistant" }.into(),
                content: format!("turn {i}"),
            })
            .collect();

        struct CapturingAdapter {
            seen: Mutex<Option<usize>>,
        }

        #[async_trait]
        impl ProviderAdapter for CapturingAdapter {
            fn provider(&self) -> Provider {
                Provider::DeepSeek
            }
            async fn chat(&self, req: &ChatRequest, _key: &str) -> Result<ChatReply, ChatError> {
                *self.seen.lock().unwrap() = Some(req.history.len());
                Ok(ChatReply {
                    text: "ok".into(),
                    model: req.model.clone(),
                    provider: Provider::DeepSeek,
                    latency_ms: 1,
                })
            }
        }

        let gemini = ScriptedAdapter::new(
            Provider::Gemini,
            vec![Err(quota(Provider::Gemini)), Err(quota(Provider::Gemini))],
        );
        let capturing = Arc::new(CapturingAdapter {
            seen: Mutex::new(None),
        });
        let mut adapters: HashMap<Provider, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert(Provider::Gemini, gemini);
        adapters.insert(Provider::DeepSeek, capturing.clone());
        let relay = Relay::with_parts(
            adapters,
            Arc::new(StaticCredentials(vec![Provider::Gemini, Provider::DeepSeek])),
            fast_config(),
        );

        let delivery = relay.deliver("gemini-2.5-flash", &long_history, "sys").await;
        assert_eq!(delivery.text, "ok");
        assert_eq!(capturing.seen.lock().unwrap().unwrap(), 12);
    }
}
