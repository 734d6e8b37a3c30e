//! Provider routing: model identifier → backend.
//!
//! Every model the app can select is described in the static registry.
//! Routing is a total function over that set: exact registry match first,
//! then prefix rules for ids the registry does not pin (new Gemini
//! previews, vendor-prefixed OpenRouter ids). Unknown identifiers are
//! rejected here, at the boundary, not deep in a call chain.

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

// ── Providers ───────────────────────────────────────────────────────

/// The closed set of backends a chat turn can be served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    Groq,
    DeepSeek,
    OpenRouter,
    /// The deterministic offline rule engine. No network, no credential.
    Local,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::Groq => "groq",
            Provider::DeepSeek => "deepseek",
            Provider::OpenRouter => "openrouter",
            Provider::Local => "local",
        }
    }

    /// Environment variable holding this provider's credential.
    /// `Local` needs none.
    pub fn env_key(&self) -> Option<&'static str> {
        match self {
            Provider::Gemini => Some("GEMINI_API_KEY"),
            Provider::Groq => Some("GROQ_API_KEY"),
            Provider::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Provider::OpenRouter => Some("OPENROUTER_API_KEY"),
            Provider::Local => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Model Registry ──────────────────────────────────────────────────

/// Static specification of a selectable model.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    /// Identifier used in API calls and stored in settings.
    pub id: &'static str,
    pub provider: Provider,
    pub display_name: &'static str,
    /// Context window in tokens. Zero for the offline engine.
    pub context_window: u64,
}

/// Every model the app offers in its picker.
pub static MODELS: &[ModelSpec] = &[
    ModelSpec {
        id: "gemini-3-flash-preview",
        provider: Provider::Gemini,
        display_name: "Gemini 3 Flash Preview",
        context_window: 1_048_576,
    },
    ModelSpec {
        id: "gemini-2.5-flash",
        provider: Provider::Gemini,
        display_name: "Gemini 2.5 Flash",
        context_window: 1_048_576,
    },
    ModelSpec {
        id: "gemini-2.5-flash-lite",
        provider: Provider::Gemini,
        display_name: "Gemini 2.5 Flash-Lite",
        context_window: 1_048_576,
    },
    ModelSpec {
        id: "gemini-2.5-pro",
        provider: Provider::Gemini,
        display_name: "Gemini 2.5 Pro",
        context_window: 1_048_576,
    },
    ModelSpec {
        id: "llama-3.3-70b-versatile",
        provider: Provider::Groq,
        display_name: "Llama 3.3 70B (Groq)",
        context_window: 131_072,
    },
    ModelSpec {
        id: "llama-3.1-8b-instant",
        provider: Provider::Groq,
        display_name: "Llama 3.1 8B Instant (Groq)",
        context_window: 131_072,
    },
    ModelSpec {
        id: "deepseek-chat",
        provider: Provider::DeepSeek,
        display_name: "DeepSeek Chat",
        context_window: 65_536,
    },
    ModelSpec {
        id: "meta-llama/llama-3.3-70b-instruct:free",
        provider: Provider::OpenRouter,
        display_name: "Llama 3.3 70B (OpenRouter, free)",
        context_window: 131_072,
    },
    ModelSpec {
        id: "mistralai/mistral-7b-instruct:free",
        provider: Provider::OpenRouter,
        display_name: "Mistral 7B (OpenRouter, free)",
        context_window: 32_768,
    },
    ModelSpec {
        id: "local",
        provider: Provider::Local,
        display_name: "Offline companion",
        context_window: 0,
    },
];

/// Model the relay fails over to when the Gemini family runs out of quota.
pub const FALLBACK_MODEL: &str = "deepseek-chat";

pub fn get_model(id: &str) -> Option<&'static ModelSpec> {
    MODELS.iter().find(|m| m.id == id)
}

/// Resolve a model identifier to its backend.
pub fn route(model_id: &str) -> Result<Provider, ChatError> {
    if let Some(spec) = get_model(model_id) {
        return Ok(spec.provider);
    }

    // Prefix rules for ids the static table does not pin down.
    if model_id.starts_with("gemini") {
        return Ok(Provider::Gemini);
    }
    if model_id.starts_with("deepseek") {
        return Ok(Provider::DeepSeek);
    }
    if model_id == "local" || model_id.starts_with("local-") {
        return Ok(Provider::Local);
    }
    // Vendor-prefixed ids ("org/model") are OpenRouter's namespace.
    if model_id.contains('/') {
        return Ok(Provider::OpenRouter);
    }

    Err(ChatError::UnsupportedModel {
        model: model_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_registry_id_routes_to_its_provider() {
        for spec in MODELS {
            assert_eq!(route(spec.id).unwrap(), spec.provider, "id {}", spec.id);
        }
    }

    #[test]
    fn test_prefix_rules() {
        assert_eq!(route("gemini-4-ultra").unwrap(), Provider::Gemini);
        assert_eq!(route("deepseek-reasoner").unwrap(), Provider::DeepSeek);
        assert_eq!(route("qwen/qwen-2.5-72b").unwrap(), Provider::OpenRouter);
        assert_eq!(route("local").unwrap(), Provider::Local);
    }

    #[test]
    fn test_unknown_id_is_rejected() {
        let err = route("gpt-4o").unwrap_err();
        assert!(matches!(err, ChatError::UnsupportedModel { model } if model == "gpt-4o"));
    }

    #[test]
    fn test_fallback_model_is_registered() {
        assert_eq!(get_model(FALLBACK_MODEL).unwrap().provider, Provider::DeepSeek);
    }
}
