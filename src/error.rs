//! Failure taxonomy for the chat relay.
//!
//! Every provider failure is classified into one of these variants at the
//! adapter boundary. The relay decides from the variant alone whether to
//! retry, fail over, or surface the error as an in-band chat reply. Nothing
//! past the relay ever sees a raw transport error.

use thiserror::Error;

use crate::router::Provider;

#[derive(Debug, Error)]
pub enum ChatError {
    /// No credential configured for the provider. A configuration error,
    /// not a transient one: never retried, never failed over.
    #[error("no API key configured for {provider}")]
    MissingCredential { provider: Provider },

    /// Provider-reported rate/usage limit (HTTP 429 or a quota-specific
    /// error body). Retried, then eligible for fail-over.
    #[error("{provider} quota exceeded")]
    QuotaExceeded { provider: Provider },

    /// The request exceeded its deadline.
    #[error("request timed out")]
    Timeout,

    /// 5xx from the provider. Retried once, then surfaced.
    #[error("provider returned HTTP {status}: {message}")]
    Transient { status: u16, message: String },

    /// Transport-level failure (DNS, TLS, connection reset). Treated like
    /// a transient provider error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The model id maps to no known provider. Rejected at the routing
    /// boundary before any network call.
    #[error("unsupported model: {model}")]
    UnsupportedModel { model: String },

    /// The provider answered 200 with no usable text. Terminal; the reply
    /// becomes a placeholder, never a retry.
    #[error("provider returned an empty response")]
    EmptyResponse,

    /// The provider body was not the JSON shape we expect.
    #[error("could not parse provider response: {0}")]
    ParseFailure(String),
}

impl ChatError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::QuotaExceeded { .. } | Self::Transient { .. } | Self::Network(_)
        )
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(ChatError::QuotaExceeded {
            provider: Provider::Gemini
        }
        .is_retryable());
        assert!(ChatError::Transient {
            status: 503,
            message: "overloaded".into()
        }
        .is_retryable());
        assert!(!ChatError::MissingCredential {
            provider: Provider::Gemini
        }
        .is_retryable());
        assert!(!ChatError::Timeout.is_retryable());
        assert!(!ChatError::EmptyResponse.is_retryable());
        assert!(!ChatError::UnsupportedModel {
            model: "gpt-9".into()
        }
        .is_retryable());
    }
}
