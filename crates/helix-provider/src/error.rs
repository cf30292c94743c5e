//! Provider error taxonomy.
//!
//! Every adapter failure is one of these variants. Each carries the
//! provider id, the model when applicable, an HTTP-like status when one
//! exists, and a redacted slice of the remote payload for diagnostics.
//! Credentials never appear here; adapters run their payloads through
//! [`redact_secrets`] before constructing an error.

use std::time::Duration;

use helix_shared::ErrorCode;

/// Maximum diagnostic payload length carried inside an error.
const MAX_DETAIL_LEN: usize = 2048;

/// An error surfaced by a provider adapter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("network error reaching provider '{provider}': {detail}")]
    Network {
        provider: String,
        model: Option<String>,
        detail: String,
    },

    #[error("provider '{provider}' rejected the credentials: {detail}")]
    Unauthorized {
        provider: String,
        model: Option<String>,
        status: Option<u16>,
        detail: String,
    },

    #[error("provider '{provider}' rate limited the request")]
    RateLimited {
        provider: String,
        model: Option<String>,
        retry_after: Option<Duration>,
        detail: String,
    },

    #[error("model '{model}' not found at provider '{provider}'")]
    NotFound {
        provider: String,
        model: String,
        detail: String,
    },

    #[error("provider '{provider}' rejected the request: {detail}")]
    BadRequest {
        provider: String,
        model: Option<String>,
        status: Option<u16>,
        detail: String,
    },

    #[error("provider '{provider}' internal failure: {detail}")]
    Internal {
        provider: String,
        model: Option<String>,
        status: Option<u16>,
        detail: String,
    },

    #[error("deadline exceeded calling provider '{provider}'")]
    Timeout {
        provider: String,
        model: Option<String>,
    },

    #[error("call to provider '{provider}' was cancelled")]
    Cancelled { provider: String },

    #[error("circuit open for provider '{provider}'")]
    CircuitOpen { provider: String },
}

/// How the role runner should treat an error when deciding whether the
/// fallback chain is worth walking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackSeverity {
    /// The failure is specific to this provider or moment; a different
    /// model is a reasonable next attempt.
    Retryable,
    /// The failure suggests a caller-side problem. The chain is still
    /// walked (auth errors can be provider-specific) but the failure is
    /// marked non-recoverable in diagnostics.
    NonRecoverable,
}

impl ProviderError {
    /// The provider this error came from.
    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Network { provider, .. }
            | ProviderError::Unauthorized { provider, .. }
            | ProviderError::RateLimited { provider, .. }
            | ProviderError::NotFound { provider, .. }
            | ProviderError::BadRequest { provider, .. }
            | ProviderError::Internal { provider, .. }
            | ProviderError::Timeout { provider, .. }
            | ProviderError::Cancelled { provider }
            | ProviderError::CircuitOpen { provider } => provider,
        }
    }

    /// The model involved, when known.
    pub fn model(&self) -> Option<&str> {
        match self {
            ProviderError::NotFound { model, .. } => Some(model),
            ProviderError::Network { model, .. }
            | ProviderError::Unauthorized { model, .. }
            | ProviderError::RateLimited { model, .. }
            | ProviderError::BadRequest { model, .. }
            | ProviderError::Internal { model, .. }
            | ProviderError::Timeout { model, .. } => model.as_deref(),
            ProviderError::Cancelled { .. } | ProviderError::CircuitOpen { .. } => None,
        }
    }

    /// The rate-limit hint, if the provider sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// The stable boundary code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ProviderError::Network { .. } => ErrorCode::NetworkError,
            ProviderError::Unauthorized { .. } => ErrorCode::Unauthorized,
            ProviderError::RateLimited { .. } => ErrorCode::RateLimited,
            ProviderError::NotFound { .. } => ErrorCode::NotFound,
            ProviderError::BadRequest { .. } => ErrorCode::InvalidRequest,
            ProviderError::Internal { .. } => ErrorCode::ProviderInternal,
            ProviderError::Timeout { .. } => ErrorCode::Timeout,
            ProviderError::Cancelled { .. } => ErrorCode::Cancelled,
            ProviderError::CircuitOpen { .. } => ErrorCode::CircuitOpen,
        }
    }

    /// Classifies the error for the fallback walk.
    pub fn fallback_severity(&self) -> FallbackSeverity {
        match self {
            ProviderError::Unauthorized { .. } | ProviderError::BadRequest { .. } => {
                FallbackSeverity::NonRecoverable
            }
            _ => FallbackSeverity::Retryable,
        }
    }

    /// Whether this error represents caller cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProviderError::Cancelled { .. })
    }
}

/// Removes secrets from a diagnostic payload and truncates it.
///
/// Adapters pass every credential they hold; any occurrence in the payload
/// is replaced before the text is stored in an error.
pub fn redact_secrets(payload: &str, secrets: &[&str]) -> String {
    let mut text = payload.to_string();
    for secret in secrets {
        if !secret.is_empty() {
            text = text.replace(secret, "[redacted]");
        }
    }
    if text.len() > MAX_DETAIL_LEN {
        let mut end = MAX_DETAIL_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
        text.push_str("…");
    }
    text
}

/// Maps an HTTP status and (already redacted) body to an error variant.
pub fn map_http_error(
    provider: &str,
    model: Option<&str>,
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> ProviderError {
    let model_owned = model.map(str::to_string);
    match status {
        401 | 403 => ProviderError::Unauthorized {
            provider: provider.to_string(),
            model: model_owned,
            status: Some(status),
            detail: body.to_string(),
        },
        404 => ProviderError::NotFound {
            provider: provider.to_string(),
            model: model.unwrap_or("unknown").to_string(),
            detail: body.to_string(),
        },
        408 => ProviderError::Timeout {
            provider: provider.to_string(),
            model: model_owned,
        },
        429 => ProviderError::RateLimited {
            provider: provider.to_string(),
            model: model_owned,
            retry_after,
            detail: body.to_string(),
        },
        400 | 413 | 422 => ProviderError::BadRequest {
            provider: provider.to_string(),
            model: model_owned,
            status: Some(status),
            detail: body.to_string(),
        },
        _ => ProviderError::Internal {
            provider: provider.to_string(),
            model: model_owned,
            status: Some(status),
            detail: body.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_http_error("p", Some("m"), 401, None, ""),
            ProviderError::Unauthorized { .. }
        ));
        assert!(matches!(
            map_http_error("p", Some("m"), 404, None, ""),
            ProviderError::NotFound { .. }
        ));
        assert!(matches!(
            map_http_error("p", Some("m"), 429, Some(Duration::from_secs(3)), ""),
            ProviderError::RateLimited {
                retry_after: Some(_),
                ..
            }
        ));
        assert!(matches!(
            map_http_error("p", Some("m"), 500, None, ""),
            ProviderError::Internal {
                status: Some(500),
                ..
            }
        ));
    }

    #[test]
    fn test_fallback_severity() {
        let unauthorized = map_http_error("p", None, 401, None, "");
        assert_eq!(
            unauthorized.fallback_severity(),
            FallbackSeverity::NonRecoverable
        );
        let internal = map_http_error("p", None, 502, None, "");
        assert_eq!(internal.fallback_severity(), FallbackSeverity::Retryable);
    }

    #[test]
    fn test_redaction_removes_credentials() {
        let body = r#"{"error": "invalid key sk-live-abc123"}"#;
        let redacted = redact_secrets(body, &["sk-live-abc123"]);
        assert!(!redacted.contains("sk-live-abc123"));
        assert!(redacted.contains("[redacted]"));
    }

    #[test]
    fn test_redaction_truncates() {
        let long = "x".repeat(5000);
        let redacted = redact_secrets(&long, &[]);
        assert!(redacted.len() <= MAX_DETAIL_LEN + "…".len());
    }

    #[test]
    fn test_error_carries_provider_and_model() {
        let err = map_http_error("nvidia", Some("nemotron"), 404, None, "no such model");
        assert_eq!(err.provider(), "nvidia");
        assert_eq!(err.model(), Some("nemotron"));
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
