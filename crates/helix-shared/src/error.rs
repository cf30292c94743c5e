//! Core error taxonomy and the external error shape.
//!
//! Request-level failures use [`CoreError`]; everything that crosses the
//! external boundary is shaped into an [`ApiError`] carrying a stable
//! [`ErrorCode`] plus the request id and optional role/provider context.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stable error codes on the external boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    Unauthorized,
    RateLimited,
    NotFound,
    ProviderInternal,
    NetworkError,
    Timeout,
    CircuitOpen,
    InsufficientProviders,
    Overloaded,
    Cancelled,
    PartialDebate,
}

/// A request-level failure surfaced by the gateway.
///
/// Provider-level errors never appear here directly; they are recorded in
/// per-role attempt diagnostics and only escalate to a `CoreError` when the
/// request as a whole cannot produce an answer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    /// Malformed input; never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Team selection found no usable providers.
    #[error("insufficient providers: {0}")]
    InsufficientProviders(String),

    /// The global concurrency ceiling was reached; no queuing.
    #[error("request rejected: concurrency ceiling reached")]
    Overloaded,

    /// The caller cancelled the request.
    #[error("request cancelled by caller")]
    Cancelled,

    /// The request deadline elapsed before an answer could be produced.
    #[error("request deadline exceeded")]
    Timeout,
}

impl CoreError {
    /// The stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            CoreError::InsufficientProviders(_) => ErrorCode::InsufficientProviders,
            CoreError::Overloaded => ErrorCode::Overloaded,
            CoreError::Cancelled => ErrorCode::Cancelled,
            CoreError::Timeout => ErrorCode::Timeout,
        }
    }
}

/// The error shape returned to external callers, language-independent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
}

impl ApiError {
    /// Shapes a [`CoreError`] for the boundary.
    pub fn from_core(err: &CoreError, request_id: impl Into<String>) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            request_id: request_id.into(),
            role: None,
            provider: None,
            retry_after: None,
        }
    }

    /// Attaches the role that was executing when the error arose.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Attaches the provider that caused the error.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {:?}: {}", self.request_id, self.code, self.message)
    }
}

impl std::error::Error for ApiError {}
