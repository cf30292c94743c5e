//! The `ProviderAdapter` trait.
//!
//! Every concrete provider (OpenAI-compatible HTTP, local subprocess) hides
//! behind this trait. Callers never see provider-specific request shapes or
//! error formats.

use std::collections::BTreeSet;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::stream;

use helix_shared::Deadline;

use crate::error::ProviderError;
use crate::types::{Capability, Completion, CompletionParams, ModelDescriptor};

/// A pinned stream of text fragments from a streaming completion.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Result of a provider health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthStatus {
    pub available: bool,
    pub latency: Option<Duration>,
}

/// Uniform capability wrapper around one remote or local LLM endpoint.
///
/// All operations take an absolute [`Deadline`] and must fail with
/// [`ProviderError::Timeout`] rather than run past it. Implementations never
/// retry internally; retry policy belongs to the fallback chain above.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The stable provider id this adapter serves.
    fn id(&self) -> &str;

    /// Capabilities this provider advertises.
    fn capabilities(&self) -> BTreeSet<Capability>;

    /// Performs one completion against `model`.
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        params: &CompletionParams,
        deadline: Deadline,
    ) -> Result<Completion, ProviderError>;

    /// Performs one streaming completion against `model`.
    ///
    /// The default implementation covers providers without native
    /// streaming: it runs [`ProviderAdapter::complete`] and emits the full
    /// response as a single fragment. Token-level pacing is never
    /// fabricated.
    async fn complete_stream(
        &self,
        model: &str,
        prompt: &str,
        params: &CompletionParams,
        deadline: Deadline,
    ) -> Result<TextStream, ProviderError> {
        let completion = self.complete(model, prompt, params, deadline).await?;
        Ok(Box::pin(stream::iter([Ok(completion.text)])))
    }

    /// Probes whether the provider endpoint is reachable.
    async fn health_check(&self, deadline: Deadline) -> Result<HealthStatus, ProviderError>;

    /// Lists models this provider offers, as unverified skeletons.
    async fn models(&self) -> Result<Vec<ModelDescriptor>, ProviderError>;
}
