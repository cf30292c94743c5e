//! Core types for the provider layer.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use helix_config::{CapabilityConfig, ProviderConfig, ProviderKindConfig};

/// How a provider authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "api-key")]
    ApiKey,
    #[serde(rename = "oauth")]
    Oauth,
    #[serde(rename = "local")]
    Local,
}

impl From<ProviderKindConfig> for ProviderKind {
    fn from(kind: ProviderKindConfig) -> Self {
        match kind {
            ProviderKindConfig::ApiKey => ProviderKind::ApiKey,
            ProviderKindConfig::Oauth => ProviderKind::Oauth,
            ProviderKindConfig::Local => ProviderKind::Local,
        }
    }
}

/// A capability a provider or model supports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Chat,
    Stream,
    Tools,
    Vision,
    Embeddings,
}

impl From<CapabilityConfig> for Capability {
    fn from(capability: CapabilityConfig) -> Self {
        match capability {
            CapabilityConfig::Chat => Capability::Chat,
            CapabilityConfig::Stream => Capability::Stream,
            CapabilityConfig::Tools => Capability::Tools,
            CapabilityConfig::Vision => Capability::Vision,
            CapabilityConfig::Embeddings => Capability::Embeddings,
        }
    }
}

/// A `(provider, model)` pair.
///
/// The halves are stored separately and joined with exactly one `/` at
/// render time, so a rendered reference can never accumulate provider
/// prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

impl ModelRef {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Builds a reference from a raw model id, stripping at most one
    /// leading `provider/` prefix if the raw id carries one.
    pub fn parse(provider: &str, raw: &str) -> Self {
        let model = raw
            .strip_prefix(provider)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(raw);
        Self::new(provider, model)
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// A configured provider as seen by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub kind: ProviderKind,
    /// Base URL for remote providers; executable path for local ones.
    pub endpoint: String,
    /// Environment variable holding the credential, if any.
    pub auth_env: Option<String>,
    /// Preference tier, 1 (best) through 6.
    pub tier: u8,
    pub capabilities: BTreeSet<Capability>,
    pub free: bool,
    pub enabled: bool,
}

impl ProviderDescriptor {
    /// Builds a descriptor from its configuration entry.
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            id: config.id.clone(),
            kind: config.kind.into(),
            endpoint: config.endpoint.clone(),
            auth_env: config.auth_env.clone(),
            tier: config.tier,
            capabilities: config.capabilities.iter().map(|&c| c.into()).collect(),
            free: config.free,
            enabled: config.enabled,
        }
    }

    /// Whether two descriptors refer to the same underlying endpoint, for
    /// deciding if verification state survives a reload.
    pub fn same_identity(&self, other: &ProviderDescriptor) -> bool {
        self.id == other.id && self.kind == other.kind && self.endpoint == other.endpoint
    }
}

/// One model of one provider, with its verification state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub provider: String,
    pub model: String,
    pub capabilities: BTreeSet<Capability>,
    /// Maximum context size in tokens; zero when unknown.
    pub context_window: u32,
    /// True only if this exact model was probed successfully. Sibling
    /// probes never set this.
    pub verified: bool,
    /// Set when the last probe hit a transient failure; stale models may
    /// serve as fallbacks but not as primaries.
    pub stale: bool,
    pub last_verified_at: Option<DateTime<Utc>>,
    /// Selection score in `[0, 1]`; unverified models score zero.
    pub score: f64,
}

impl ModelDescriptor {
    /// An unverified skeleton, as produced by `ProviderAdapter::models` or
    /// a configured model list.
    pub fn skeleton(
        provider: &str,
        raw_model: &str,
        capabilities: BTreeSet<Capability>,
    ) -> Self {
        let model_ref = ModelRef::parse(provider, raw_model);
        Self {
            provider: model_ref.provider,
            model: model_ref.model,
            capabilities,
            context_window: 0,
            verified: false,
            stale: false,
            last_verified_at: None,
            score: 0.0,
        }
    }

    pub fn model_ref(&self) -> ModelRef {
        ModelRef::new(&self.provider, &self.model)
    }

    /// Whether the last successful probe is within `window` of `now`.
    pub fn is_fresh(&self, window: Duration, now: DateTime<Utc>) -> bool {
        match self.last_verified_at {
            Some(at) => now
                .signed_duration_since(at)
                .to_std()
                .map(|age| age <= window)
                .unwrap_or(true),
            None => false,
        }
    }

    /// Whether this model may serve as a role primary.
    pub fn primary_eligible(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.verified && !self.stale && self.is_fresh(window, now)
    }

    /// Whether this model may appear in a fallback chain.
    pub fn fallback_eligible(&self) -> bool {
        self.verified
    }
}

/// Sampling parameters for a completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CompletionParams {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A finished non-streaming completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_ref_joins_with_one_separator() {
        let model_ref = ModelRef::new("nvidia", "llama-3.1-nemotron-70b-instruct");
        assert_eq!(model_ref.to_string(), "nvidia/llama-3.1-nemotron-70b-instruct");
    }

    #[test]
    fn test_parse_strips_at_most_one_prefix() {
        let model_ref = ModelRef::parse("nvidia", "nvidia/llama-3.1-nemotron-70b-instruct");
        assert_eq!(model_ref.model, "llama-3.1-nemotron-70b-instruct");
        assert_eq!(model_ref.to_string(), "nvidia/llama-3.1-nemotron-70b-instruct");

        // A different vendor's namespace inside the model id survives.
        let model_ref = ModelRef::parse("nvidia", "meta/llama-3.1-405b-instruct");
        assert_eq!(model_ref.model, "meta/llama-3.1-405b-instruct");
        assert_eq!(model_ref.to_string(), "nvidia/meta/llama-3.1-405b-instruct");
    }

    #[test]
    fn test_parse_is_idempotent() {
        let once = ModelRef::parse("nvidia", "nvidia/foo");
        let twice = ModelRef::parse("nvidia", &once.model);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_skeleton_is_unverified() {
        let model = ModelDescriptor::skeleton("openrouter", "gpt-4o-mini", BTreeSet::new());
        assert!(!model.verified);
        assert_eq!(model.score, 0.0);
        assert!(model.last_verified_at.is_none());
    }

    #[test]
    fn test_freshness_window() {
        let mut model = ModelDescriptor::skeleton("p", "m", BTreeSet::new());
        let now = Utc::now();
        model.verified = true;
        model.last_verified_at = Some(now - chrono::Duration::minutes(20));
        assert!(!model.primary_eligible(Duration::from_secs(900), now));
        assert!(model.fallback_eligible());

        model.last_verified_at = Some(now - chrono::Duration::minutes(5));
        assert!(model.primary_eligible(Duration::from_secs(900), now));
    }

    #[test]
    fn test_stale_blocks_primary_only() {
        let mut model = ModelDescriptor::skeleton("p", "m", BTreeSet::new());
        model.verified = true;
        model.stale = true;
        model.last_verified_at = Some(Utc::now());
        assert!(!model.primary_eligible(Duration::from_secs(900), Utc::now()));
        assert!(model.fallback_eligible());
    }
}
