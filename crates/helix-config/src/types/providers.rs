//! Provider declarations.

use serde::{Deserialize, Serialize};

/// How a provider authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKindConfig {
    /// Remote endpoint authenticated by API key.
    #[serde(rename = "api-key")]
    ApiKey,
    /// Remote endpoint authenticated by an OAuth bearer token.
    #[serde(rename = "oauth")]
    Oauth,
    /// A local executable invoked per completion.
    #[serde(rename = "local")]
    Local,
}

/// A capability a provider advertises.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityConfig {
    Chat,
    Stream,
    Tools,
    Vision,
    Embeddings,
}

/// One configured provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Stable identifier, unique across the configuration.
    pub id: String,
    pub kind: ProviderKindConfig,
    /// Base URL for remote providers; executable path for local ones.
    pub endpoint: String,
    /// Name of the environment variable holding the credential. The value
    /// itself never enters the configuration.
    #[serde(default)]
    pub auth_env: Option<String>,
    /// Preference tier, 1 (best) through 6.
    #[serde(default = "default_tier")]
    pub tier: u8,
    /// Whether this provider is usable without paid quota.
    #[serde(default)]
    pub free: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Explicit model list; the registry verifies each entry independently.
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<CapabilityConfig>,
}

fn default_tier() -> u8 {
    3
}

fn default_enabled() -> bool {
    true
}

fn default_capabilities() -> Vec<CapabilityConfig> {
    vec![CapabilityConfig::Chat, CapabilityConfig::Stream]
}
