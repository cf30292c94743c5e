//! Configuration types.
//!
//! Each sub-module covers one configuration area; [`HelixConfig`] composes
//! them. All structs deny unknown fields so typos fail loudly at load time.

use serde::{Deserialize, Serialize};

mod debate;
mod limits;
mod providers;
mod verification;

pub use debate::{ConsensusStrategyConfig, DebateConfig, PromptOverrides};
pub use limits::{BreakerConfig, LimitsConfig};
pub use providers::{CapabilityConfig, ProviderConfig, ProviderKindConfig};
pub use verification::VerificationConfig;

/// Root configuration record.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct HelixConfig {
    /// Declared providers and their credential references.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Debate orchestration options.
    #[serde(default)]
    pub debate: DebateConfig,
    /// Concurrency ceilings and deadlines.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Per-adapter circuit breaker parameters.
    #[serde(default)]
    pub circuit_breaker: BreakerConfig,
    /// Model verification options.
    #[serde(default)]
    pub verification: VerificationConfig,
}
