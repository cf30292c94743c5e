//! # helix-config
//!
//! Typed configuration for HelixAgent. Every recognized option is a field on
//! a serde struct with `deny_unknown_fields`, so unrecognized keys are
//! rejected at load time rather than silently ignored.

pub mod loader;
pub mod types;
pub mod validation;

pub use loader::{load_config, load_from_str, ConfigFormat};
pub use types::{
    BreakerConfig, CapabilityConfig, ConsensusStrategyConfig, DebateConfig, HelixConfig,
    LimitsConfig, PromptOverrides, ProviderConfig, ProviderKindConfig, VerificationConfig,
};
pub use validation::{validate, ValidationError};
