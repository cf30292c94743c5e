//! # helix-provider
//!
//! The provider layer of HelixAgent: a uniform [`ProviderAdapter`] trait in
//! front of every remote or local LLM endpoint, the provider error taxonomy,
//! per-adapter circuit breaking, and the registry/verifier pair that keeps
//! an authoritative, refreshable view of which providers and models are
//! currently usable.

pub mod adapter;
pub mod adapters;
pub mod breaker;
pub mod error;
pub mod registry;
pub mod types;
pub mod verify;

pub use adapter::{HealthStatus, ProviderAdapter, TextStream};
pub use breaker::{BreakerSettings, BreakerState, CircuitBreaker, GuardedAdapter};
pub use error::{map_http_error, redact_secrets, FallbackSeverity, ProviderError};
pub use registry::{ProviderRegistry, RegistrySnapshot};
pub use types::{
    Capability, Completion, CompletionParams, ModelDescriptor, ModelRef, ProviderDescriptor,
    ProviderKind, Usage,
};
pub use verify::{ModelVerification, ProbeOutcome, Verifier, VerifySummary};
