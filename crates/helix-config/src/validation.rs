//! Cross-field configuration validation.

use crate::types::HelixConfig;

/// A configuration that parsed but is semantically invalid.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("provider id must be non-empty")]
    EmptyProviderId,
    #[error("duplicate provider id '{0}'")]
    DuplicateProviderId(String),
    #[error("provider '{id}' tier {tier} out of range (expected 1..=6)")]
    TierOutOfRange { id: String, tier: u8 },
    #[error("debate.roles must be exactly [analyst, proposer, critic, synthesis, mediator] in that order")]
    RolesNotFixed,
    #[error("debate.rounds_max must be at least 1")]
    RoundsZero,
    #[error("limits.role_deadline must be at most limits.request_deadline / 5")]
    RoleDeadlineTooLarge,
    #[error("limits.{0} must be at least 1")]
    ZeroLimit(&'static str),
    #[error("circuit_breaker.threshold must be within (0, 1]")]
    ThresholdOutOfRange,
    #[error("circuit_breaker.window must be at least 1")]
    WindowZero,
}

/// Validates a parsed configuration.
pub fn validate(config: &HelixConfig) -> Result<(), ValidationError> {
    let mut seen = std::collections::HashSet::new();
    for provider in &config.providers {
        if provider.id.is_empty() {
            return Err(ValidationError::EmptyProviderId);
        }
        if !seen.insert(provider.id.as_str()) {
            return Err(ValidationError::DuplicateProviderId(provider.id.clone()));
        }
        if !(1..=6).contains(&provider.tier) {
            return Err(ValidationError::TierOutOfRange {
                id: provider.id.clone(),
                tier: provider.tier,
            });
        }
    }

    let expected_roles = ["analyst", "proposer", "critic", "synthesis", "mediator"];
    if config.debate.roles.len() != expected_roles.len()
        || config
            .debate
            .roles
            .iter()
            .zip(expected_roles)
            .any(|(have, want)| have != want)
    {
        return Err(ValidationError::RolesNotFixed);
    }
    if config.debate.rounds_max == 0 {
        return Err(ValidationError::RoundsZero);
    }

    if config.limits.role_deadline > config.limits.request_deadline / 5 {
        return Err(ValidationError::RoleDeadlineTooLarge);
    }
    if config.limits.max_concurrent_requests == 0 {
        return Err(ValidationError::ZeroLimit("max_concurrent_requests"));
    }
    if config.limits.max_concurrent_verifications == 0 {
        return Err(ValidationError::ZeroLimit("max_concurrent_verifications"));
    }
    if config.limits.max_in_flight == 0 {
        return Err(ValidationError::ZeroLimit("max_in_flight"));
    }

    if !(config.circuit_breaker.threshold > 0.0 && config.circuit_breaker.threshold <= 1.0) {
        return Err(ValidationError::ThresholdOutOfRange);
    }
    if config.circuit_breaker.window == 0 {
        return Err(ValidationError::WindowZero);
    }

    Ok(())
}
