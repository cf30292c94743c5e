//! Concurrency ceilings, deadlines, and breaker parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Deadlines and concurrency limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Wall-clock budget for one request.
    #[serde(with = "humantime_serde", default = "default_request_deadline")]
    pub request_deadline: Duration,
    /// Budget for one role, at most `request_deadline / 5`.
    #[serde(with = "humantime_serde", default = "default_role_deadline")]
    pub role_deadline: Duration,
    /// A role is skipped when less than this remains before it would start.
    #[serde(with = "humantime_serde", default = "default_min_role_budget")]
    pub min_role_budget: Duration,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_max_concurrent_verifications")]
    pub max_concurrent_verifications: usize,
    /// In-flight call cap per provider adapter.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            request_deadline: default_request_deadline(),
            role_deadline: default_role_deadline(),
            min_role_budget: default_min_role_budget(),
            max_concurrent_requests: default_max_concurrent_requests(),
            max_concurrent_verifications: default_max_concurrent_verifications(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

fn default_request_deadline() -> Duration {
    Duration::from_secs(120)
}

fn default_role_deadline() -> Duration {
    Duration::from_secs(20)
}

fn default_min_role_budget() -> Duration {
    Duration::from_millis(500)
}

fn default_max_concurrent_requests() -> usize {
    32
}

fn default_max_concurrent_verifications() -> usize {
    8
}

fn default_max_in_flight() -> usize {
    4
}

/// Per-adapter circuit breaker parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerConfig {
    /// Failure ratio over the window that opens the circuit.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Number of recent call outcomes kept in the sliding window.
    #[serde(default = "default_window")]
    pub window: usize,
    /// How long an open circuit waits before probing half-open.
    #[serde(with = "humantime_serde", default = "default_cooldown")]
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            window: default_window(),
            cooldown: default_cooldown(),
        }
    }
}

fn default_threshold() -> f64 {
    0.5
}

fn default_window() -> usize {
    20
}

fn default_cooldown() -> Duration {
    Duration::from_secs(30)
}
