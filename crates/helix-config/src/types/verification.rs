//! Model verification options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Controls for the registry verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerificationConfig {
    /// How long a successful probe keeps a model fresh. Models verified
    /// longer ago are treated as stale: usable as fallbacks, never as
    /// primaries.
    #[serde(with = "humantime_serde", default = "default_fresh_window")]
    pub fresh_window: Duration,
    /// Budget for a single probe.
    #[serde(with = "humantime_serde", default = "default_probe_timeout")]
    pub probe_timeout: Duration,
    /// Deterministic short prompt sent when probing a model.
    #[serde(default = "default_probe_prompt")]
    pub probe_prompt: String,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            fresh_window: default_fresh_window(),
            probe_timeout: default_probe_timeout(),
            probe_prompt: default_probe_prompt(),
        }
    }
}

fn default_fresh_window() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_probe_prompt() -> String {
    "hi".to_string()
}
