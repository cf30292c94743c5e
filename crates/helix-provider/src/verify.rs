//! Model verification.
//!
//! Each listed model of each enabled provider is probed independently with
//! a minimal completion. Outcomes are aggregated into the registry one
//! model at a time: a provider-level probe never verifies siblings.
//! Probes across providers run in parallel up to a configured cap; probes
//! within one provider are serialized to avoid rate-limit storms.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use helix_config::VerificationConfig;
use helix_shared::Deadline;

use crate::adapter::ProviderAdapter;
use crate::error::ProviderError;
use crate::registry::ProviderRegistry;
use crate::types::{CompletionParams, ModelDescriptor};

/// Outcome of one model probe.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// The probe completed; the model is verified with this score.
    Success { score: f64 },
    /// The provider does not know this model id.
    NotFound,
    /// A transient failure (rate limit, network, timeout). Previous
    /// verification state is retained but marked stale.
    Transient { reason: String },
    /// A non-transient failure; the model is unverified.
    Failed { reason: String },
}

/// One model's verification result.
#[derive(Debug, Clone)]
pub struct ModelVerification {
    pub provider: String,
    pub model: String,
    pub outcome: ProbeOutcome,
    pub latency: Option<Duration>,
    pub at: DateTime<Utc>,
}

/// Aggregate counts from a verification sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifySummary {
    pub probed: usize,
    pub verified: usize,
    pub not_found: usize,
    pub transient: usize,
    pub failed: usize,
}

/// Derives a selection score from probe latency.
pub fn score_from_latency(latency: Duration) -> f64 {
    (1.0 / (1.0 + latency.as_secs_f64())).clamp(0.05, 1.0)
}

/// Runs verification sweeps against a registry.
pub struct Verifier {
    registry: Arc<ProviderRegistry>,
    settings: VerificationConfig,
    max_parallel: usize,
}

impl Verifier {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        settings: VerificationConfig,
        max_parallel: usize,
    ) -> Self {
        Self {
            registry,
            settings,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Probes every model of every enabled provider and publishes the
    /// outcomes.
    pub async fn verify_all(&self, deadline: Deadline) -> Result<VerifySummary> {
        let snapshot = self.registry.snapshot();
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut tasks = JoinSet::new();

        for (provider_id, descriptor) in snapshot.providers() {
            if !descriptor.enabled {
                continue;
            }
            let Some(adapter) = snapshot.adapter(provider_id) else {
                warn!(provider = %provider_id, "no adapter for provider, skipping");
                continue;
            };
            let models: Vec<ModelDescriptor> =
                snapshot.provider_models(provider_id).cloned().collect();
            let settings = self.settings.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(probe_provider(adapter, models, settings, semaphore, deadline));
        }

        let mut discovered = Vec::new();
        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((mut found, mut verified)) => {
                    discovered.append(&mut found);
                    outcomes.append(&mut verified);
                }
                Err(e) => warn!(error = %e, "verification task panicked"),
            }
        }

        self.registry.add_models(discovered);
        self.registry.apply_verifications(&outcomes);

        let mut summary = VerifySummary {
            probed: outcomes.len(),
            ..VerifySummary::default()
        };
        for outcome in &outcomes {
            match outcome.outcome {
                ProbeOutcome::Success { .. } => summary.verified += 1,
                ProbeOutcome::NotFound => summary.not_found += 1,
                ProbeOutcome::Transient { .. } => summary.transient += 1,
                ProbeOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        info!(
            probed = summary.probed,
            verified = summary.verified,
            not_found = summary.not_found,
            transient = summary.transient,
            failed = summary.failed,
            "verification sweep complete"
        );
        Ok(summary)
    }
}

/// Probes all models of one provider, serialized, each independently.
async fn probe_provider(
    adapter: Arc<dyn ProviderAdapter>,
    mut models: Vec<ModelDescriptor>,
    settings: VerificationConfig,
    semaphore: Arc<Semaphore>,
    deadline: Deadline,
) -> (Vec<ModelDescriptor>, Vec<ModelVerification>) {
    let Ok(_permit) = semaphore.acquire().await else {
        return (Vec::new(), Vec::new());
    };

    let mut discovered = Vec::new();
    if models.is_empty() {
        match adapter.models().await {
            Ok(listed) => {
                discovered = listed.clone();
                models = listed;
            }
            Err(e) => {
                warn!(provider = adapter.id(), error = %e, "model discovery failed");
                return (Vec::new(), Vec::new());
            }
        }
    }

    let params = CompletionParams {
        temperature: Some(0.0),
        max_tokens: Some(1),
    };
    let mut outcomes = Vec::with_capacity(models.len());
    for model in &models {
        if deadline.expired() {
            outcomes.push(ModelVerification {
                provider: model.provider.clone(),
                model: model.model.clone(),
                outcome: ProbeOutcome::Transient {
                    reason: "verification deadline reached before probe".to_string(),
                },
                latency: None,
                at: Utc::now(),
            });
            continue;
        }

        let probe_deadline = deadline.child(settings.probe_timeout);
        let started = Instant::now();
        let result = adapter
            .complete(&model.model, &settings.probe_prompt, &params, probe_deadline)
            .await;
        let latency = started.elapsed();

        let outcome = match result {
            Ok(_) => ProbeOutcome::Success {
                score: score_from_latency(latency),
            },
            Err(ProviderError::NotFound { .. }) => ProbeOutcome::NotFound,
            Err(
                e @ (ProviderError::RateLimited { .. }
                | ProviderError::Network { .. }
                | ProviderError::Timeout { .. }
                | ProviderError::CircuitOpen { .. }
                | ProviderError::Cancelled { .. }),
            ) => ProbeOutcome::Transient {
                reason: e.to_string(),
            },
            Err(e) => ProbeOutcome::Failed {
                reason: e.to_string(),
            },
        };
        debug!(
            provider = %model.provider,
            model = %model.model,
            ?outcome,
            latency_ms = latency.as_millis() as u64,
            "model probed"
        );
        outcomes.push(ModelVerification {
            provider: model.provider.clone(),
            model: model.model.clone(),
            outcome,
            latency: Some(latency),
            at: Utc::now(),
        });
    }
    (discovered, outcomes)
}
