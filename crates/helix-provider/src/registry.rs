//! Provider and model registry.
//!
//! The registry is the authoritative view of configured providers and
//! their models. Readers take an immutable [`RegistrySnapshot`] behind an
//! `Arc` and never hold a lock across adapter calls; every mutation
//! (reload, verification results) builds a new snapshot and swaps it in.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use tracing::{info, warn};

use helix_config::HelixConfig;

use crate::adapter::ProviderAdapter;
use crate::adapters::{OpenAiAdapter, SubprocessAdapter};
use crate::breaker::{BreakerSettings, GuardedAdapter};
use crate::types::{ModelDescriptor, ProviderDescriptor, ProviderKind};
use crate::verify::{ModelVerification, ProbeOutcome};

/// An immutable, point-in-time view of providers, models, and adapters.
pub struct RegistrySnapshot {
    providers: BTreeMap<String, ProviderDescriptor>,
    /// Sorted by `(provider, model)` so iteration order is deterministic.
    models: Vec<ModelDescriptor>,
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl RegistrySnapshot {
    /// Assembles a snapshot. Models are re-sorted to keep iteration
    /// deterministic regardless of input order.
    pub fn new(
        providers: BTreeMap<String, ProviderDescriptor>,
        mut models: Vec<ModelDescriptor>,
        adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    ) -> Self {
        models.sort_by(|a, b| (&a.provider, &a.model).cmp(&(&b.provider, &b.model)));
        Self {
            providers,
            models,
            adapters,
        }
    }

    pub fn providers(&self) -> &BTreeMap<String, ProviderDescriptor> {
        &self.providers
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderDescriptor> {
        self.providers.get(id)
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn model(&self, provider: &str, model: &str) -> Option<&ModelDescriptor> {
        self.models
            .iter()
            .find(|m| m.provider == provider && m.model == model)
    }

    /// Models belonging to one provider.
    pub fn provider_models<'a>(&'a self, provider: &'a str) -> impl Iterator<Item = &'a ModelDescriptor> {
        self.models.iter().filter(move |m| m.provider == provider)
    }

    pub fn adapter(&self, provider: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider).cloned()
    }
}

impl fmt::Debug for RegistrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrySnapshot")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("models", &self.models.len())
            .finish()
    }
}

/// The registry itself: holds the current snapshot and rebuilds it on
/// reload or verification.
pub struct ProviderRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
    breaker: BreakerSettings,
    max_in_flight: usize,
}

impl ProviderRegistry {
    /// Builds the registry from configuration, constructing one guarded
    /// adapter per enabled provider.
    pub fn from_config(config: &HelixConfig) -> Result<Self> {
        let breaker = BreakerSettings::from(&config.circuit_breaker);
        let max_in_flight = config.limits.max_in_flight;
        let snapshot = build_snapshot(config, breaker, max_in_flight, None);
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
            breaker,
            max_in_flight,
        })
    }

    /// The current immutable snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.read().unwrap().clone()
    }

    /// Rebuilds the descriptor set from configuration, preserving
    /// verification state for providers and models whose identity is
    /// unchanged.
    pub fn reload(&self, config: &HelixConfig) -> Result<()> {
        let prior = self.snapshot();
        let snapshot = build_snapshot(config, self.breaker, self.max_in_flight, Some(&prior));
        info!(
            providers = snapshot.providers.len(),
            models = snapshot.models.len(),
            "registry reloaded"
        );
        self.publish(snapshot);
        Ok(())
    }

    /// Adds model skeletons discovered by the verifier for providers whose
    /// configuration listed none. Already-known models are left untouched.
    pub fn add_models(&self, discovered: Vec<ModelDescriptor>) {
        if discovered.is_empty() {
            return;
        }
        let prior = self.snapshot();
        let mut models = prior.models.clone();
        for candidate in discovered {
            let known = models
                .iter()
                .any(|m| m.provider == candidate.provider && m.model == candidate.model);
            if !known {
                models.push(candidate);
            }
        }
        let snapshot =
            RegistrySnapshot::new(prior.providers.clone(), models, prior.adapters.clone());
        self.publish(snapshot);
    }

    /// Applies per-model verification outcomes, copy-on-write.
    ///
    /// Each outcome touches exactly the model it names; sibling models of
    /// the same provider are never updated transitively.
    pub fn apply_verifications(&self, outcomes: &[ModelVerification]) {
        if outcomes.is_empty() {
            return;
        }
        let prior = self.snapshot();
        let mut models = prior.models.clone();
        for outcome in outcomes {
            let Some(model) = models
                .iter_mut()
                .find(|m| m.provider == outcome.provider && m.model == outcome.model)
            else {
                warn!(
                    provider = %outcome.provider,
                    model = %outcome.model,
                    "verification outcome for unknown model"
                );
                continue;
            };
            match &outcome.outcome {
                ProbeOutcome::Success { score } => {
                    model.verified = true;
                    model.stale = false;
                    model.last_verified_at = Some(outcome.at);
                    model.score = *score;
                }
                ProbeOutcome::NotFound => {
                    model.verified = false;
                    model.stale = false;
                    model.score = 0.0;
                }
                ProbeOutcome::Transient { .. } => {
                    // Retain the previous verification, but flag it.
                    model.stale = true;
                }
                ProbeOutcome::Failed { .. } => {
                    model.verified = false;
                    model.score = 0.0;
                }
            }
        }
        let snapshot =
            RegistrySnapshot::new(prior.providers.clone(), models, prior.adapters.clone());
        self.publish(snapshot);
    }

    fn publish(&self, snapshot: RegistrySnapshot) {
        *self.current.write().unwrap() = Arc::new(snapshot);
    }
}

fn build_adapter(
    descriptor: &ProviderDescriptor,
    breaker: BreakerSettings,
    max_in_flight: usize,
) -> Arc<dyn ProviderAdapter> {
    let base: Arc<dyn ProviderAdapter> = match descriptor.kind {
        ProviderKind::ApiKey | ProviderKind::Oauth => {
            Arc::new(OpenAiAdapter::from_descriptor(descriptor))
        }
        ProviderKind::Local => Arc::new(SubprocessAdapter::from_descriptor(descriptor)),
    };
    Arc::new(GuardedAdapter::new(base, breaker, max_in_flight))
}

fn build_snapshot(
    config: &HelixConfig,
    breaker: BreakerSettings,
    max_in_flight: usize,
    prior: Option<&RegistrySnapshot>,
) -> RegistrySnapshot {
    let mut providers = BTreeMap::new();
    let mut models = Vec::new();
    let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();

    for provider_config in &config.providers {
        let descriptor = ProviderDescriptor::from_config(provider_config);
        if !descriptor.enabled {
            continue;
        }

        let identity_unchanged = prior
            .and_then(|p| p.provider(&descriptor.id))
            .map(|old| old.same_identity(&descriptor))
            .unwrap_or(false);

        for raw_model in &provider_config.models {
            let skeleton = ModelDescriptor::skeleton(
                &descriptor.id,
                raw_model,
                descriptor.capabilities.clone(),
            );
            let carried = if identity_unchanged {
                prior
                    .and_then(|p| p.model(&skeleton.provider, &skeleton.model))
                    .cloned()
            } else {
                None
            };
            models.push(carried.unwrap_or(skeleton));
        }

        // Models discovered at runtime (not in configuration) survive a
        // reload only while the provider identity is unchanged.
        if identity_unchanged {
            if let Some(p) = prior {
                for old_model in p.provider_models(&descriptor.id) {
                    let configured = models
                        .iter()
                        .any(|m| m.provider == old_model.provider && m.model == old_model.model);
                    if !configured {
                        models.push(old_model.clone());
                    }
                }
            }
        }

        adapters.insert(
            descriptor.id.clone(),
            build_adapter(&descriptor, breaker, max_in_flight),
        );
        providers.insert(descriptor.id.clone(), descriptor);
    }

    RegistrySnapshot::new(providers, models, adapters)
}
