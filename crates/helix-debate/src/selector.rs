//! Team selection.
//!
//! Given a registry snapshot, a policy, and the seed derived from the
//! request id, picks five role primaries plus an ordered fallback chain per
//! role. Selection is fully deterministic: the same snapshot, policy, and
//! seed always produce byte-identical teams.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use helix_provider::{Capability, ModelDescriptor, ModelRef, ProviderKind, RegistrySnapshot};
use helix_shared::stable_hash_parts;

use crate::role::ROLE_ORDER;
use crate::types::{DebateTeam, RoleAssignment};

/// Selection policy, resolved from configuration plus per-request
/// overrides.
#[derive(Debug, Clone)]
pub struct SelectorPolicy {
    pub preferred_providers: Vec<String>,
    pub forbidden_providers: Vec<String>,
    pub free_only: bool,
    pub allow_oauth: bool,
    /// Maximum fallback chain length per role.
    pub fallback_depth: usize,
    /// Staleness window for primary eligibility.
    pub fresh_window: Duration,
}

impl Default for SelectorPolicy {
    fn default() -> Self {
        Self {
            preferred_providers: Vec::new(),
            forbidden_providers: Vec::new(),
            free_only: false,
            allow_oauth: true,
            fallback_depth: 2,
            fresh_window: Duration::from_secs(15 * 60),
        }
    }
}

/// Team selection failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SelectError {
    #[error("insufficient providers: {0}")]
    InsufficientProviders(String),
}

/// A selected team plus selection diagnostics.
#[derive(Debug, Clone)]
pub struct TeamSelection {
    pub team: DebateTeam,
    /// Set when fewer than five distinct providers forced a second primary
    /// on this provider.
    pub relaxed_provider: Option<String>,
}

fn tie_hash(model: &ModelDescriptor, seed: u64) -> u64 {
    stable_hash_parts(&[
        model.provider.as_bytes(),
        model.model.as_bytes(),
        &seed.to_be_bytes(),
    ])
}

/// Ranking: preferred providers first, then score (descending), then tier
/// (ascending), then the seed-stable hash.
fn rank_cmp(
    a: &ModelDescriptor,
    b: &ModelDescriptor,
    snapshot: &RegistrySnapshot,
    policy: &SelectorPolicy,
    seed: u64,
) -> Ordering {
    let tier = |m: &ModelDescriptor| snapshot.provider(&m.provider).map_or(6, |p| p.tier);
    let not_preferred = |m: &ModelDescriptor| !policy.preferred_providers.contains(&m.provider);
    not_preferred(a)
        .cmp(&not_preferred(b))
        .then(b.score.total_cmp(&a.score))
        .then(tier(a).cmp(&tier(b)))
        .then(tie_hash(a, seed).cmp(&tie_hash(b, seed)))
}

/// The provider with the most primary-eligible models; ties break to the
/// lexicographically smallest id.
fn richest_provider(pool: &[ModelDescriptor]) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for model in pool {
        *counts.entry(model.provider.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(id_a, count_a), (id_b, count_b)| {
            count_a.cmp(count_b).then(id_b.cmp(id_a))
        })
        .map(|(id, _)| id.to_string())
}

/// Selects a debate team from the snapshot.
pub fn select_team(
    snapshot: &RegistrySnapshot,
    policy: &SelectorPolicy,
    seed: u64,
    now: DateTime<Utc>,
) -> Result<TeamSelection, SelectError> {
    // Filter to chat-capable verified models the policy admits. Stale
    // models stay eligible for fallback chains only.
    let mut primary_pool: Vec<ModelDescriptor> = Vec::new();
    let mut fallback_pool: Vec<ModelDescriptor> = Vec::new();
    for model in snapshot.models() {
        let Some(provider) = snapshot.provider(&model.provider) else {
            continue;
        };
        if !provider.enabled
            || policy.forbidden_providers.contains(&model.provider)
            || (policy.free_only && !provider.free)
            || (!policy.allow_oauth && provider.kind == ProviderKind::Oauth)
            || !model.capabilities.contains(&Capability::Chat)
            || !model.fallback_eligible()
        {
            continue;
        }
        fallback_pool.push(model.clone());
        if model.primary_eligible(policy.fresh_window, now) {
            primary_pool.push(model.clone());
        }
    }

    if primary_pool.is_empty() {
        return Err(SelectError::InsufficientProviders(
            "no verified, fresh chat models match the request policy".to_string(),
        ));
    }

    primary_pool.sort_by(|a, b| rank_cmp(a, b, snapshot, policy, seed));
    fallback_pool.sort_by(|a, b| rank_cmp(a, b, snapshot, policy, seed));

    // Assign primaries in fixed role order, one provider each while the
    // pool allows it.
    let mut used_providers: BTreeSet<String> = BTreeSet::new();
    let mut used_models: BTreeSet<ModelRef> = BTreeSet::new();
    let mut primaries: Vec<ModelDescriptor> = Vec::with_capacity(ROLE_ORDER.len());
    let mut relaxed_provider: Option<String> = None;

    for role in ROLE_ORDER {
        let diverse_pick = primary_pool
            .iter()
            .find(|m| {
                !used_providers.contains(&m.provider) && !used_models.contains(&m.model_ref())
            })
            .cloned();

        let pick = match diverse_pick {
            Some(model) => model,
            None => {
                // Fewer distinct providers than roles: allow extra
                // primaries, preferring unused models on the richest
                // provider. The relaxation is deterministic and logged.
                if relaxed_provider.is_none() {
                    relaxed_provider = richest_provider(&primary_pool);
                    warn!(
                        role = %role,
                        provider = relaxed_provider.as_deref().unwrap_or_default(),
                        "fewer than five distinct providers; relaxing primary diversity"
                    );
                }
                let richest = relaxed_provider.as_deref().unwrap_or_default();
                primary_pool
                    .iter()
                    .find(|m| m.provider == richest && !used_models.contains(&m.model_ref()))
                    .or_else(|| {
                        primary_pool
                            .iter()
                            .find(|m| !used_models.contains(&m.model_ref()))
                    })
                    .cloned()
                    // Every model already carries a role: reuse the best.
                    .unwrap_or_else(|| primary_pool[0].clone())
            }
        };
        used_providers.insert(pick.provider.clone());
        used_models.insert(pick.model_ref());
        primaries.push(pick);
    }

    // Build fallback chains: score order, other roles' unchosen candidates
    // first, providers different from the role's own primary when the pool
    // allows it.
    let mut assignments = Vec::with_capacity(ROLE_ORDER.len());
    for (role, primary) in ROLE_ORDER.into_iter().zip(primaries) {
        let mut fallbacks: Vec<ModelDescriptor> = Vec::new();
        let mut chain_providers: BTreeSet<&str> = BTreeSet::new();
        chain_providers.insert(primary.provider.as_str());

        // Pass 1: unchosen candidates on providers not yet in this chain.
        for model in &fallback_pool {
            if fallbacks.len() >= policy.fallback_depth {
                break;
            }
            if model.model_ref() == primary.model_ref()
                || used_models.contains(&model.model_ref())
                || chain_providers.contains(model.provider.as_str())
                || fallbacks.iter().any(|f| f.model_ref() == model.model_ref())
            {
                continue;
            }
            chain_providers.insert(model.provider.as_str());
            fallbacks.push(model.clone());
        }

        // Pass 2: the pool was too small for full diversity; fill from
        // anything that is not this role's primary.
        if fallbacks.len() < policy.fallback_depth {
            for model in &fallback_pool {
                if fallbacks.len() >= policy.fallback_depth {
                    break;
                }
                if model.model_ref() == primary.model_ref()
                    || fallbacks.iter().any(|f| f.model_ref() == model.model_ref())
                {
                    continue;
                }
                fallbacks.push(model.clone());
            }
        }

        assignments.push(RoleAssignment {
            role,
            primary,
            fallbacks,
        });
    }

    Ok(TeamSelection {
        team: DebateTeam::from_assignments(assignments),
        relaxed_provider,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use helix_provider::{ProviderDescriptor, ProviderKind};

    fn descriptor(id: &str, tier: u8, free: bool, kind: ProviderKind) -> ProviderDescriptor {
        ProviderDescriptor {
            id: id.to_string(),
            kind,
            endpoint: format!("https://{id}.example"),
            auth_env: None,
            tier,
            capabilities: [Capability::Chat].into_iter().collect(),
            free,
            enabled: true,
        }
    }

    fn verified_model(provider: &str, model: &str, score: f64) -> ModelDescriptor {
        let mut descriptor = ModelDescriptor::skeleton(
            provider,
            model,
            [Capability::Chat].into_iter().collect(),
        );
        descriptor.verified = true;
        descriptor.score = score;
        descriptor.last_verified_at = Some(Utc::now());
        descriptor
    }

    fn snapshot_of(
        providers: Vec<ProviderDescriptor>,
        models: Vec<ModelDescriptor>,
    ) -> RegistrySnapshot {
        let map = providers.into_iter().map(|p| (p.id.clone(), p)).collect();
        RegistrySnapshot::new(map, models, HashMap::new())
    }

    fn five_provider_snapshot() -> RegistrySnapshot {
        let providers = ["a", "b", "c", "d", "e"]
            .into_iter()
            .map(|id| descriptor(id, 3, false, ProviderKind::ApiKey))
            .collect();
        let models = vec![
            verified_model("a", "model-a", 0.9),
            verified_model("b", "model-b", 0.85),
            verified_model("c", "model-c", 0.8),
            verified_model("d", "model-d", 0.75),
            verified_model("e", "model-e", 0.7),
        ];
        snapshot_of(providers, models)
    }

    #[test]
    fn test_five_providers_each_used_once() {
        let selection =
            select_team(&five_provider_snapshot(), &SelectorPolicy::default(), 7, Utc::now())
                .unwrap();
        let providers: BTreeSet<String> = selection
            .team
            .iter()
            .map(|a| a.primary.provider.clone())
            .collect();
        assert_eq!(providers.len(), 5);
        assert!(selection.relaxed_provider.is_none());
        // Best score goes to the first role.
        assert_eq!(selection.team.get(crate::DebateRole::Analyst).primary.provider, "a");
    }

    #[test]
    fn test_selection_is_deterministic() {
        let snapshot = five_provider_snapshot();
        let policy = SelectorPolicy::default();
        let now = Utc::now();
        let first = select_team(&snapshot, &policy, 42, now).unwrap();
        let second = select_team(&snapshot, &policy, 42, now).unwrap();
        assert_eq!(first.team, second.team);
    }

    #[test]
    fn test_score_tie_breaks_by_tier_then_hash() {
        let providers = vec![
            descriptor("low-tier", 1, false, ProviderKind::ApiKey),
            descriptor("high-tier", 5, false, ProviderKind::ApiKey),
        ];
        let models = vec![
            verified_model("high-tier", "m-high", 0.8),
            verified_model("low-tier", "m-low", 0.8),
        ];
        let snapshot = snapshot_of(providers, models);
        let selection =
            select_team(&snapshot, &SelectorPolicy::default(), 1, Utc::now()).unwrap();
        assert_eq!(
            selection.team.get(crate::DebateRole::Analyst).primary.provider,
            "low-tier"
        );
    }

    #[test]
    fn test_relaxation_with_two_providers() {
        let providers = vec![
            descriptor("rich", 3, false, ProviderKind::ApiKey),
            descriptor("poor", 3, false, ProviderKind::ApiKey),
        ];
        let models = vec![
            verified_model("rich", "r1", 0.9),
            verified_model("rich", "r2", 0.8),
            verified_model("rich", "r3", 0.7),
            verified_model("rich", "r4", 0.6),
            verified_model("poor", "p1", 0.85),
        ];
        let snapshot = snapshot_of(providers, models);
        let selection =
            select_team(&snapshot, &SelectorPolicy::default(), 3, Utc::now()).unwrap();
        // Still five primaries.
        assert_eq!(selection.team.iter().count(), 5);
        assert_eq!(selection.relaxed_provider.as_deref(), Some("rich"));
    }

    #[test]
    fn test_single_model_pool_fills_all_roles() {
        let providers = vec![descriptor("solo", 3, true, ProviderKind::Local)];
        let models = vec![verified_model("solo", "only-model", 0.5)];
        let snapshot = snapshot_of(providers, models);
        let selection =
            select_team(&snapshot, &SelectorPolicy::default(), 9, Utc::now()).unwrap();
        for assignment in selection.team.iter() {
            assert_eq!(assignment.primary.model, "only-model");
            assert!(assignment.fallbacks.is_empty());
        }
    }

    #[test]
    fn test_empty_pool_is_insufficient() {
        let snapshot = snapshot_of(vec![], vec![]);
        let err = select_team(&snapshot, &SelectorPolicy::default(), 0, Utc::now()).unwrap_err();
        assert!(matches!(err, SelectError::InsufficientProviders(_)));
    }

    #[test]
    fn test_unverified_models_never_selected() {
        let providers = vec![descriptor("p", 3, false, ProviderKind::ApiKey)];
        let mut unverified = verified_model("p", "ghost", 0.9);
        unverified.verified = false;
        let snapshot = snapshot_of(providers, vec![unverified]);
        assert!(select_team(&snapshot, &SelectorPolicy::default(), 0, Utc::now()).is_err());
    }

    #[test]
    fn test_stale_models_fallback_only() {
        let providers = vec![
            descriptor("fresh", 3, false, ProviderKind::ApiKey),
            descriptor("stale", 3, false, ProviderKind::ApiKey),
        ];
        let mut stale = verified_model("stale", "stale-model", 0.99);
        stale.stale = true;
        let models = vec![verified_model("fresh", "fresh-model", 0.5), stale];
        let snapshot = snapshot_of(providers, models);
        let selection =
            select_team(&snapshot, &SelectorPolicy::default(), 0, Utc::now()).unwrap();
        for assignment in selection.team.iter() {
            assert_eq!(assignment.primary.model, "fresh-model");
        }
        // The stale model still shows up as a fallback.
        assert!(selection
            .team
            .get(crate::DebateRole::Analyst)
            .fallbacks
            .iter()
            .any(|m| m.model == "stale-model"));
    }

    #[test]
    fn test_policy_filters_apply() {
        let providers = vec![
            descriptor("paid", 2, false, ProviderKind::ApiKey),
            descriptor("free", 4, true, ProviderKind::ApiKey),
            descriptor("oauth", 1, true, ProviderKind::Oauth),
        ];
        let models = vec![
            verified_model("paid", "m-paid", 0.9),
            verified_model("free", "m-free", 0.5),
            verified_model("oauth", "m-oauth", 0.95),
        ];
        let snapshot = snapshot_of(providers, models);
        let policy = SelectorPolicy {
            free_only: true,
            allow_oauth: false,
            ..SelectorPolicy::default()
        };
        let selection = select_team(&snapshot, &policy, 0, Utc::now()).unwrap();
        for assignment in selection.team.iter() {
            assert_eq!(assignment.primary.provider, "free");
        }
    }

    #[test]
    fn test_fallback_chains_prefer_other_providers() {
        let selection =
            select_team(&five_provider_snapshot(), &SelectorPolicy::default(), 7, Utc::now())
                .unwrap();
        for assignment in selection.team.iter() {
            for fallback in &assignment.fallbacks {
                assert_ne!(fallback.provider, assignment.primary.provider);
                assert_ne!(fallback.model_ref(), assignment.primary.model_ref());
            }
        }
    }
}
