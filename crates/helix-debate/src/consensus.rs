//! Consensus strategies.
//!
//! Pure functions from the five final role outputs to one answer plus
//! metadata. The metadata records the strategy and the exact tie-break
//! path, so identical inputs always reproduce the identical choice.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use helix_config::ConsensusStrategyConfig;
use helix_shared::{stable_hash_parts, RequestId};

use crate::role::DebateRole;
use crate::types::{ConsensusMetadata, RoleOutput};

/// The selectable consensus strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    SynthesizerPrimary,
    MediatorOverride,
    Weighted,
    MajorityVote,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::SynthesizerPrimary => "synthesizer-primary",
            StrategyKind::MediatorOverride => "mediator-override",
            StrategyKind::Weighted => "weighted",
            StrategyKind::MajorityVote => "majority-vote",
        }
    }
}

impl From<ConsensusStrategyConfig> for StrategyKind {
    fn from(config: ConsensusStrategyConfig) -> Self {
        match config {
            ConsensusStrategyConfig::SynthesizerPrimary => StrategyKind::SynthesizerPrimary,
            ConsensusStrategyConfig::MediatorOverride => StrategyKind::MediatorOverride,
            ConsensusStrategyConfig::Weighted => StrategyKind::Weighted,
            ConsensusStrategyConfig::MajorityVote => StrategyKind::MajorityVote,
        }
    }
}

fn output_of<'a>(outputs: &'a [RoleOutput], role: DebateRole) -> Option<&'a RoleOutput> {
    outputs
        .iter()
        .find(|output| output.role == role && output.succeeded() && !output.text.is_empty())
}

/// Walks a preference order of roles and names the fallback path taken.
fn first_available<'a>(
    outputs: &'a [RoleOutput],
    order: &[DebateRole],
) -> (Option<&'a RoleOutput>, Option<String>) {
    for (index, &role) in order.iter().enumerate() {
        if let Some(output) = output_of(outputs, role) {
            let tie_break = if index == 0 {
                None
            } else {
                let unavailable: Vec<&str> =
                    order[..index].iter().map(|r| r.as_str()).collect();
                Some(format!(
                    "{} unavailable; fell back to {}",
                    unavailable.join(" and "),
                    role.as_str()
                ))
            };
            return (Some(output), tie_break);
        }
    }
    (None, Some("no role produced output".to_string()))
}

const SYNTHESIZER_ORDER: [DebateRole; 5] = [
    DebateRole::Synthesis,
    DebateRole::Mediator,
    DebateRole::Critic,
    DebateRole::Proposer,
    DebateRole::Analyst,
];

const MEDIATOR_ORDER: [DebateRole; 5] = [
    DebateRole::Mediator,
    DebateRole::Synthesis,
    DebateRole::Critic,
    DebateRole::Proposer,
    DebateRole::Analyst,
];

/// Reduces the five final role outputs to one answer plus metadata.
///
/// `scores` carries the verification score of the model each role actually
/// used, for weighted confidence.
pub fn decide_consensus(
    strategy: StrategyKind,
    outputs: &[RoleOutput],
    request_id: RequestId,
    scores: &BTreeMap<DebateRole, f64>,
) -> (String, ConsensusMetadata) {
    match strategy {
        StrategyKind::SynthesizerPrimary => {
            let (chosen, tie_break) = first_available(outputs, &SYNTHESIZER_ORDER);
            (
                chosen.map(|output| output.text.clone()).unwrap_or_default(),
                ConsensusMetadata {
                    strategy: strategy.as_str().to_string(),
                    tie_break,
                    weights: None,
                },
            )
        }
        StrategyKind::MediatorOverride => {
            let (chosen, tie_break) = first_available(outputs, &MEDIATOR_ORDER);
            (
                chosen.map(|output| output.text.clone()).unwrap_or_default(),
                ConsensusMetadata {
                    strategy: strategy.as_str().to_string(),
                    tie_break,
                    weights: None,
                },
            )
        }
        StrategyKind::Weighted => decide_weighted(outputs, scores),
        StrategyKind::MajorityVote => decide_majority(outputs, request_id, scores),
    }
}

/// Weight: verification score scaled down by observed latency.
fn role_weight(output: &RoleOutput, scores: &BTreeMap<DebateRole, f64>) -> f64 {
    let score = scores.get(&output.role).copied().unwrap_or(0.0);
    score * (1.0 / (1.0 + output.latency.as_secs_f64()))
}

fn decide_weighted(
    outputs: &[RoleOutput],
    scores: &BTreeMap<DebateRole, f64>,
) -> (String, ConsensusMetadata) {
    let mut weights = BTreeMap::new();
    for output in outputs {
        if output.succeeded() {
            weights.insert(
                output.role.as_str().to_string(),
                role_weight(output, scores),
            );
        }
    }

    let (chosen, tie_break) = first_available(outputs, &SYNTHESIZER_ORDER);
    let mut text = chosen.map(|output| output.text.clone()).unwrap_or_default();
    if !text.is_empty() && !weights.is_empty() {
        text.push_str("\n\n---\nRole confidence:\n");
        for (role, weight) in &weights {
            text.push_str(&format!("- {role}: {weight:.3}\n"));
        }
    }
    (
        text,
        ConsensusMetadata {
            strategy: StrategyKind::Weighted.as_str().to_string(),
            tie_break,
            weights: Some(weights),
        },
    )
}

/// A structured claim extracted from a role output: the text must be a
/// JSON object with a string `claim` field.
fn extract_claim(output: &RoleOutput) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(output.text.trim()).ok()?;
    value
        .get("claim")
        .and_then(|claim| claim.as_str())
        .map(str::to_string)
}

fn decide_majority(
    outputs: &[RoleOutput],
    request_id: RequestId,
    scores: &BTreeMap<DebateRole, f64>,
) -> (String, ConsensusMetadata) {
    let mut groups: BTreeMap<String, Vec<DebateRole>> = BTreeMap::new();
    for output in outputs {
        if !output.succeeded() {
            continue;
        }
        if let Some(claim) = extract_claim(output) {
            groups.entry(claim).or_default().push(output.role);
        }
    }

    if groups.is_empty() {
        // No structured claims: the strategy does not apply.
        let (chosen, inner) = first_available(outputs, &SYNTHESIZER_ORDER);
        let tie_break = Some(match inner {
            Some(path) => format!("no structured claims; fell back to synthesizer-primary ({path})"),
            None => "no structured claims; fell back to synthesizer-primary".to_string(),
        });
        return (
            chosen.map(|output| output.text.clone()).unwrap_or_default(),
            ConsensusMetadata {
                strategy: StrategyKind::MajorityVote.as_str().to_string(),
                tie_break,
                weights: None,
            },
        );
    }

    // Rank: vote count, then the best verification score inside the group,
    // then the stable hash of (request id, claim).
    let best_score = |roles: &[DebateRole]| -> f64 {
        roles
            .iter()
            .map(|role| scores.get(role).copied().unwrap_or(0.0))
            .fold(0.0, f64::max)
    };
    let mut ranked: Vec<(&String, &Vec<DebateRole>)> = groups.iter().collect();
    ranked.sort_by(|(claim_a, roles_a), (claim_b, roles_b)| {
        roles_b
            .len()
            .cmp(&roles_a.len())
            .then(best_score(roles_b.as_slice()).total_cmp(&best_score(roles_a.as_slice())))
            .then_with(|| {
                let hash = |claim: &str| {
                    stable_hash_parts(&[
                        &request_id.as_u64().to_be_bytes(),
                        claim.as_bytes(),
                    ])
                };
                hash(claim_a.as_str()).cmp(&hash(claim_b.as_str()))
            })
    });

    let (winner, supporters) = ranked[0];
    let tied_on_count = ranked
        .get(1)
        .map(|(_, roles)| roles.len() == supporters.len())
        .unwrap_or(false);
    let tie_break = if !tied_on_count {
        None
    } else {
        let tied_on_score = ranked
            .get(1)
            .map(|(_, roles)| best_score(roles.as_slice()) == best_score(supporters))
            .unwrap_or(false);
        Some(if tied_on_score {
            "vote tied; broke by stable hash of (request id, claim)".to_string()
        } else {
            "vote tied; broke by highest-scoring role".to_string()
        })
    };

    (
        winner.clone(),
        ConsensusMetadata {
            strategy: StrategyKind::MajorityVote.as_str().to_string(),
            tie_break,
            weights: None,
        },
    )
}
