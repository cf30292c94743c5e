//! Debate data model: teams, role outputs, and results.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use helix_provider::{ModelDescriptor, ModelRef, Usage};

use crate::role::{DebateRole, ROLE_ORDER};

/// One role's assigned primary model and ordered fallbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role: DebateRole,
    pub primary: ModelDescriptor,
    /// Distinct from `primary` and from each other.
    pub fallbacks: Vec<ModelDescriptor>,
}

impl RoleAssignment {
    /// Primary first, then fallbacks in order.
    pub fn chain(&self) -> impl Iterator<Item = &ModelDescriptor> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }
}

/// A complete team: exactly five assignments, one per role, in role order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateTeam {
    assignments: Vec<RoleAssignment>,
}

impl DebateTeam {
    /// Assembles a team. Panics if the assignments are not exactly one per
    /// role in role order; producing such a team is an internal invariant
    /// violation, not a recoverable error.
    pub fn from_assignments(assignments: Vec<RoleAssignment>) -> Self {
        assert_eq!(assignments.len(), ROLE_ORDER.len(), "team must have five roles");
        for (assignment, role) in assignments.iter().zip(ROLE_ORDER) {
            assert_eq!(assignment.role, role, "team assignments out of role order");
        }
        Self { assignments }
    }

    pub fn get(&self, role: DebateRole) -> &RoleAssignment {
        &self.assignments[role.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleAssignment> {
        self.assignments.iter()
    }

    /// A serializable summary for `TeamAnnounced` events.
    pub fn summary(&self) -> TeamSummary {
        TeamSummary {
            roles: self
                .assignments
                .iter()
                .map(|assignment| RoleSummary {
                    role: assignment.role,
                    primary: assignment.primary.model_ref(),
                    fallbacks: assignment
                        .fallbacks
                        .iter()
                        .map(ModelDescriptor::model_ref)
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Compact team description published on the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSummary {
    pub roles: Vec<RoleSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSummary {
    pub role: DebateRole,
    pub primary: ModelRef,
    pub fallbacks: Vec<ModelRef>,
}

/// One model attempt within a role, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub model: ModelRef,
    /// The error, absent for the successful attempt.
    pub error: Option<String>,
    pub latency: Duration,
    /// Set when the error class suggests a caller-side problem (auth, bad
    /// request) rather than a provider hiccup.
    #[serde(default)]
    pub non_recoverable: bool,
}

/// How a role finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoleStatus {
    Succeeded,
    FellBack,
    Failed,
}

/// The immutable record of one role's execution in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleOutput {
    pub role: DebateRole,
    /// The model that produced `text`; absent when the role failed.
    pub model: Option<ModelRef>,
    pub latency: Duration,
    pub text: String,
    pub tokens: Option<Usage>,
    pub status: RoleStatus,
    pub attempts: Vec<AttemptRecord>,
    /// Token deltas were dropped under backpressure while streaming.
    #[serde(default)]
    pub lossy: bool,
    /// The role was interrupted by caller cancellation.
    #[serde(default)]
    pub cancelled: bool,
}

impl RoleOutput {
    /// A placeholder for a role that never produced output.
    pub fn failed(role: DebateRole) -> Self {
        Self {
            role,
            model: None,
            latency: Duration::ZERO,
            text: String::new(),
            tokens: None,
            status: RoleStatus::Failed,
            attempts: Vec::new(),
            lossy: false,
            cancelled: false,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.status, RoleStatus::Succeeded | RoleStatus::FellBack)
    }
}

/// Outputs of one Analyst..Synthesis round. The final round also carries
/// the Mediator, giving the five outputs consensus operates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutputs {
    pub round: u32,
    pub outputs: Vec<RoleOutput>,
}

impl RoundOutputs {
    pub fn get(&self, role: DebateRole) -> Option<&RoleOutput> {
        self.outputs.iter().find(|output| output.role == role)
    }
}

/// Metadata recorded by the consensus step, sufficient to replay the
/// decision: two identical requests produce identical consensus choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusMetadata {
    pub strategy: String,
    /// The tie-break path taken, when the primary choice was unavailable
    /// or a vote tied.
    #[serde(default)]
    pub tie_break: Option<String>,
    /// Per-role weights, for the weighted strategy.
    #[serde(default)]
    pub weights: Option<BTreeMap<String, f64>>,
}

/// Overall debate status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebateStatus {
    /// Every role produced output.
    Complete,
    /// Some roles failed but a final answer was still produced.
    Partial,
    /// No final answer could be produced.
    Aborted,
}

/// The assembled result of one debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateResult {
    pub request_id: String,
    pub team: TeamSummary,
    /// One entry per executed round; the last includes the Mediator.
    pub rounds: Vec<RoundOutputs>,
    pub final_answer: String,
    pub consensus: ConsensusMetadata,
    pub status: DebateStatus,
}

impl DebateResult {
    /// The five outputs consensus operated on: the final round's outputs
    /// in fixed role order. Panics if the final round does not carry all
    /// five roles; a result in that state is an invariant violation.
    pub fn consensus_outputs(&self) -> [&RoleOutput; 5] {
        let last = self.rounds.last().expect("debate executed at least one round");
        let mut outputs: Vec<&RoleOutput> = Vec::with_capacity(5);
        for role in ROLE_ORDER {
            outputs.push(last.get(role).expect("final round carries all five roles"));
        }
        outputs.try_into().expect("exactly five role outputs")
    }
}
