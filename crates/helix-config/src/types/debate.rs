//! Debate orchestration options.

use serde::{Deserialize, Serialize};

/// The consensus strategy used to reduce role outputs to one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConsensusStrategyConfig {
    #[default]
    #[serde(rename = "synthesizer-primary")]
    SynthesizerPrimary,
    #[serde(rename = "mediator-override")]
    MediatorOverride,
    #[serde(rename = "weighted")]
    Weighted,
    #[serde(rename = "majority-vote")]
    MajorityVote,
}

/// Optional per-role prompt template overrides.
///
/// Templates may reference `{request}` plus the placeholders for roles the
/// template's role is allowed to see: `{analyst}`, `{proposer}`, `{critic}`,
/// `{synthesis}`. The role dependency graph itself is fixed; overrides only
/// change the wording.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PromptOverrides {
    #[serde(default)]
    pub analyst: Option<String>,
    #[serde(default)]
    pub proposer: Option<String>,
    #[serde(default)]
    pub critic: Option<String>,
    #[serde(default)]
    pub synthesis: Option<String>,
    #[serde(default)]
    pub mediator: Option<String>,
}

/// Debate-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebateConfig {
    /// The five roles in execution order. The list is fixed; configuration
    /// may restate it but never reorder or resize it.
    #[serde(default = "default_roles")]
    pub roles: Vec<String>,
    /// Maximum Analyst..Synthesis rounds before the Mediator runs.
    #[serde(default = "default_rounds_max")]
    pub rounds_max: u32,
    #[serde(default)]
    pub strategy: ConsensusStrategyConfig,
    /// Restrict selection to providers marked `free = true`.
    #[serde(default)]
    pub free_only: bool,
    /// Whether OAuth-authenticated adapters are selectable.
    #[serde(default = "default_allow_oauth")]
    pub allow_oauth: bool,
    /// Maximum fallback chain length per role.
    #[serde(default = "default_fallback_depth")]
    pub fallback_depth: usize,
    #[serde(default)]
    pub prompts: PromptOverrides,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            roles: default_roles(),
            rounds_max: default_rounds_max(),
            strategy: ConsensusStrategyConfig::default(),
            free_only: false,
            allow_oauth: default_allow_oauth(),
            fallback_depth: default_fallback_depth(),
            prompts: PromptOverrides::default(),
        }
    }
}

/// The immutable role order.
pub(crate) fn default_roles() -> Vec<String> {
    ["analyst", "proposer", "critic", "synthesis", "mediator"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_rounds_max() -> u32 {
    1
}

fn default_allow_oauth() -> bool {
    true
}

fn default_fallback_depth() -> usize {
    2
}
