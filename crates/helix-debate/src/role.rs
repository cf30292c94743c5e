//! The five debate roles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A debate role. The order is fixed: later roles' prompts include earlier
/// roles' outputs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DebateRole {
    Analyst,
    Proposer,
    Critic,
    Synthesis,
    Mediator,
}

/// The immutable execution order.
pub const ROLE_ORDER: [DebateRole; 5] = [
    DebateRole::Analyst,
    DebateRole::Proposer,
    DebateRole::Critic,
    DebateRole::Synthesis,
    DebateRole::Mediator,
];

impl DebateRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebateRole::Analyst => "analyst",
            DebateRole::Proposer => "proposer",
            DebateRole::Critic => "critic",
            DebateRole::Synthesis => "synthesis",
            DebateRole::Mediator => "mediator",
        }
    }

    /// Position in [`ROLE_ORDER`].
    pub fn index(&self) -> usize {
        ROLE_ORDER
            .iter()
            .position(|role| role == self)
            .expect("role present in ROLE_ORDER")
    }
}

impl fmt::Display for DebateRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
