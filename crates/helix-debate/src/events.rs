//! Events published on the per-request streaming bus.

use serde::{Deserialize, Serialize};

use helix_provider::ModelRef;

use crate::role::DebateRole;
use crate::types::{RoleOutput, TeamSummary};

/// A debate lifecycle or streaming event.
///
/// Per request the stream is totally ordered and ends with exactly one
/// terminal event (`FinalAnswer` or `Aborted`); nothing follows a terminal
/// event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebateEvent {
    TeamAnnounced {
        team: TeamSummary,
    },
    RoleStarted {
        role: DebateRole,
        model: ModelRef,
    },
    RoleTokenDelta {
        role: DebateRole,
        delta: String,
    },
    RoleCompleted {
        output: RoleOutput,
    },
    RoleFallbackTriggered {
        role: DebateRole,
        failed: ModelRef,
        next: ModelRef,
        error: String,
    },
    ConsensusStarted,
    FinalAnswer {
        text: String,
    },
    Aborted {
        reason: String,
    },
}

impl DebateEvent {
    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DebateEvent::FinalAnswer { .. } | DebateEvent::Aborted { .. }
        )
    }

    /// Whether this event may be dropped under backpressure. Only token
    /// deltas are droppable; lifecycle events are always delivered.
    pub fn is_droppable(&self) -> bool {
        matches!(self, DebateEvent::RoleTokenDelta { .. })
    }
}
