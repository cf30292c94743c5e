//! # helix-debate
//!
//! The debate orchestration core: five fixed roles, a deterministic team
//! selector over the registry snapshot, a fault-tolerant role runner with
//! per-role fallback chains, the sequential debate coordinator, consensus
//! strategies, and the per-request event bus.

pub mod bus;
pub mod consensus;
pub mod coordinator;
pub mod events;
pub mod prompt;
pub mod role;
pub mod runner;
pub mod selector;
pub mod types;

pub use bus::{event_channel, EventSink, EventStream};
pub use consensus::{decide_consensus, StrategyKind};
pub use coordinator::{
    CoordinatorSettings, DebateCoordinator, DebatePhase, DebateRequest, DebateView, NeverBreak,
    RoundBreaker,
};
pub use events::DebateEvent;
pub use prompt::{build_role_prompt, PromptHook};
pub use role::{DebateRole, ROLE_ORDER};
pub use selector::{select_team, SelectError, SelectorPolicy, TeamSelection};
pub use runner::run_role;
pub use types::{
    AttemptRecord, ConsensusMetadata, DebateResult, DebateStatus, DebateTeam, RoleAssignment,
    RoleOutput, RoleStatus, RoleSummary, RoundOutputs, TeamSummary,
};
