//! The debate coordinator.
//!
//! Drives Analyst -> Proposer -> Critic -> Synthesis per round, runs the
//! Mediator exactly once at the end, polices the request deadline, and
//! reduces the final role outputs through the configured consensus
//! strategy. The coordinator owns the event channel; role runners write
//! into it, and the caller drains it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use helix_config::{HelixConfig, PromptOverrides};
use helix_provider::{CompletionParams, RegistrySnapshot};
use helix_shared::{CoreError, Deadline, RequestId};

use crate::bus::EventSink;
use crate::consensus::{decide_consensus, StrategyKind};
use crate::events::DebateEvent;
use crate::prompt::{build_role_prompt, PromptHook};
use crate::role::DebateRole;
use crate::runner::run_role;
use crate::selector::{select_team, SelectError, SelectorPolicy};
use crate::types::{DebateResult, DebateStatus, DebateTeam, RoleOutput, RoundOutputs};

/// A normalized request as the coordinator sees it.
#[derive(Debug, Clone)]
pub struct DebateRequest {
    pub id: RequestId,
    pub prompt: String,
    pub stream: bool,
    pub deadline: Deadline,
}

/// Coordinator phase, observable by tool collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebatePhase {
    Idle,
    Selecting,
    Running(DebateRole),
    Consensing,
    Done,
    Aborted,
}

impl DebatePhase {
    /// The state string exposed on the tool contract.
    pub fn as_state_string(&self) -> String {
        match self {
            DebatePhase::Idle => "idle".to_string(),
            DebatePhase::Selecting => "selecting".to_string(),
            DebatePhase::Running(role) => format!("running:{role}"),
            DebatePhase::Consensing => "consensing".to_string(),
            DebatePhase::Done => "done".to_string(),
            DebatePhase::Aborted => "aborted".to_string(),
        }
    }

    /// The role currently executing, if any.
    pub fn current_role(&self) -> Option<DebateRole> {
        match self {
            DebatePhase::Running(role) => Some(*role),
            _ => None,
        }
    }
}

/// The read-only view exposed to protocol collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebateView {
    pub request_id: String,
    pub phase: DebatePhase,
}

/// Hook deciding whether multi-round debates converged early.
///
/// The consensus metric is deliberately a strategy-level extension point;
/// the default never breaks and `rounds_max` defaults to 1.
pub trait RoundBreaker: Send + Sync {
    fn should_break(&self, round: &RoundOutputs) -> bool;
}

/// Default breaker: run every configured round.
pub struct NeverBreak;

impl RoundBreaker for NeverBreak {
    fn should_break(&self, _round: &RoundOutputs) -> bool {
        false
    }
}

/// Tunables resolved from configuration plus per-request overrides.
#[derive(Clone)]
pub struct CoordinatorSettings {
    pub rounds_max: u32,
    pub strategy: StrategyKind,
    pub role_deadline: Duration,
    pub min_role_budget: Duration,
    pub prompts: PromptOverrides,
    pub params: CompletionParams,
}

impl CoordinatorSettings {
    pub fn from_config(config: &HelixConfig) -> Self {
        Self {
            rounds_max: config.debate.rounds_max,
            strategy: config.debate.strategy.into(),
            role_deadline: config.limits.role_deadline,
            min_role_budget: config.limits.min_role_budget,
            prompts: config.debate.prompts.clone(),
            params: CompletionParams::default(),
        }
    }
}

/// Drives one debate over a fixed registry snapshot.
pub struct DebateCoordinator {
    snapshot: Arc<RegistrySnapshot>,
    settings: CoordinatorSettings,
    round_breaker: Arc<dyn RoundBreaker>,
    prompt_hook: Option<Arc<dyn PromptHook>>,
    view_tx: watch::Sender<DebateView>,
}

impl DebateCoordinator {
    pub fn new(snapshot: Arc<RegistrySnapshot>, settings: CoordinatorSettings) -> Self {
        let (view_tx, _) = watch::channel(DebateView {
            request_id: String::new(),
            phase: DebatePhase::Idle,
        });
        Self {
            snapshot,
            settings,
            round_breaker: Arc::new(NeverBreak),
            prompt_hook: None,
            view_tx,
        }
    }

    pub fn with_round_breaker(mut self, breaker: Arc<dyn RoundBreaker>) -> Self {
        self.round_breaker = breaker;
        self
    }

    pub fn with_prompt_hook(mut self, hook: Arc<dyn PromptHook>) -> Self {
        self.prompt_hook = Some(hook);
        self
    }

    /// A live view of `(request id, phase)` for tool collaborators.
    pub fn view(&self) -> watch::Receiver<DebateView> {
        self.view_tx.subscribe()
    }

    fn set_phase(&self, request_id: RequestId, phase: DebatePhase) {
        let _ = self.view_tx.send(DebateView {
            request_id: request_id.to_string(),
            phase,
        });
    }

    /// Runs the debate to completion.
    ///
    /// The returned result's status distinguishes complete, partial
    /// (degraded but answered), and aborted debates; request-level
    /// failures (selection, cancellation) surface as errors after the
    /// terminal event has been published.
    pub async fn run(
        &self,
        request: &DebateRequest,
        policy: &SelectorPolicy,
        sink: EventSink,
        cancel: CancellationToken,
    ) -> Result<DebateResult, CoreError> {
        self.set_phase(request.id, DebatePhase::Selecting);
        let selection = match select_team(
            &self.snapshot,
            policy,
            request.id.seed(),
            Utc::now(),
        ) {
            Ok(selection) => selection,
            Err(SelectError::InsufficientProviders(message)) => {
                sink.send_lifecycle(DebateEvent::Aborted {
                    reason: format!("insufficient providers: {message}"),
                })
                .await;
                self.set_phase(request.id, DebatePhase::Aborted);
                return Err(CoreError::InsufficientProviders(message));
            }
        };
        let team = selection.team.clone();
        info!(
            request_id = %request.id,
            relaxed = selection.relaxed_provider.is_some(),
            "team selected"
        );
        sink.send_lifecycle(DebateEvent::TeamAnnounced {
            team: team.summary(),
        })
        .await;

        let mut rounds: Vec<RoundOutputs> = Vec::new();
        for round in 1..=self.settings.rounds_max {
            let mut outputs: Vec<RoleOutput> = Vec::new();
            for role in [
                DebateRole::Analyst,
                DebateRole::Proposer,
                DebateRole::Critic,
                DebateRole::Synthesis,
            ] {
                match self
                    .run_or_skip_role(request, &team, role, round, &rounds, &outputs, &sink, &cancel)
                    .await
                {
                    RoleStep::Output(output) => outputs.push(output),
                    RoleStep::Cancelled => {
                        return self.abort_cancelled(request, &sink).await;
                    }
                }
            }
            let round_outputs = RoundOutputs { round, outputs };
            let converged = self.round_breaker.should_break(&round_outputs);
            rounds.push(round_outputs);
            if converged {
                debug!(request_id = %request.id, round, "round breaker converged early");
                break;
            }
        }

        // The Mediator runs exactly once, in the final round's context.
        let final_round_index = rounds.len() - 1;
        let prior: Vec<RoleOutput> = rounds[final_round_index].outputs.clone();
        let mediator = match self
            .run_or_skip_role(
                request,
                &team,
                DebateRole::Mediator,
                rounds[final_round_index].round,
                &rounds[..final_round_index],
                &prior,
                &sink,
                &cancel,
            )
            .await
        {
            RoleStep::Output(output) => output,
            RoleStep::Cancelled => {
                return self.abort_cancelled(request, &sink).await;
            }
        };
        rounds[final_round_index].outputs.push(mediator);

        self.set_phase(request.id, DebatePhase::Consensing);
        sink.send_lifecycle(DebateEvent::ConsensusStarted).await;

        let final_outputs = &rounds[final_round_index].outputs;
        let scores = self.role_scores(final_outputs, &team);
        let (final_answer, consensus) = decide_consensus(
            self.settings.strategy,
            final_outputs,
            request.id,
            &scores,
        );

        let all_succeeded = final_outputs.iter().all(RoleOutput::succeeded);
        let any_succeeded = final_outputs.iter().any(RoleOutput::succeeded);
        let status = if all_succeeded {
            DebateStatus::Complete
        } else if any_succeeded && !final_answer.is_empty() {
            DebateStatus::Partial
        } else {
            DebateStatus::Aborted
        };

        let result = DebateResult {
            request_id: request.id.to_string(),
            team: team.summary(),
            rounds,
            final_answer: final_answer.clone(),
            consensus,
            status,
        };

        match status {
            DebateStatus::Aborted => {
                sink.send_lifecycle(DebateEvent::Aborted {
                    reason: "no role produced output".to_string(),
                })
                .await;
                self.set_phase(request.id, DebatePhase::Aborted);
            }
            _ => {
                sink.send_lifecycle(DebateEvent::FinalAnswer { text: final_answer }).await;
                self.set_phase(request.id, DebatePhase::Done);
            }
        }
        Ok(result)
    }

    async fn abort_cancelled(
        &self,
        request: &DebateRequest,
        sink: &EventSink,
    ) -> Result<DebateResult, CoreError> {
        sink.send_lifecycle(DebateEvent::Aborted {
            reason: "cancelled".to_string(),
        })
        .await;
        self.set_phase(request.id, DebatePhase::Aborted);
        Err(CoreError::Cancelled)
    }

    /// Runs one role, or skips it when too little of the request budget
    /// remains for a meaningful attempt.
    #[allow(clippy::too_many_arguments)]
    async fn run_or_skip_role(
        &self,
        request: &DebateRequest,
        team: &DebateTeam,
        role: DebateRole,
        round: u32,
        earlier_rounds: &[RoundOutputs],
        prior: &[RoleOutput],
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> RoleStep {
        if cancel.is_cancelled() {
            return RoleStep::Cancelled;
        }
        let remaining = request.deadline.remaining();
        if remaining < self.settings.min_role_budget {
            warn!(
                request_id = %request.id,
                %role,
                remaining_ms = remaining.as_millis() as u64,
                "skipping role, request budget nearly exhausted"
            );
            return RoleStep::Output(RoleOutput::failed(role));
        }

        self.set_phase(request.id, DebatePhase::Running(role));
        let assignment = team.get(role);
        let prompt = self.role_prompt(request, role, round, earlier_rounds, prior);
        let role_deadline = request.deadline.child(self.settings.role_deadline);
        let chain_len = 1 + assignment.fallbacks.len() as u32;
        let attempt_budget = self.settings.role_deadline / chain_len;

        let output = run_role(
            &self.snapshot,
            assignment,
            &prompt,
            &self.settings.params,
            role_deadline,
            attempt_budget,
            request.stream,
            sink,
            cancel,
        )
        .await;
        if output.cancelled {
            RoleStep::Cancelled
        } else {
            RoleStep::Output(output)
        }
    }

    /// Builds the role prompt: the fixed dependency graph over the current
    /// round, previous-round synthesis as context in later rounds, plus
    /// whatever the tool hook injects.
    fn role_prompt(
        &self,
        request: &DebateRequest,
        role: DebateRole,
        round: u32,
        earlier_rounds: &[RoundOutputs],
        prior: &[RoleOutput],
    ) -> String {
        let mut request_prompt = request.prompt.clone();
        if round > 1 {
            if let Some(previous_synthesis) = earlier_rounds
                .last()
                .and_then(|r| r.get(DebateRole::Synthesis))
                .filter(|output| output.succeeded())
            {
                request_prompt = format!(
                    "{}\n\nPrevious round synthesis (round {}):\n{}",
                    request_prompt,
                    round - 1,
                    previous_synthesis.text
                );
            }
        }
        let mut prompt =
            build_role_prompt(role, &request_prompt, prior, &self.settings.prompts);
        if let Some(hook) = &self.prompt_hook {
            if let Some(injected) = hook.inject(role) {
                prompt.push_str("\n\nTool results:\n");
                prompt.push_str(&injected);
            }
        }
        prompt
    }

    /// Verification scores of the models each role actually used.
    fn role_scores(
        &self,
        outputs: &[RoleOutput],
        team: &DebateTeam,
    ) -> BTreeMap<DebateRole, f64> {
        let mut scores = BTreeMap::new();
        for output in outputs {
            let score = match &output.model {
                Some(model_ref) => self
                    .snapshot
                    .model(&model_ref.provider, &model_ref.model)
                    .map(|m| m.score)
                    .unwrap_or(0.0),
                None => team.get(output.role).primary.score,
            };
            scores.insert(output.role, score);
        }
        scores
    }
}

enum RoleStep {
    Output(RoleOutput),
    Cancelled,
}
