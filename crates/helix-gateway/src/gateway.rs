//! The gateway.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use helix_config::HelixConfig;
use helix_debate::{
    event_channel, run_role, select_team, CoordinatorSettings, DebateCoordinator, DebateRequest,
    DebateResult, DebateRole, DebateStatus, EventStream, PromptHook, SelectError, SelectorPolicy,
};
use helix_provider::{CompletionParams, ProviderRegistry, RegistrySnapshot};
use helix_shared::{ApiError, CoreError, ErrorCode, RequestId};
use helix_store::{spawn_log_write, DebateLogRecord, DebateLogStore};
use helix_tools::ToolRegistry;

use crate::request::{normalize, NormalizedRequest, RequestMode, SubmitRequest};

/// Bound on buffered events per request.
const EVENT_CAPACITY: usize = 256;

/// The non-streaming response shape.
#[derive(Debug, Clone)]
pub struct DebateResponse {
    pub request_id: String,
    pub final_answer: String,
    /// Present for debate-mode requests.
    pub debate_result: Option<DebateResult>,
    /// `PartialDebate` when some roles failed but an answer was produced.
    pub warning: Option<ErrorCode>,
}

/// A running streaming debate: the ordered event stream, a cancellation
/// handle, the live `(request id, phase)` view for protocol
/// collaborators, and the join handle resolving to the final result.
#[derive(Debug)]
pub struct StreamingDebate {
    pub request_id: String,
    pub events: EventStream,
    pub cancel: CancellationToken,
    pub view: tokio::sync::watch::Receiver<helix_debate::DebateView>,
    pub handle: JoinHandle<Result<DebateResult, CoreError>>,
}

/// What `submit` produces, by transport need.
#[derive(Debug)]
pub enum SubmitOutcome {
    Completed(DebateResponse),
    Streaming(StreamingDebate),
}

/// The single normalized entry point used by every external adapter.
pub struct Gateway {
    config: Arc<HelixConfig>,
    registry: Arc<ProviderRegistry>,
    tools: Option<Arc<ToolRegistry>>,
    store: Option<Arc<dyn DebateLogStore>>,
    prompt_hook: Option<Arc<dyn PromptHook>>,
    permits: Arc<Semaphore>,
}

impl Gateway {
    pub fn new(config: Arc<HelixConfig>, registry: Arc<ProviderRegistry>) -> Self {
        let permits = Arc::new(Semaphore::new(config.limits.max_concurrent_requests));
        Self {
            config,
            registry,
            tools: None,
            store: None,
            prompt_hook: None,
            permits,
        }
    }

    /// Attaches the debate log store.
    pub fn with_store(mut self, store: Arc<dyn DebateLogStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attaches the tool registry exposed to protocol collaborators.
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Attaches the hook that injects tool results into role prompts.
    pub fn with_prompt_hook(mut self, hook: Arc<dyn PromptHook>) -> Self {
        self.prompt_hook = Some(hook);
        self
    }

    /// The tool registry, for protocol adapters doing discovery.
    pub fn tools(&self) -> Option<&Arc<ToolRegistry>> {
        self.tools.as_ref()
    }

    /// Submits a request with a fresh cancellation scope.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitOutcome, ApiError> {
        self.submit_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Submits a request. `cancel` aborts in-flight work promptly; the
    /// terminal event is then `Aborted(cancelled)`.
    pub async fn submit_with_cancel(
        &self,
        submit: SubmitRequest,
        cancel: CancellationToken,
    ) -> Result<SubmitOutcome, ApiError> {
        let id = RequestId::next();
        let request_id = id.to_string();

        let normalized = normalize(id, submit, &self.config)
            .map_err(|error| ApiError::from_core(&error, &request_id))?;

        // Global concurrency ceiling: over it, fail immediately, no queue.
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(request_id = %request_id, "gateway overloaded, rejecting");
                return Err(ApiError::from_core(&CoreError::Overloaded, &request_id));
            }
        };

        info!(
            request_id = %request_id,
            mode = ?normalized.mode,
            stream = normalized.stream,
            deadline_ms = normalized.deadline_budget.as_millis() as u64,
            "request accepted"
        );

        let snapshot = self.registry.snapshot();
        let policy = effective_policy(&self.config, &normalized);

        match normalized.mode {
            RequestMode::Single => {
                let response = self
                    .run_single(snapshot, &normalized, &policy, &cancel)
                    .await;
                drop(permit);
                response.map(SubmitOutcome::Completed)
            }
            RequestMode::Debate if normalized.stream => {
                let coordinator = self.build_coordinator(snapshot, &normalized);
                let view = coordinator.view();
                let (sink, events) = event_channel(EVENT_CAPACITY);
                let debate_request = DebateRequest {
                    id,
                    prompt: normalized.prompt.clone(),
                    stream: true,
                    deadline: normalized.deadline,
                };
                let store = self.store.clone();
                let task_cancel = cancel.clone();
                let handle = tokio::spawn(async move {
                    let outcome = coordinator
                        .run(&debate_request, &policy, sink, task_cancel)
                        .await;
                    if let Ok(result) = &outcome {
                        persist_result(&store, result);
                    }
                    drop(permit);
                    outcome
                });
                Ok(SubmitOutcome::Streaming(StreamingDebate {
                    request_id,
                    events,
                    cancel,
                    view,
                    handle,
                }))
            }
            RequestMode::Debate => {
                let coordinator = self.build_coordinator(snapshot, &normalized);
                let (sink, events) = event_channel(EVENT_CAPACITY);
                // Nobody consumes events on the non-streaming path.
                tokio::spawn(async move {
                    let _ = events.collect().await;
                });
                let debate_request = DebateRequest {
                    id,
                    prompt: normalized.prompt.clone(),
                    stream: false,
                    deadline: normalized.deadline,
                };
                let outcome = coordinator
                    .run(&debate_request, &policy, sink, cancel)
                    .await;
                drop(permit);
                let result =
                    outcome.map_err(|error| ApiError::from_core(&error, &request_id))?;
                persist_result(&self.store, &result);
                self.shape_debate_response(request_id, normalized, result)
                    .map(SubmitOutcome::Completed)
            }
        }
    }

    fn shape_debate_response(
        &self,
        request_id: String,
        normalized: NormalizedRequest,
        result: DebateResult,
    ) -> Result<DebateResponse, ApiError> {
        match result.status {
            DebateStatus::Aborted => {
                let error = if normalized.deadline.expired() {
                    ApiError::from_core(&CoreError::Timeout, &request_id)
                } else {
                    api_error(
                        ErrorCode::ProviderInternal,
                        "debate aborted: no role produced output",
                        &request_id,
                    )
                };
                Err(error)
            }
            status => Ok(DebateResponse {
                request_id,
                final_answer: result.final_answer.clone(),
                debate_result: Some(result),
                warning: (status == DebateStatus::Partial).then_some(ErrorCode::PartialDebate),
            }),
        }
    }

    /// The direct single-provider path: the best verified model plus its
    /// fallback chain, with the role runner's attempt bookkeeping but no
    /// debate.
    async fn run_single(
        &self,
        snapshot: Arc<RegistrySnapshot>,
        normalized: &NormalizedRequest,
        policy: &SelectorPolicy,
        cancel: &CancellationToken,
    ) -> Result<DebateResponse, ApiError> {
        let request_id = normalized.id.to_string();
        let selection = select_team(&snapshot, policy, normalized.id.seed(), Utc::now())
            .map_err(|SelectError::InsufficientProviders(message)| {
                ApiError::from_core(&CoreError::InsufficientProviders(message), &request_id)
            })?;
        // The selector's top-ranked assignment doubles as the direct path.
        let assignment = selection.team.get(DebateRole::Analyst).clone();

        let (sink, events) = event_channel(EVENT_CAPACITY);
        tokio::spawn(async move {
            let _ = events.collect().await;
        });
        let output = run_role(
            &snapshot,
            &assignment,
            &normalized.prompt,
            &CompletionParams::default(),
            normalized.deadline,
            self.config.limits.role_deadline,
            false,
            &sink,
            cancel,
        )
        .await;

        if output.cancelled {
            return Err(ApiError::from_core(&CoreError::Cancelled, &request_id));
        }
        if !output.succeeded() {
            let provider = output
                .attempts
                .last()
                .map(|attempt| attempt.model.provider.clone());
            let mut error = api_error(
                ErrorCode::ProviderInternal,
                "all models exhausted without a completion",
                &request_id,
            );
            error.provider = provider;
            return Err(error);
        }
        Ok(DebateResponse {
            request_id,
            final_answer: output.text,
            debate_result: None,
            warning: None,
        })
    }

    fn build_coordinator(
        &self,
        snapshot: Arc<RegistrySnapshot>,
        normalized: &NormalizedRequest,
    ) -> DebateCoordinator {
        let mut settings = CoordinatorSettings::from_config(&self.config);
        if let Some(rounds) = normalized.policy.rounds_max {
            settings.rounds_max = rounds.max(1);
        }
        if let Some(strategy) = normalized.policy.strategy {
            settings.strategy = strategy;
        }
        let mut coordinator = DebateCoordinator::new(snapshot, settings);
        if let Some(hook) = &self.prompt_hook {
            coordinator = coordinator.with_prompt_hook(hook.clone());
        }
        coordinator
    }
}

fn api_error(code: ErrorCode, message: &str, request_id: &str) -> ApiError {
    ApiError {
        code,
        message: message.to_string(),
        request_id: request_id.to_string(),
        role: None,
        provider: None,
        retry_after: None,
    }
}

/// Resolves configuration defaults plus per-request overrides.
fn effective_policy(config: &HelixConfig, normalized: &NormalizedRequest) -> SelectorPolicy {
    let overrides = &normalized.policy;
    SelectorPolicy {
        preferred_providers: overrides.preferred_providers.clone().unwrap_or_default(),
        forbidden_providers: overrides.forbidden_providers.clone().unwrap_or_default(),
        free_only: overrides.free_only.unwrap_or(config.debate.free_only),
        allow_oauth: overrides.allow_oauth.unwrap_or(config.debate.allow_oauth),
        fallback_depth: config.debate.fallback_depth,
        fresh_window: config.verification.fresh_window,
    }
}

/// Best-effort debate log write; never blocks the response.
fn persist_result(store: &Option<Arc<dyn DebateLogStore>>, result: &DebateResult) {
    let Some(store) = store else {
        return;
    };
    match serde_json::to_value(result) {
        Ok(value) => spawn_log_write(
            store.clone(),
            DebateLogRecord {
                request_id: result.request_id.clone(),
                created_at: Utc::now(),
                result: value,
            },
        ),
        Err(error) => warn!(
            request_id = %result.request_id,
            error = %error,
            "failed to serialize debate result for the log"
        ),
    }
}
