//! End-to-end debate coordination against scripted adapters.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use helix_config::PromptOverrides;
use helix_provider::{
    Capability, Completion, CompletionParams, HealthStatus, ModelDescriptor, ProviderAdapter,
    ProviderDescriptor, ProviderError, ProviderKind, RegistrySnapshot, TextStream,
};
use helix_shared::{CoreError, Deadline, RequestId};
use helix_debate::{
    event_channel, CoordinatorSettings, DebateCoordinator, DebateEvent, DebateRequest,
    DebateRole, DebateStatus, RoleStatus, RoundOutputs, RoundBreaker, SelectorPolicy,
    StrategyKind,
};

/// Scripted per-model behavior.
#[derive(Clone)]
enum Behavior {
    Reply(&'static str),
    StreamThenHang(&'static str),
    StreamMany(&'static str, usize),
    Fail(ProviderError),
}

struct MockAdapter {
    id: String,
    behaviors: HashMap<String, Behavior>,
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> BTreeSet<Capability> {
        [Capability::Chat, Capability::Stream].into_iter().collect()
    }

    async fn complete(
        &self,
        model: &str,
        _prompt: &str,
        _params: &CompletionParams,
        _deadline: Deadline,
    ) -> Result<Completion, ProviderError> {
        match self.behaviors.get(model) {
            Some(Behavior::Reply(text)) => Ok(Completion {
                text: (*text).to_string(),
                usage: None,
            }),
            Some(Behavior::StreamMany(fragment, count)) => Ok(Completion {
                text: fragment.repeat(*count),
                usage: None,
            }),
            Some(Behavior::StreamThenHang(_)) => futures_util::future::pending().await,
            Some(Behavior::Fail(error)) => Err(error.clone()),
            None => Err(ProviderError::NotFound {
                provider: self.id.clone(),
                model: model.to_string(),
                detail: "unknown model".to_string(),
            }),
        }
    }

    async fn complete_stream(
        &self,
        model: &str,
        _prompt: &str,
        _params: &CompletionParams,
        _deadline: Deadline,
    ) -> Result<TextStream, ProviderError> {
        match self.behaviors.get(model) {
            Some(Behavior::Reply(text)) => {
                let text = (*text).to_string();
                Ok(Box::pin(futures_util::stream::iter([Ok(text)])))
            }
            Some(Behavior::StreamMany(fragment, count)) => {
                let fragment = (*fragment).to_string();
                let count = *count;
                let stream = async_stream::stream! {
                    for _ in 0..count {
                        yield Ok(fragment.clone());
                    }
                };
                Ok(Box::pin(stream))
            }
            Some(Behavior::StreamThenHang(first)) => {
                let first = (*first).to_string();
                let stream = async_stream::stream! {
                    yield Ok(first);
                    futures_util::future::pending::<()>().await;
                };
                Ok(Box::pin(stream))
            }
            Some(Behavior::Fail(error)) => Err(error.clone()),
            None => Err(ProviderError::NotFound {
                provider: self.id.clone(),
                model: model.to_string(),
                detail: "unknown model".to_string(),
            }),
        }
    }

    async fn health_check(&self, _deadline: Deadline) -> Result<HealthStatus, ProviderError> {
        Ok(HealthStatus {
            available: true,
            latency: None,
        })
    }

    async fn models(&self) -> Result<Vec<ModelDescriptor>, ProviderError> {
        Ok(vec![])
    }
}

fn provider(id: &str) -> ProviderDescriptor {
    ProviderDescriptor {
        id: id.to_string(),
        kind: ProviderKind::ApiKey,
        endpoint: format!("https://{id}.example"),
        auth_env: None,
        tier: 3,
        capabilities: [Capability::Chat, Capability::Stream].into_iter().collect(),
        free: false,
        enabled: true,
    }
}

fn verified_model(provider: &str, model: &str, score: f64) -> ModelDescriptor {
    let mut descriptor = ModelDescriptor::skeleton(
        provider,
        model,
        [Capability::Chat, Capability::Stream].into_iter().collect(),
    );
    descriptor.verified = true;
    descriptor.score = score;
    descriptor.last_verified_at = Some(Utc::now());
    descriptor
}

/// Five providers with descending scores, so role assignment is fixed:
/// analyst=a, proposer=b, critic=c, synthesis=d, mediator=e.
fn five_provider_snapshot(
    behaviors: &[(&str, &str, Behavior)],
) -> Arc<RegistrySnapshot> {
    let scores: [f64; 5] = [0.9, 0.85, 0.8, 0.75, 0.7];
    let ids = ["a", "b", "c", "d", "e"];
    let mut providers = BTreeMap::new();
    let mut models = Vec::new();
    let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();

    for (index, id) in ids.iter().enumerate() {
        providers.insert(id.to_string(), provider(id));
        let mut per_provider: HashMap<String, Behavior> = HashMap::new();
        for (provider_id, model, behavior) in behaviors {
            if provider_id == id {
                models.push(verified_model(
                    id,
                    model,
                    scores[index] - 0.01 * models.iter().filter(|m: &&ModelDescriptor| m.provider == *id).count() as f64,
                ));
                per_provider.insert((*model).to_string(), behavior.clone());
            }
        }
        adapters.insert(
            id.to_string(),
            Arc::new(MockAdapter {
                id: id.to_string(),
                behaviors: per_provider,
            }),
        );
    }

    Arc::new(RegistrySnapshot::new(providers, models, adapters))
}

fn settings() -> CoordinatorSettings {
    CoordinatorSettings {
        rounds_max: 1,
        strategy: StrategyKind::SynthesizerPrimary,
        role_deadline: Duration::from_secs(5),
        min_role_budget: Duration::from_millis(50),
        prompts: PromptOverrides::default(),
        params: CompletionParams::default(),
    }
}

fn request(id: u64, stream: bool) -> DebateRequest {
    DebateRequest {
        id: RequestId::from_raw(id),
        prompt: "hi".to_string(),
        stream,
        deadline: Deadline::after(Duration::from_secs(60)),
    }
}

fn default_behaviors() -> Vec<(&'static str, &'static str, Behavior)> {
    vec![
        ("a", "model-a", Behavior::Reply("analysis text")),
        ("b", "model-b", Behavior::Reply("proposal text")),
        ("c", "model-c", Behavior::Reply("critique text")),
        ("d", "model-d", Behavior::Reply("synthesis text")),
        ("e", "model-e", Behavior::Reply("mediator text")),
    ]
}

#[tokio::test]
async fn test_happy_path_non_streaming() {
    let snapshot = five_provider_snapshot(&default_behaviors());
    let coordinator = DebateCoordinator::new(snapshot, settings());
    let (sink, stream) = event_channel(64);
    let drain = tokio::spawn(stream.collect());

    let result = coordinator
        .run(
            &request(1, false),
            &SelectorPolicy::default(),
            sink,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.status, DebateStatus::Complete);
    assert_eq!(result.final_answer, "synthesis text");
    assert_eq!(result.consensus.strategy, "synthesizer-primary");
    assert_eq!(result.rounds.len(), 1);

    let outputs = result.consensus_outputs();
    assert_eq!(outputs.len(), 5);
    for (output, team_role) in outputs.iter().zip(result.team.roles.iter()) {
        assert_eq!(output.status, RoleStatus::Succeeded);
        // The model actually used is the assigned primary.
        assert_eq!(output.model.as_ref(), Some(&team_role.primary));
    }

    let events = drain.await.unwrap();
    assert!(matches!(events.first(), Some(DebateEvent::TeamAnnounced { .. })));
    let last = events.last().unwrap();
    assert_eq!(
        last,
        &DebateEvent::FinalAnswer {
            text: "synthesis text".to_string()
        }
    );
    // Exactly one terminal event, at the end.
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1);
}

#[tokio::test]
async fn test_fallback_walk_records_attempts() {
    // The critic's primary (provider c) responds 404; its fallback chain
    // reaches a working model on another provider.
    let mut behaviors = default_behaviors();
    behaviors[2] = (
        "c",
        "model-c",
        Behavior::Fail(ProviderError::NotFound {
            provider: "c".to_string(),
            model: "model-c".to_string(),
            detail: "no such model".to_string(),
        }),
    );
    let snapshot = five_provider_snapshot(&behaviors);
    let coordinator = DebateCoordinator::new(snapshot, settings());
    let (sink, stream) = event_channel(64);
    let drain = tokio::spawn(stream.collect());

    let result = coordinator
        .run(
            &request(2, false),
            &SelectorPolicy::default(),
            sink,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let critic = result.rounds[0].get(DebateRole::Critic).unwrap();
    assert_eq!(critic.status, RoleStatus::FellBack);
    // The failed primary is the first attempt, with its error; the model
    // actually used is the first fallback that answered.
    assert!(critic.attempts.len() >= 2);
    assert!(critic.attempts[0].error.as_deref().unwrap().contains("model-c"));
    assert!(critic.attempts.last().unwrap().error.is_none());
    assert_ne!(critic.model.as_ref().unwrap().provider, "c");

    let events = drain.await.unwrap();
    assert!(events.iter().any(|event| matches!(
        event,
        DebateEvent::RoleFallbackTriggered { role: DebateRole::Critic, .. }
    )));
    // A fallback is degradation inside the role, not a failed role: the
    // debate itself is still complete.
    assert_eq!(result.status, DebateStatus::Complete);
}

#[tokio::test]
async fn test_synthesis_and_mediator_exhausted_falls_back_to_critic() {
    let mut behaviors = default_behaviors();
    let internal = |provider: &str| {
        Behavior::Fail(ProviderError::Internal {
            provider: provider.to_string(),
            model: None,
            status: Some(500),
            detail: "upstream exploded".to_string(),
        })
    };
    behaviors[3] = ("d", "model-d", internal("d"));
    behaviors[4] = ("e", "model-e", internal("e"));
    let snapshot = five_provider_snapshot(&behaviors);
    let coordinator = DebateCoordinator::new(snapshot, settings());
    let (sink, stream) = event_channel(64);
    let drain = tokio::spawn(stream.collect());

    // No fallbacks: synthesis and mediator exhaust their chains.
    let policy = SelectorPolicy {
        fallback_depth: 0,
        ..SelectorPolicy::default()
    };
    let result = coordinator
        .run(&request(3, false), &policy, sink, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, DebateStatus::Partial);
    assert_eq!(result.final_answer, "critique text");
    assert_eq!(result.consensus.strategy, "synthesizer-primary");
    assert_eq!(
        result.consensus.tie_break.as_deref(),
        Some("synthesis and mediator unavailable; fell back to critic")
    );

    let events = drain.await.unwrap();
    // The answer was still produced, so the terminal event is FinalAnswer.
    assert!(matches!(
        events.last(),
        Some(DebateEvent::FinalAnswer { .. })
    ));
}

#[tokio::test]
async fn test_streaming_cancellation_mid_role() {
    let mut behaviors = default_behaviors();
    behaviors[1] = ("b", "model-b", Behavior::StreamThenHang("first-delta"));
    let snapshot = five_provider_snapshot(&behaviors);
    let coordinator = Arc::new(DebateCoordinator::new(snapshot, settings()));
    let (sink, mut stream) = event_channel(64);
    let cancel = CancellationToken::new();

    let runner = tokio::spawn({
        let coordinator = coordinator.clone();
        let cancel = cancel.clone();
        let request = request(4, true);
        async move {
            coordinator
                .run(&request, &SelectorPolicy::default(), sink, cancel)
                .await
        }
    });

    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        if matches!(
            event,
            DebateEvent::RoleTokenDelta {
                role: DebateRole::Proposer,
                ..
            }
        ) {
            cancel.cancel();
        }
        events.push(event);
    }

    let outcome = runner.await.unwrap();
    assert!(matches!(outcome, Err(CoreError::Cancelled)));

    // Total order: analyst finished, proposer started and streamed one
    // delta, then the abort terminated the stream. Nothing follows.
    let position = |predicate: &dyn Fn(&DebateEvent) -> bool| {
        events.iter().position(|e| predicate(e)).unwrap()
    };
    let analyst_done = position(&|e| {
        matches!(e, DebateEvent::RoleCompleted { output } if output.role == DebateRole::Analyst)
    });
    let proposer_started = position(&|e| {
        matches!(e, DebateEvent::RoleStarted { role: DebateRole::Proposer, .. })
    });
    let aborted = position(&|e| matches!(e, DebateEvent::Aborted { .. }));
    assert!(analyst_done < proposer_started);
    assert!(proposer_started < aborted);
    assert_eq!(aborted, events.len() - 1);
    assert!(matches!(
        &events[aborted],
        DebateEvent::Aborted { reason } if reason == "cancelled"
    ));
    // The proposer never completed.
    assert!(!events.iter().any(|e| matches!(
        e,
        DebateEvent::RoleCompleted { output } if output.role == DebateRole::Proposer
    )));
}

#[tokio::test]
async fn test_backpressure_drops_deltas_marks_lossy() {
    // The analyst streams many deltas into a single-slot channel while the
    // reader drains far slower than the delta grace period.
    let mut behaviors = default_behaviors();
    behaviors[0] = ("a", "model-a", Behavior::StreamMany("tok ", 20));
    let snapshot = five_provider_snapshot(&behaviors);
    let coordinator = Arc::new(DebateCoordinator::new(snapshot, settings()));
    let (sink, mut stream) = event_channel(1);
    let runner = tokio::spawn({
        let coordinator = coordinator.clone();
        let request = request(5, true);
        async move {
            coordinator
                .run(
                    &request,
                    &SelectorPolicy::default(),
                    sink,
                    CancellationToken::new(),
                )
                .await
        }
    });

    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        // Slower than DELTA_GRACE: deltas back up and get dropped.
        tokio::time::sleep(Duration::from_millis(120)).await;
        events.push(event);
    }
    let result = runner.await.unwrap().unwrap();
    assert_eq!(result.status, DebateStatus::Complete);

    // Deltas were dropped from the tail, never lifecycle events: every
    // role completion and the terminal event still arrived.
    let delivered_deltas = events
        .iter()
        .filter(|e| matches!(e, DebateEvent::RoleTokenDelta { .. }))
        .count();
    assert!(delivered_deltas < 20);
    let completions = events
        .iter()
        .filter(|e| matches!(e, DebateEvent::RoleCompleted { .. }))
        .count();
    assert_eq!(completions, 5);
    assert!(matches!(
        events.last(),
        Some(DebateEvent::FinalAnswer { .. })
    ));

    // The analyst's output records the loss; its text still carries every
    // fragment because the buffer is independent of delivery.
    let analyst = result.rounds[0].get(DebateRole::Analyst).unwrap();
    assert!(analyst.lossy);
    assert_eq!(analyst.text, "tok ".repeat(20));
}

#[tokio::test]
async fn test_deadline_exhaustion_skips_roles_and_aborts() {
    let snapshot = five_provider_snapshot(&default_behaviors());
    let mut tuned = settings();
    tuned.min_role_budget = Duration::from_secs(5);
    let coordinator = DebateCoordinator::new(snapshot, tuned);
    let (sink, stream) = event_channel(64);
    let drain = tokio::spawn(stream.collect());

    // The whole request budget is below the per-role floor: every role is
    // skipped and no answer can be produced.
    let request = DebateRequest {
        id: RequestId::from_raw(6),
        prompt: "hi".to_string(),
        stream: false,
        deadline: Deadline::after(Duration::from_millis(200)),
    };
    let result = coordinator
        .run(&request, &SelectorPolicy::default(), sink, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, DebateStatus::Aborted);
    assert!(result.final_answer.is_empty());
    let events = drain.await.unwrap();
    assert!(matches!(events.last(), Some(DebateEvent::Aborted { .. })));
}

struct BreakAfterFirstRound;

impl RoundBreaker for BreakAfterFirstRound {
    fn should_break(&self, _round: &RoundOutputs) -> bool {
        true
    }
}

#[tokio::test]
async fn test_multi_round_runs_mediator_once() {
    let snapshot = five_provider_snapshot(&default_behaviors());
    let mut tuned = settings();
    tuned.rounds_max = 3;
    let coordinator = DebateCoordinator::new(snapshot.clone(), tuned.clone());
    let (sink, stream) = event_channel(256);
    let drain = tokio::spawn(stream.collect());

    let result = coordinator
        .run(
            &request(7, false),
            &SelectorPolicy::default(),
            sink,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    drain.await.unwrap();

    assert_eq!(result.rounds.len(), 3);
    // Earlier rounds carry four outputs, the final round five.
    assert_eq!(result.rounds[0].outputs.len(), 4);
    assert_eq!(result.rounds[1].outputs.len(), 4);
    assert_eq!(result.rounds[2].outputs.len(), 5);
    let mediators = result
        .rounds
        .iter()
        .flat_map(|round| round.outputs.iter())
        .filter(|output| output.role == DebateRole::Mediator)
        .count();
    assert_eq!(mediators, 1);

    // A converging breaker stops after the first round.
    let coordinator = DebateCoordinator::new(snapshot, tuned)
        .with_round_breaker(Arc::new(BreakAfterFirstRound));
    let (sink, stream) = event_channel(256);
    let drain = tokio::spawn(stream.collect());
    let result = coordinator
        .run(
            &request(8, false),
            &SelectorPolicy::default(),
            sink,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    drain.await.unwrap();
    assert_eq!(result.rounds.len(), 1);
    assert_eq!(result.rounds[0].outputs.len(), 5);
}

#[tokio::test]
async fn test_insufficient_providers_aborts_before_any_role() {
    let snapshot = Arc::new(RegistrySnapshot::new(
        BTreeMap::new(),
        Vec::new(),
        HashMap::new(),
    ));
    let coordinator = DebateCoordinator::new(snapshot, settings());
    let (sink, stream) = event_channel(16);
    let drain = tokio::spawn(stream.collect());

    let outcome = coordinator
        .run(
            &request(9, false),
            &SelectorPolicy::default(),
            sink,
            CancellationToken::new(),
        )
        .await;
    assert!(matches!(outcome, Err(CoreError::InsufficientProviders(_))));

    let events = drain.await.unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], DebateEvent::Aborted { .. }));
}
