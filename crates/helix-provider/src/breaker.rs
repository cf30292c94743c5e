//! Per-adapter circuit breaking.
//!
//! Each adapter carries a [`CircuitBreaker`] tracking recent call outcomes
//! in a sliding window. When the failure ratio over the window crosses the
//! configured threshold (with a minimum sample size), the circuit opens and
//! calls fail fast with [`ProviderError::CircuitOpen`] until a cooldown
//! passes and a half-open probe succeeds.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use helix_config::BreakerConfig;
use helix_shared::Deadline;

use crate::adapter::{HealthStatus, ProviderAdapter, TextStream};
use crate::error::ProviderError;
use crate::types::{Capability, Completion, CompletionParams, ModelDescriptor};

/// Outcomes below this count never trip the breaker.
const MIN_SAMPLES: usize = 5;

/// Breaker tuning, taken from `circuit_breaker.*` configuration.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    /// Failure ratio over the window that opens the circuit.
    pub threshold: f64,
    /// Number of recent outcomes kept.
    pub window: usize,
    /// How long an open circuit waits before probing half-open.
    pub cooldown: Duration,
}

impl From<&BreakerConfig> for BreakerSettings {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            threshold: config.threshold,
            window: config.window,
            cooldown: config.cooldown,
        }
    }
}

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    outcomes: VecDeque<bool>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Sliding-window circuit breaker for one adapter.
pub struct CircuitBreaker {
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                outcomes: VecDeque::new(),
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Current state, transitioning `Open -> HalfOpen` if the cooldown has
    /// elapsed.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock().unwrap();
        self.advance_cooldown(&mut inner);
        inner.state
    }

    /// Whether a call may proceed right now. In half-open state only a
    /// single probe call is admitted at a time.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        self.advance_cooldown(&mut inner);
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => false,
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Records a successful call. A half-open probe success closes the
    /// circuit and clears the window.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.outcomes.clear();
                inner.opened_at = None;
                inner.probe_in_flight = false;
            }
            _ => self.push_outcome(&mut inner, true),
        }
    }

    /// Records a failed call. A half-open probe failure re-opens the
    /// circuit; in closed state the window may trip.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
            }
            BreakerState::Open => {}
            BreakerState::Closed => {
                self.push_outcome(&mut inner, false);
                let samples = inner.outcomes.len();
                if samples >= MIN_SAMPLES {
                    let failures = inner.outcomes.iter().filter(|ok| !**ok).count();
                    let ratio = failures as f64 / samples as f64;
                    if ratio > self.settings.threshold {
                        inner.state = BreakerState::Open;
                        inner.opened_at = Some(Instant::now());
                        inner.outcomes.clear();
                    }
                }
            }
        }
    }

    /// Releases the half-open probe slot without recording an outcome, for
    /// calls whose failure says nothing about provider health.
    pub fn record_neutral(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == BreakerState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    fn advance_cooldown(&self, inner: &mut BreakerInner) {
        if inner.state == BreakerState::Open {
            let elapsed = inner
                .opened_at
                .map(|at| at.elapsed() >= self.settings.cooldown)
                .unwrap_or(true);
            if elapsed {
                inner.state = BreakerState::HalfOpen;
                inner.probe_in_flight = false;
            }
        }
    }

    fn push_outcome(&self, inner: &mut BreakerInner, ok: bool) {
        inner.outcomes.push_back(ok);
        while inner.outcomes.len() > self.settings.window {
            inner.outcomes.pop_front();
        }
    }
}

/// Whether an error counts against provider health in the breaker window.
///
/// Caller-side failures (bad request, auth, missing model) and
/// cancellations say nothing about provider availability.
fn counts_for_breaker(error: &ProviderError) -> bool {
    matches!(
        error,
        ProviderError::Network { .. }
            | ProviderError::Internal { .. }
            | ProviderError::Timeout { .. }
    )
}

/// An adapter wrapped with its circuit breaker, in-flight cap, and an
/// outer deadline enforcement layer.
pub struct GuardedAdapter {
    inner: Arc<dyn ProviderAdapter>,
    breaker: Arc<CircuitBreaker>,
    in_flight: Arc<Semaphore>,
}

impl GuardedAdapter {
    pub fn new(
        inner: Arc<dyn ProviderAdapter>,
        settings: BreakerSettings,
        max_in_flight: usize,
    ) -> Self {
        Self {
            inner,
            breaker: Arc::new(CircuitBreaker::new(settings)),
            in_flight: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// The breaker, for observability.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn check_circuit(&self) -> Result<(), ProviderError> {
        if self.breaker.try_acquire() {
            Ok(())
        } else {
            debug!(provider = self.inner.id(), "circuit open, failing fast");
            Err(ProviderError::CircuitOpen {
                provider: self.inner.id().to_string(),
            })
        }
    }

    fn record<T>(&self, result: &Result<T, ProviderError>) {
        match result {
            Ok(_) => self.breaker.record_success(),
            Err(error) if counts_for_breaker(error) => {
                warn!(
                    provider = self.inner.id(),
                    error = %error,
                    "provider call failed"
                );
                self.breaker.record_failure();
            }
            Err(_) => self.breaker.record_neutral(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for GuardedAdapter {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn capabilities(&self) -> BTreeSet<Capability> {
        self.inner.capabilities()
    }

    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        params: &CompletionParams,
        deadline: Deadline,
    ) -> Result<Completion, ProviderError> {
        self.check_circuit()?;
        let _permit = self.in_flight.acquire().await.map_err(|_| {
            ProviderError::Internal {
                provider: self.inner.id().to_string(),
                model: Some(model.to_string()),
                status: None,
                detail: "adapter in-flight semaphore closed".to_string(),
            }
        })?;
        let result = match tokio::time::timeout_at(
            deadline.instant(),
            self.inner.complete(model, prompt, params, deadline),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: self.inner.id().to_string(),
                model: Some(model.to_string()),
            }),
        };
        self.record(&result);
        result
    }

    async fn complete_stream(
        &self,
        model: &str,
        prompt: &str,
        params: &CompletionParams,
        deadline: Deadline,
    ) -> Result<TextStream, ProviderError> {
        self.check_circuit()?;
        let _permit = self.in_flight.acquire().await.map_err(|_| {
            ProviderError::Internal {
                provider: self.inner.id().to_string(),
                model: Some(model.to_string()),
                status: None,
                detail: "adapter in-flight semaphore closed".to_string(),
            }
        })?;
        let result = match tokio::time::timeout_at(
            deadline.instant(),
            self.inner.complete_stream(model, prompt, params, deadline),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: self.inner.id().to_string(),
                model: Some(model.to_string()),
            }),
        };
        self.record(&result);
        result
    }

    async fn health_check(&self, deadline: Deadline) -> Result<HealthStatus, ProviderError> {
        match tokio::time::timeout_at(deadline.instant(), self.inner.health_check(deadline)).await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: self.inner.id().to_string(),
                model: None,
            }),
        }
    }

    async fn models(&self) -> Result<Vec<ModelDescriptor>, ProviderError> {
        self.inner.models().await
    }
}
