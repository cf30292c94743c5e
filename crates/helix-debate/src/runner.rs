//! Role execution.
//!
//! Runs one role against its assigned chain: the primary first, then each
//! fallback in order. Every attempt is bounded by its own deadline inside
//! the remaining role budget; every attempt, successful or not, is recorded
//! on the resulting [`RoleOutput`]. In streaming mode token deltas are
//! forwarded live and the buffer of a failed attempt is discarded, so the
//! final text never concatenates partials across attempts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use helix_provider::{
    CompletionParams, FallbackSeverity, ModelDescriptor, ProviderAdapter, ProviderError,
    RegistrySnapshot, Usage,
};
use helix_shared::Deadline;

use crate::bus::EventSink;
use crate::events::DebateEvent;
use crate::types::{AttemptRecord, RoleAssignment, RoleOutput, RoleStatus};

/// Runs one role to completion and returns its immutable output.
///
/// Exactly one `RoleCompleted` event is emitted unless the role was
/// cancelled, in which case the coordinator owns the terminal `Aborted`.
#[allow(clippy::too_many_arguments)]
pub async fn run_role(
    snapshot: &RegistrySnapshot,
    assignment: &RoleAssignment,
    prompt: &str,
    params: &CompletionParams,
    role_deadline: Deadline,
    attempt_budget: Duration,
    streaming: bool,
    sink: &EventSink,
    cancel: &CancellationToken,
) -> RoleOutput {
    let role = assignment.role;
    let chain: Vec<&ModelDescriptor> = assignment.chain().collect();
    let role_started = Instant::now();
    let mut attempts: Vec<AttemptRecord> = Vec::new();
    let mut lossy = false;

    sink.send_lifecycle(DebateEvent::RoleStarted {
        role,
        model: assignment.primary.model_ref(),
    })
    .await;

    for (index, model) in chain.iter().enumerate() {
        if role_deadline.expired() {
            debug!(%role, "role budget exhausted before attempt");
            break;
        }
        if cancel.is_cancelled() {
            return cancelled_output(role, role_started, attempts, lossy);
        }

        let Some(adapter) = snapshot.adapter(&model.provider) else {
            attempts.push(AttemptRecord {
                model: model.model_ref(),
                error: Some(format!(
                    "no adapter registered for provider '{}'",
                    model.provider
                )),
                latency: Duration::ZERO,
                non_recoverable: false,
            });
            continue;
        };

        let attempt_deadline = role_deadline.child(attempt_budget);
        let attempt_started = Instant::now();
        let outcome = if streaming {
            attempt_streaming(
                &adapter,
                model,
                prompt,
                params,
                attempt_deadline,
                role,
                sink,
                cancel,
                &mut lossy,
            )
            .await
        } else {
            attempt_buffered(&adapter, model, prompt, params, attempt_deadline, cancel).await
        };
        let latency = attempt_started.elapsed();

        match outcome {
            Ok((text, tokens)) => {
                attempts.push(AttemptRecord {
                    model: model.model_ref(),
                    error: None,
                    latency,
                    non_recoverable: false,
                });
                let output = RoleOutput {
                    role,
                    model: Some(model.model_ref()),
                    latency: role_started.elapsed(),
                    text,
                    tokens,
                    status: if index == 0 {
                        RoleStatus::Succeeded
                    } else {
                        RoleStatus::FellBack
                    },
                    attempts,
                    lossy,
                    cancelled: false,
                };
                sink.send_lifecycle(DebateEvent::RoleCompleted {
                    output: output.clone(),
                })
                .await;
                return output;
            }
            Err(error) => {
                if error.is_cancelled() || cancel.is_cancelled() {
                    attempts.push(AttemptRecord {
                        model: model.model_ref(),
                        error: Some(error.to_string()),
                        latency,
                        non_recoverable: false,
                    });
                    return cancelled_output(role, role_started, attempts, lossy);
                }
                let non_recoverable =
                    error.fallback_severity() == FallbackSeverity::NonRecoverable;
                if non_recoverable {
                    warn!(
                        %role,
                        model = %model.model_ref(),
                        error = %error,
                        "non-recoverable error, walking fallback chain anyway"
                    );
                }
                attempts.push(AttemptRecord {
                    model: model.model_ref(),
                    error: Some(error.to_string()),
                    latency,
                    non_recoverable,
                });
                if let Some(next) = chain.get(index + 1) {
                    sink.send_lifecycle(DebateEvent::RoleFallbackTriggered {
                        role,
                        failed: model.model_ref(),
                        next: next.model_ref(),
                        error: error.to_string(),
                    })
                    .await;
                }
            }
        }
    }

    // Chain exhausted or budget gone.
    let output = RoleOutput {
        role,
        model: None,
        latency: role_started.elapsed(),
        text: String::new(),
        tokens: None,
        status: RoleStatus::Failed,
        attempts,
        lossy,
        cancelled: false,
    };
    sink.send_lifecycle(DebateEvent::RoleCompleted {
        output: output.clone(),
    })
    .await;
    output
}

fn cancelled_output(
    role: crate::role::DebateRole,
    role_started: Instant,
    attempts: Vec<AttemptRecord>,
    lossy: bool,
) -> RoleOutput {
    RoleOutput {
        role,
        model: None,
        latency: role_started.elapsed(),
        text: String::new(),
        tokens: None,
        status: RoleStatus::Failed,
        attempts,
        lossy,
        cancelled: true,
    }
}

async fn attempt_buffered(
    adapter: &Arc<dyn ProviderAdapter>,
    model: &ModelDescriptor,
    prompt: &str,
    params: &CompletionParams,
    deadline: Deadline,
    cancel: &CancellationToken,
) -> Result<(String, Option<Usage>), ProviderError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ProviderError::Cancelled {
            provider: model.provider.clone(),
        }),
        result = adapter.complete(&model.model, prompt, params, deadline) => {
            result.map(|completion| (completion.text, completion.usage))
        }
    }
}

/// One streaming attempt. Deltas are forwarded live; the accumulated
/// buffer is returned only on success and discarded on error, so a caller
/// never observes concatenated partials across attempts.
#[allow(clippy::too_many_arguments)]
async fn attempt_streaming(
    adapter: &Arc<dyn ProviderAdapter>,
    model: &ModelDescriptor,
    prompt: &str,
    params: &CompletionParams,
    deadline: Deadline,
    role: crate::role::DebateRole,
    sink: &EventSink,
    cancel: &CancellationToken,
    lossy: &mut bool,
) -> Result<(String, Option<Usage>), ProviderError> {
    let mut stream = tokio::select! {
        _ = cancel.cancelled() => {
            return Err(ProviderError::Cancelled {
                provider: model.provider.clone(),
            });
        }
        result = adapter.complete_stream(&model.model, prompt, params, deadline) => result?,
    };

    let mut buffer = String::new();
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ProviderError::Cancelled {
                    provider: model.provider.clone(),
                });
            }
            _ = tokio::time::sleep_until(deadline.instant()) => {
                return Err(ProviderError::Timeout {
                    provider: model.provider.clone(),
                    model: Some(model.model.clone()),
                });
            }
            item = stream.next() => item,
        };
        match item {
            None => break,
            Some(Ok(delta)) => {
                buffer.push_str(&delta);
                let delivered = sink
                    .send_delta(DebateEvent::RoleTokenDelta {
                        role,
                        delta,
                    })
                    .await;
                if !delivered {
                    *lossy = true;
                }
            }
            Some(Err(error)) => return Err(error),
        }
    }
    Ok((buffer, None))
}
