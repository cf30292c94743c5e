//! Request normalization.
//!
//! Transport adapters hand the gateway one of three shapes: a plain
//! prompt, an OpenAI-style chat message list, or a tool-enabled request.
//! All of them reduce to the internal [`NormalizedRequest`], created once
//! at ingress and immutable afterwards.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use helix_config::HelixConfig;
use helix_shared::{CoreError, Deadline, RequestId};
use helix_tools::ToolDescriptor;

/// One chat message in the OpenAI-compatible shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// The accepted request shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestBody {
    /// A plain completion prompt.
    Prompt { prompt: String },
    /// An OpenAI-compatible chat conversation.
    Chat { messages: Vec<ChatMessage> },
    /// A prompt plus tool descriptors supplied by a protocol adapter.
    ToolEnabled {
        prompt: String,
        tools: Vec<ToolDescriptor>,
    },
}

/// Whether the request runs the full debate or a direct completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    Single,
    #[default]
    Debate,
}

/// Per-request policy overrides; anything unset falls back to
/// configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyOverrides {
    #[serde(default)]
    pub preferred_providers: Option<Vec<String>>,
    #[serde(default)]
    pub forbidden_providers: Option<Vec<String>>,
    #[serde(default)]
    pub free_only: Option<bool>,
    #[serde(default)]
    pub allow_oauth: Option<bool>,
    #[serde(default)]
    pub strategy: Option<helix_debate::StrategyKind>,
    #[serde(default)]
    pub rounds_max: Option<u32>,
    /// Client-supplied deadline budget.
    #[serde(default, with = "humantime_option")]
    pub deadline: Option<Duration>,
}

mod humantime_option {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let millis: Option<u64> = Option::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

/// What a transport adapter submits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub body: RequestBody,
    #[serde(default)]
    pub mode: RequestMode,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub policy: PolicyOverrides,
}

/// The internal request entity: created by the gateway at ingress,
/// immutable thereafter.
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    pub id: RequestId,
    pub prompt: String,
    pub mode: RequestMode,
    pub stream: bool,
    pub deadline: Deadline,
    pub deadline_budget: Duration,
    pub policy: PolicyOverrides,
    pub tools: Vec<ToolDescriptor>,
    pub accepted_at: DateTime<Utc>,
}

/// Flattens a chat conversation into one prompt, tagging non-user turns.
fn flatten_chat(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|message| !message.content.trim().is_empty())
        .map(|message| {
            if message.role == "user" {
                message.content.clone()
            } else {
                format!("[{}] {}", message.role, message.content)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Normalizes and validates a submission.
///
/// Fails with `InvalidRequest` for an empty prompt or a deadline too small
/// to give each of the five roles a viable budget.
pub fn normalize(
    id: RequestId,
    submit: SubmitRequest,
    config: &HelixConfig,
) -> Result<NormalizedRequest, CoreError> {
    let (prompt, tools) = match submit.body {
        RequestBody::Prompt { prompt } => (prompt, Vec::new()),
        RequestBody::Chat { messages } => (flatten_chat(&messages), Vec::new()),
        RequestBody::ToolEnabled { prompt, tools } => (prompt, tools),
    };
    if prompt.trim().is_empty() {
        return Err(CoreError::InvalidRequest("prompt must be non-empty".to_string()));
    }

    let deadline_budget = submit
        .policy
        .deadline
        .unwrap_or(config.limits.request_deadline);
    let min_viable = config.limits.min_role_budget * 5;
    if deadline_budget < min_viable {
        return Err(CoreError::InvalidRequest(format!(
            "deadline {}ms is below the minimum viable debate budget of {}ms",
            deadline_budget.as_millis(),
            min_viable.as_millis()
        )));
    }

    Ok(NormalizedRequest {
        id,
        prompt,
        mode: submit.mode,
        stream: submit.stream,
        deadline: Deadline::after(deadline_budget),
        deadline_budget,
        policy: submit.policy,
        tools,
        accepted_at: Utc::now(),
    })
}
