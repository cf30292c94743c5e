//! Tool trait and supporting types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use helix_shared::Deadline;

/// A tool made available to the debate core by a protocol adapter.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;

    /// Human-readable description shown to models.
    fn description(&self) -> &str;

    /// JSON schema of the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Invokes the tool. Invocation is synchronous with respect to the role
    /// that triggered it; the registry additionally enforces `deadline`
    /// from the outside.
    async fn invoke(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
        deadline: Deadline,
    ) -> Result<ToolResult, ToolError>;
}

/// A discoverable tool description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The read-only view of the running request handed to a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolContext {
    /// The request this invocation belongs to.
    pub request_id: String,
    /// The role that triggered the invocation, when one is running.
    pub role: Option<String>,
    /// The coordinator state at invocation time (e.g. `running:critic`).
    pub state: String,
}

/// The result of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

/// Tool invocation failures.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("no tool named '{0}' is registered")]
    NotFound(String),
    #[error("tool '{0}' exceeded its deadline")]
    Timeout(String),
    #[error("tool '{name}' failed: {message}")]
    Failed { name: String, message: String },
}
