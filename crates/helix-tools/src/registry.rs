//! Tool registry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use helix_shared::Deadline;

use crate::schema::{Tool, ToolContext, ToolDescriptor, ToolError, ToolResult};

/// A registry of tools, keyed by name.
///
/// Protocol adapters register their tools at startup; the debate core
/// discovers them with [`ToolRegistry::list_tools`] and runs them with
/// [`ToolRegistry::invoke_tool`].
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registers a tool. A duplicate name overwrites the previous tool
    /// with a warning.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "tool re-registered, previous entry replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Descriptors for every registered tool, sorted by name.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> = self
            .tools
            .values()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Invokes a tool by name, bounded by `deadline`.
    pub async fn invoke_tool(
        &self,
        name: &str,
        args: serde_json::Value,
        ctx: &ToolContext,
        deadline: Deadline,
    ) -> Result<ToolResult, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        match tokio::time::timeout_at(deadline.instant(), tool.invoke(args, ctx, deadline)).await
        {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout(name.to_string())),
        }
    }
}
