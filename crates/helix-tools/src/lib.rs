//! # helix-tools
//!
//! The tool collaborator contract consumed by protocol adapters (MCP, LSP,
//! ACP). The debate core exposes a read-only view of the running request
//! through [`ToolContext`] and consumes tools through [`ToolRegistry`]:
//! `list_tools` for discovery and `invoke_tool` for deadline-bounded,
//! synchronous invocation.

pub mod registry;
pub mod schema;

pub use registry::ToolRegistry;
pub use schema::{Tool, ToolContext, ToolDescriptor, ToolError, ToolResult};
