//! # helix-gateway
//!
//! The single normalized entry point in front of the debate core. Every
//! transport adapter (OpenAI-compatible HTTP, MCP/LSP/ACP, CLI) reduces its
//! request shape to [`SubmitRequest`] and calls [`Gateway::submit`]; the
//! gateway assigns the request id, attaches and validates the deadline,
//! enforces the global concurrency ceiling, and routes to the debate
//! coordinator or the direct single-provider path.

pub mod gateway;
pub mod request;

pub use gateway::{DebateResponse, Gateway, StreamingDebate, SubmitOutcome};
pub use request::{
    ChatMessage, NormalizedRequest, PolicyOverrides, RequestBody, RequestMode, SubmitRequest,
};
