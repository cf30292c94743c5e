//! # helix-store
//!
//! The narrow persistence boundary of the debate core: a key/value store
//! for debate log records, keyed by request id. Writes are best-effort and
//! never block the event stream's terminal event; a real deployment backs
//! this with PostgreSQL or Redis, tests and the CLI use the in-memory
//! implementation.

pub mod store;

pub use store::{spawn_log_write, DebateLogRecord, DebateLogStore, MemoryLogStore};
