//! # helix-shared
//!
//! Types shared across the HelixAgent workspace: request identifiers,
//! deadlines and nested time budgets, the core error taxonomy, and the
//! stable hash used for deterministic tie-breaks.

pub mod error;
pub mod hash;
pub mod id;
pub mod time;

pub use error::{ApiError, CoreError, ErrorCode};
pub use hash::{stable_hash, stable_hash_parts};
pub use id::RequestId;
pub use time::Deadline;
