//! Process-wide request identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// A request identifier, unique and monotonically increasing within the
/// process lifetime.
///
/// The identifier doubles as the source of the selection seed so that two
/// submissions of the same request id make identical tie-break decisions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Allocates the next request id.
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Builds a request id from a raw value. Intended for tests and replay.
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Derives the deterministic seed used for selection and consensus
    /// tie-breaks.
    pub fn seed(&self) -> u64 {
        crate::hash::stable_hash(&self.0.to_be_bytes())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{:08}", self.0)
    }
}
