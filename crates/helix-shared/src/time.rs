//! Deadlines and nested time budgets.
//!
//! Every layer of the debate pipeline works against an absolute deadline:
//! request > coordinator > role > attempt, each strictly within its parent.
//! `Deadline` wraps a tokio instant so it can be handed directly to
//! `tokio::time::timeout_at`.

use std::time::Duration;

use tokio::time::Instant;

/// An absolute point in time a piece of work must finish by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self(Instant::now() + budget)
    }

    /// A deadline at an explicit instant.
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    /// The underlying instant, for `tokio::time::timeout_at`.
    pub fn instant(&self) -> Instant {
        self.0
    }

    /// Time remaining until the deadline, zero if already past.
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has already passed.
    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Derives a child deadline at most `budget` from now, clamped so it
    /// never outlives the parent.
    pub fn child(&self, budget: Duration) -> Deadline {
        Self((Instant::now() + budget).min(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remaining_counts_down() {
        let deadline = Deadline::after(Duration::from_secs(10));
        assert!(!deadline.expired());
        assert!(deadline.remaining() <= Duration::from_secs(10));
        assert!(deadline.remaining() > Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_child_never_outlives_parent() {
        let parent = Deadline::after(Duration::from_millis(50));
        let child = parent.child(Duration::from_secs(60));
        assert!(child.instant() <= parent.instant());
    }

    #[tokio::test]
    async fn test_expired_after_elapse() {
        let deadline = Deadline::after(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(deadline.expired());
    }
}
