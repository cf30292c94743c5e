//! The per-request streaming bus.
//!
//! One bounded channel per request. Role runners and the coordinator write
//! into an [`EventSink`]; the caller drains an [`EventStream`]. Writers
//! never block indefinitely: when the channel is full and the caller is not
//! draining, token deltas are dropped from the tail after a short grace
//! period. Lifecycle events are never dropped. The sink enforces the
//! single-terminal-event invariant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::DebateEvent;

/// How long a full channel is given to drain before a token delta is
/// dropped.
pub const DELTA_GRACE: Duration = Duration::from_millis(50);

/// How long the terminal event waits on a full channel before the sink
/// gives up.
const TERMINAL_GRACE: Duration = Duration::from_secs(5);

/// Creates the per-request event channel.
pub fn event_channel(capacity: usize) -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        EventSink {
            tx,
            terminal_sent: Arc::new(AtomicBool::new(false)),
        },
        EventStream { rx },
    )
}

/// Writer half of the bus. Cloneable; all clones share the terminal latch.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<DebateEvent>,
    terminal_sent: Arc<AtomicBool>,
}

impl EventSink {
    /// Publishes a lifecycle event. Waits for channel space (bounded by the
    /// terminal grace period for terminal events) and silently drops
    /// anything after a terminal event has been sent.
    pub async fn send_lifecycle(&self, event: DebateEvent) {
        debug_assert!(!event.is_droppable(), "deltas go through send_delta");
        if self.terminal_sent.load(Ordering::Acquire) {
            debug!(?event, "event after terminal, dropped");
            return;
        }
        let terminal = event.is_terminal();
        if terminal {
            self.terminal_sent.store(true, Ordering::Release);
        }
        let grace = if terminal {
            TERMINAL_GRACE
        } else {
            // Non-terminal lifecycle events wait for the caller; the
            // request deadline above bounds the overall wait.
            Duration::from_secs(60)
        };
        match self.tx.send_timeout(event, grace).await {
            Ok(()) => {}
            Err(mpsc::error::SendTimeoutError::Timeout(event)) => {
                warn!(?event, "caller not draining, lifecycle event dropped after grace");
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {}
        }
    }

    /// Publishes a token delta. Returns `false` when the delta was dropped
    /// because the caller stopped draining; the runner records this on the
    /// role output as `lossy`.
    pub async fn send_delta(&self, event: DebateEvent) -> bool {
        debug_assert!(event.is_droppable(), "lifecycle events go through send_lifecycle");
        if self.terminal_sent.load(Ordering::Acquire) {
            return false;
        }
        match self.tx.send_timeout(event, DELTA_GRACE).await {
            Ok(()) => true,
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => false,
            Err(mpsc::error::SendTimeoutError::Closed(_)) => false,
        }
    }

    /// Whether the terminal event has been published.
    pub fn terminated(&self) -> bool {
        self.terminal_sent.load(Ordering::Acquire)
    }
}

/// Reader half of the bus.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<DebateEvent>,
}

impl EventStream {
    /// The next event, or `None` once the bus has closed.
    pub async fn next(&mut self) -> Option<DebateEvent> {
        self.rx.recv().await
    }

    /// Drains every remaining event.
    pub async fn collect(mut self) -> Vec<DebateEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}
