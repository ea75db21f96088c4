//! In-process change-event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`ChangeBus`] is the fan-out hub for [`ChangeEvent`]s. It is designed
//! to be shared via `Arc<ChangeBus>`: the issue store publishes into it
//! through the [`ChangeSink`] trait, and every notify-channel connection
//! holds its own [`broadcast::Receiver`].

use tokio::sync::broadcast;

use kaartwerk_core::event::{ChangeEvent, ChangeSink};

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out bus for issue change events.
///
/// Events are ephemeral: if there are no subscribers, or a subscriber
/// lags past the buffer, events are simply lost. Clients recover by
/// re-fetching current state, never by replay.
pub struct ChangeBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed events are
    /// dropped and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscriptions, exposed for observability.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl ChangeSink for ChangeBus {
    /// Publish an event to all current subscribers.
    ///
    /// A send error only means there are zero receivers; that is normal
    /// when no viewer is connected, so it is ignored.
    fn publish(&self, event: ChangeEvent) {
        tracing::debug!(
            issue_id = event.issue_id(),
            subscribers = self.subscriber_count(),
            "Publishing change event",
        );
        let _ = self.sender.send(event);
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
