//! Parse-once frame bus with duplicate suppression.
//!
//! The shared transport installs exactly one low-level listener per
//! socket; that listener publishes every raw frame here. The bus parses
//! each frame once and fans the typed result out to every subscriber
//! synchronously, in subscription order, so N independent consumers
//! never re-parse or double-count the same frame.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

/// A transport layer that redelivers can hand us the same raw frame
/// twice back to back; an identical frame within this window is
/// published only once.
pub const DUPLICATE_WINDOW: Duration = Duration::from_millis(50);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Fan-out hub for parsed frames of one channel.
pub struct FrameBus<T> {
    subscribers: Mutex<Vec<(u64, Callback<T>)>>,
    next_id: Mutex<u64>,
    last_raw: Mutex<Option<(String, Instant)>>,
}

impl<T> Default for FrameBus<T> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
            last_raw: Mutex::new(None),
        }
    }
}

impl<T: DeserializeOwned> FrameBus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for every frame published from now on.
    ///
    /// Callbacks run synchronously on the transport's read task and must
    /// not block; they should update state and return.
    pub async fn subscribe(self: &Arc<Self>, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription<T> {
        let mut next_id = self.next_id.lock().await;
        let id = *next_id;
        *next_id += 1;
        drop(next_id);

        self.subscribers.lock().await.push((id, Arc::new(callback)));

        Subscription {
            id,
            bus: Arc::clone(self),
        }
    }

    /// Parse one raw frame and fan it out.
    ///
    /// A malformed frame is logged and dropped; it never reaches a
    /// subscriber and never breaks the connection.
    pub async fn publish_raw(&self, raw: &str) {
        if self.is_duplicate(raw).await {
            tracing::debug!("Suppressing duplicate frame");
            return;
        }

        let frame: T = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed frame, dropping");
                return;
            }
        };

        let subscribers = self.subscribers.lock().await.clone();
        for (_, callback) in &subscribers {
            callback(&frame);
        }
    }

    /// Number of live subscriptions.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    async fn is_duplicate(&self, raw: &str) -> bool {
        let mut last = self.last_raw.lock().await;
        let now = Instant::now();
        let duplicate = matches!(
            &*last,
            Some((prev, at)) if prev == raw && now.duration_since(*at) < DUPLICATE_WINDOW
        );
        if !duplicate {
            *last = Some((raw.to_string(), now));
        }
        duplicate
    }

    async fn remove(&self, id: u64) {
        self.subscribers.lock().await.retain(|(sub_id, _)| *sub_id != id);
    }
}

/// Handle for one registered callback. Removing is explicit so cleanup
/// never depends on drop timing.
pub struct Subscription<T> {
    id: u64,
    bus: Arc<FrameBus<T>>,
}

impl<T: DeserializeOwned> Subscription<T> {
    /// Remove the callback. Safe to call more than once.
    pub async fn unsubscribe(&self) {
        self.bus.remove(self.id).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
