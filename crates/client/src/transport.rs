//! Refcounted shared WebSocket transport.
//!
//! One [`SharedTransport`] per channel URL, handed out as
//! [`TransportHandle`]s through an explicit [`TransportRegistry`] — no
//! process-wide globals, so teardown and tests stay deterministic. The
//! first acquire opens the socket lazily and installs exactly one
//! reader, which publishes every inbound frame into the channel's
//! [`FrameBus`]. The socket closes once every handle is released.
//!
//! On an outage the transport reconnects with bounded backoff; when the
//! budget runs out it parks in a terminal [`TransportStatus::Failed`]
//! so the application can show a persistent connection-loss warning.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::bus::{FrameBus, Subscription};
use crate::error::TransportError;
use crate::reconnect::{next_delay, ReconnectConfig};

/// Outbound frame queue depth per transport.
const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Lifecycle of a shared transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    /// Created but no consumer has triggered a connect yet.
    Idle,
    /// First connection attempt in progress.
    Connecting,
    /// Socket is up.
    Open,
    /// Socket dropped; retrying with backoff.
    Reconnecting,
    /// Shut down deliberately (all handles released).
    Closed,
    /// Retry budget exhausted. Terminal.
    Failed,
}

/// Status plus reconnect generation, published through a `watch`
/// channel so consumers can both poll and await changes.
///
/// `generation` counts successful connections. A consumer that sees it
/// advance past the value it first connected under knows the socket was
/// replaced and must re-assert its server-side state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    pub status: TransportStatus,
    pub generation: u64,
}

/// Registry of shared transports, keyed by channel URL.
///
/// Cheap to clone; all clones share the same table. Typed by the
/// channel's inbound frame shape, so the auth and notify channels get
/// separate registries (or separate entries in one, if their frame
/// types were unified).
pub struct TransportRegistry<T> {
    inner: Arc<RegistryInner<T>>,
}

impl<T> Clone for TransportRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct RegistryInner<T> {
    /// Weak entries: a transport lives as long as its handles. A dead
    /// entry is replaced on the next acquire.
    transports: Mutex<HashMap<String, Weak<SharedTransport<T>>>>,
    reconnect: ReconnectConfig,
}

impl<T> Default for TransportRegistry<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}

impl<T> TransportRegistry<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(reconnect: ReconnectConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                transports: Mutex::new(HashMap::new()),
                reconnect,
            }),
        }
    }

    /// Get a handle on the shared transport for `url`, starting its
    /// connection task if this is the first live acquire.
    ///
    /// N acquires for the same URL share one socket; each returned
    /// handle holds one reference.
    pub async fn acquire(&self, url: &str) -> TransportHandle<T> {
        let mut transports = self.inner.transports.lock().await;

        let transport = match transports
            .get(url)
            .and_then(Weak::upgrade)
            .filter(|t| !t.cancel.is_cancelled())
        {
            Some(existing) => existing,
            None => {
                let created = SharedTransport::open(url.to_string(), self.inner.reconnect.clone());
                transports.insert(url.to_string(), Arc::downgrade(&created));
                created
            }
        };

        transport.refcount.fetch_add(1, Ordering::SeqCst);
        TransportHandle {
            transport,
            released: AtomicBool::new(false),
        }
    }
}

/// One live (or connecting) socket shared by every consumer of a URL.
pub struct SharedTransport<T> {
    bus: Arc<FrameBus<T>>,
    outbound: mpsc::Sender<String>,
    state_tx: watch::Sender<ConnectionState>,
    refcount: AtomicUsize,
    cancel: CancellationToken,
}

impl<T> SharedTransport<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    /// Spawn the connection task for `url` and return the shared handle
    /// target. The task owns the socket for its whole life.
    fn open(url: String, reconnect: ReconnectConfig) -> Arc<Self> {
        let bus = Arc::new(FrameBus::new());
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let (state_tx, _) = watch::channel(ConnectionState {
            status: TransportStatus::Idle,
            generation: 0,
        });
        let cancel = CancellationToken::new();

        let transport = Arc::new(Self {
            bus: Arc::clone(&bus),
            outbound: outbound_tx,
            state_tx: state_tx.clone(),
            refcount: AtomicUsize::new(0),
            cancel: cancel.clone(),
        });

        tokio::spawn(async move {
            run_connection_loop(url, bus, outbound_rx, state_tx, reconnect, cancel).await;
        });

        transport
    }
}

/// A refcounted reference to a [`SharedTransport`].
///
/// Cloning takes another reference; dropping or calling
/// [`release`](Self::release) gives it back. The socket closes when the
/// count reaches zero, so short-lived consumers never thrash the
/// connection used by longer-lived ones.
pub struct TransportHandle<T> {
    transport: Arc<SharedTransport<T>>,
    released: AtomicBool,
}

impl<T> TransportHandle<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    /// Register a callback for every parsed inbound frame.
    pub async fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription<T> {
        self.transport.bus.subscribe(callback).await
    }

    /// Serialize `frame` as JSON and queue it for sending.
    ///
    /// Queued frames survive a reconnect: the queue is drained into
    /// whichever socket is current when the frame reaches the front.
    pub async fn send<F: Serialize>(&self, frame: &F) -> Result<(), TransportError> {
        let json = serde_json::to_string(frame)?;
        self.transport
            .outbound
            .send(json)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Watch the transport's connection state.
    pub fn status(&self) -> watch::Receiver<ConnectionState> {
        self.transport.state_tx.subscribe()
    }

    /// Give this reference back. Safe to call more than once; the last
    /// release cancels the connection task and closes the socket.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.transport.refcount.fetch_sub(1, Ordering::SeqCst) == 1 {
            tracing::debug!("Last handle released, closing transport");
            self.transport.cancel.cancel();
        }
    }
}

impl<T> Clone for TransportHandle<T> {
    fn clone(&self) -> Self {
        self.transport.refcount.fetch_add(1, Ordering::SeqCst);
        Self {
            transport: Arc::clone(&self.transport),
            released: AtomicBool::new(false),
        }
    }
}

impl<T> Drop for TransportHandle<T> {
    fn drop(&mut self) {
        // Same bookkeeping as release(), without assuming it was called.
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.transport.refcount.fetch_sub(1, Ordering::SeqCst) == 1 {
            tracing::debug!("Last handle dropped, closing transport");
            self.transport.cancel.cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

/// Core connection loop: connect -> pump frames -> reconnect.
///
/// Runs until the cancellation token fires (all handles released) or
/// the retry budget is exhausted.
async fn run_connection_loop<T>(
    url: String,
    bus: Arc<FrameBus<T>>,
    mut outbound_rx: mpsc::Receiver<String>,
    state_tx: watch::Sender<ConnectionState>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) where
    T: DeserializeOwned + Send + Sync + 'static,
{
    let mut ever_open = false;
    let mut delay = reconnect.initial_delay;
    let mut retries_left = reconnect.max_retries;

    loop {
        state_tx.send_modify(|state| {
            state.status = if ever_open {
                TransportStatus::Reconnecting
            } else {
                TransportStatus::Connecting
            };
        });

        let connected = tokio::select! {
            _ = cancel.cancelled() => {
                state_tx.send_modify(|s| s.status = TransportStatus::Closed);
                return;
            }
            result = connect_async(&url) => result,
        };

        match connected {
            Ok((ws_stream, _response)) => {
                ever_open = true;
                delay = reconnect.initial_delay;
                retries_left = reconnect.max_retries;

                state_tx.send_modify(|state| {
                    state.generation += 1;
                    state.status = TransportStatus::Open;
                });
                let generation = state_tx.borrow().generation;
                tracing::info!(url = %url, generation, "Transport connected");

                let cancelled = pump(ws_stream, &bus, &mut outbound_rx, &cancel).await;
                if cancelled {
                    state_tx.send_modify(|s| s.status = TransportStatus::Closed);
                    return;
                }
                tracing::warn!(url = %url, "Transport connection lost");
            }
            Err(e) => {
                if retries_left == 0 {
                    tracing::error!(url = %url, error = %e, "Retry budget exhausted, giving up");
                    state_tx.send_modify(|s| s.status = TransportStatus::Failed);
                    return;
                }
                retries_left -= 1;
                tracing::warn!(
                    url = %url,
                    error = %e,
                    retries_left,
                    delay_ms = delay.as_millis() as u64,
                    "Connect failed, backing off",
                );

                tokio::select! {
                    _ = cancel.cancelled() => {
                        state_tx.send_modify(|s| s.status = TransportStatus::Closed);
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                delay = next_delay(delay, &reconnect);
            }
        }
    }
}

/// Pump one live socket: inbound frames go to the bus, queued outbound
/// frames go to the sink. Returns `true` if the loop ended because of
/// cancellation rather than a socket failure.
async fn pump<T: DeserializeOwned>(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    bus: &FrameBus<T>,
    outbound_rx: &mut mpsc::Receiver<String>,
    cancel: &CancellationToken,
) -> bool {
    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return true;
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(json) => {
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            return false;
                        }
                    }
                    // All senders gone; the transport is being torn down.
                    None => return true,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => bus.publish_raw(&text).await,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => return false,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "Transport receive error");
                        return false;
                    }
                }
            }
        }
    }
}
