//! Scripted WebSocket server for transport tests.
//!
//! Accepts one connection at a time, records every text frame it
//! receives, and lets the test push frames to (or kick) the current
//! connection. Sequential accepts make reconnects observable.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, Mutex};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Commands the test can issue to the live connection.
#[derive(Debug, Clone)]
pub enum Command {
    /// Send a text frame to the connected client.
    Send(String),
    /// Close the current connection (simulates a server-side drop).
    Kick,
}

pub struct TestServer {
    pub addr: SocketAddr,
    /// Number of connections accepted so far.
    pub accepted: Arc<AtomicUsize>,
    /// Number of sessions that have ended.
    pub closed: Arc<AtomicUsize>,
    /// Every text frame received, across all sessions in order.
    pub received: Arc<Mutex<Vec<String>>>,
    commands: broadcast::Sender<Command>,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn send(&self, frame: &str) {
        let _ = self.commands.send(Command::Send(frame.to_string()));
    }

    pub fn kick(&self) {
        let _ = self.commands.send(Command::Kick);
    }

    /// Wait until `predicate` holds over the received frames.
    pub async fn wait_for_received<F>(&self, predicate: F)
    where
        F: Fn(&[String]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if predicate(&self.received.lock().await) {
                return;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("server never received the expected frames");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until `count` connections have been accepted.
    pub async fn wait_for_accepts(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.accepted.load(Ordering::SeqCst) < count {
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "expected {count} accepts, saw {}",
                    self.accepted.load(Ordering::SeqCst)
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until `count` sessions have closed.
    pub async fn wait_for_closes(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.closed.load(Ordering::SeqCst) < count {
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "expected {count} closes, saw {}",
                    self.closed.load(Ordering::SeqCst)
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Bind an ephemeral port and start accepting connections.
pub async fn spawn_server() -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    let accepted = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(Mutex::new(Vec::new()));
    let (commands, _) = broadcast::channel::<Command>(64);

    let accepted_task = Arc::clone(&accepted);
    let closed_task = Arc::clone(&closed);
    let received_task = Arc::clone(&received);
    let commands_task = commands.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            // Subscribe before the handshake: the client only sees Open
            // after the handshake, so commands issued then are not lost.
            let mut commands = commands_task.subscribe();
            let Ok(mut ws) = accept_async(stream).await else {
                continue;
            };
            accepted_task.fetch_add(1, Ordering::SeqCst);

            loop {
                tokio::select! {
                    command = commands.recv() => match command {
                        Ok(Command::Send(frame)) => {
                            if ws.send(Message::Text(frame.into())).await.is_err() {
                                break;
                            }
                        }
                        Ok(Command::Kick) => {
                            let _ = ws.close(None).await;
                            break;
                        }
                        Err(_) => break,
                    },
                    msg = ws.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            received_task.lock().await.push(text.to_string());
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(_)) => break,
                    },
                }
            }
            closed_task.fetch_add(1, Ordering::SeqCst);
        }
    });

    TestServer {
        addr,
        accepted,
        closed,
        received,
        commands,
    }
}

/// Poll a condition until it holds or a 5 s deadline passes.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition never became true");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
