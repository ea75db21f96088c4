use std::sync::Arc;
use std::time::Duration;

use crate::ws::manager::WsManager;

/// Interval between heartbeat pings (in seconds).
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Spawn a background task that sends periodic Ping frames to all
/// connections on both WebSocket channels.
///
/// The task runs until aborted; the returned `JoinHandle` is aborted
/// during shutdown.
pub fn start_heartbeat(
    auth_channel: Arc<WsManager>,
    notify_channel: Arc<WsManager>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));

        loop {
            interval.tick().await;
            let auth = auth_channel.connection_count().await;
            let notify = notify_channel.connection_count().await;
            tracing::debug!(auth, notify, "WebSocket heartbeat ping");
            auth_channel.ping_all().await;
            notify_channel.ping_all().await;
        }
    })
}
