use std::sync::Arc;

use kaartwerk_core::store::IssueStore;
use kaartwerk_events::ChangeBus;
use kaartwerk_realtime::{LockTable, PresenceTable};

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (accessed by middleware and handlers).
    pub config: Arc<ServerConfig>,
    /// Connections on the authenticated coordination channel.
    pub auth_channel: Arc<WsManager>,
    /// Connections on the public notify channel.
    pub notify_channel: Arc<WsManager>,
    /// Edit-lock registry.
    pub locks: Arc<LockTable>,
    /// Online-presence registry.
    pub presence: Arc<PresenceTable>,
    /// Change-event fan-out bus.
    pub change_bus: Arc<ChangeBus>,
    /// Issue repository; publishes into `change_bus` on every commit.
    pub issues: Arc<IssueStore>,
}

impl AppState {
    /// Wire up a fresh state from configuration.
    ///
    /// The issue store is connected to the change bus here, so every
    /// committed mutation reaches notify-channel subscribers without
    /// the handlers knowing about the bus.
    pub fn new(config: ServerConfig) -> Self {
        let change_bus = Arc::new(ChangeBus::default());
        let issues = Arc::new(IssueStore::new(change_bus.clone()));
        Self {
            config: Arc::new(config),
            auth_channel: Arc::new(WsManager::new()),
            notify_channel: Arc::new(WsManager::new()),
            locks: Arc::new(LockTable::new()),
            presence: Arc::new(PresenceTable::new()),
            change_bus,
            issues,
        }
    }
}
