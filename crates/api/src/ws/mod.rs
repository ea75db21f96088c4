//! WebSocket channels: the authenticated coordination channel (locks +
//! presence) and the public notify channel (issue change events).

pub mod auth_channel;
pub mod heartbeat;
pub mod manager;
pub mod notify_channel;

pub use manager::WsManager;
