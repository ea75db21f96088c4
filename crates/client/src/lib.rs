//! Client-side building blocks for the kaartwerk coordination channels.
//!
//! - [`transport`] — the refcounted shared WebSocket transport and its
//!   registry. N consumers share one socket per channel URL.
//! - [`bus`] — the parse-once frame bus each transport publishes into.
//! - [`reconnect`] — bounded exponential-backoff reconnect policy.
//! - [`locks`] — edit-lock consumer ([`LockClient`](locks::LockClient)).
//! - [`presence`] — online-presence consumer
//!   ([`PresenceClient`](presence::PresenceClient)).
//! - [`notifications`] — issue change-event consumer
//!   ([`NotificationClient`](notifications::NotificationClient)).

pub mod bus;
pub mod error;
pub mod locks;
pub mod notifications;
pub mod presence;
pub mod reconnect;
pub mod transport;

pub use error::TransportError;
pub use transport::{ConnectionState, TransportHandle, TransportRegistry, TransportStatus};
