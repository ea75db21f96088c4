//! Shared domain types for the kaartwerk real-time coordination core.
//!
//! This crate carries everything both sides of the wire need to agree on:
//!
//! - [`types`] — id and timestamp aliases.
//! - [`error`] — the domain error enum.
//! - [`issue`] — the issue record types handled by the store and relayed
//!   in change events.
//! - [`event`] — [`ChangeEvent`](event::ChangeEvent) and the
//!   [`ChangeSink`](event::ChangeSink) seam the store publishes into.
//! - [`protocol`] — the `{type, payload}` wire frames for the auth and
//!   notify WebSocket channels.
//! - [`store`] — the in-memory issue repository with its commit hook.
//!
//! It has no dependency on axum or any transport; the `api` and `client`
//! crates both build on it.

pub mod error;
pub mod event;
pub mod issue;
pub mod protocol;
pub mod store;
pub mod types;
