//! Identity verification for HTTP handlers and the auth WebSocket channel.
//!
//! Token *issuance* is the upstream identity provider's job; this module
//! only verifies HS256 access tokens and turns their claims into an
//! [`Identity`].

pub mod identity;
pub mod jwt;

pub use identity::{AuthUser, Identity};
