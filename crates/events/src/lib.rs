//! kaartwerk change-event fan-out.
//!
//! Provides [`ChangeBus`], the in-process publish/subscribe hub that
//! connects the issue store's commit hook to the notify WebSocket
//! channel. Each connection handler takes its own subscription, so
//! listener growth stays bounded and visible instead of accumulating on
//! one shared emitter.

pub mod bus;

pub use bus::ChangeBus;
