//! Server-side coordination registries for kaartwerk.
//!
//! - [`LockTable`](lock::LockTable) — which connection holds the edit
//!   lock on which issue.
//! - [`PresenceTable`](presence::PresenceTable) — which authenticated
//!   connections are currently online.
//! - [`SweepConfig`](config::SweepConfig) — the delayed-cleanup debounce
//!   values applied when a connection closes.
//!
//! Both tables are in-process, mutex-guarded maps: single-process by
//! design, rebuilt from zero on restart. Transport concerns (who gets
//! which broadcast) live in the `api` crate; these types only own the
//! state and its atomic check-then-set rules.

pub mod config;
pub mod lock;
pub mod presence;

pub use config::SweepConfig;
pub use lock::{AcquireOutcome, LockTable};
pub use presence::PresenceTable;
