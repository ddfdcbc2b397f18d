//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor` (start/stop tiers/exit), `ServerCollection`
//!   (add/remove/idle/shutdown), `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `SubscriberSet::listen` fans out to user subscribers.

mod bus;
mod event;

pub use bus::{Bus, DEFAULT_BUS_CAPACITY};
pub use event::{Event, EventKind};
