//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the built-in [`LogWriter`] (feature `logging`).
//!
//! ## Architecture
//! ```text
//! Supervisor ── publish(Event) ──► Bus ──► SubscriberSet::listen
//!                                              │
//!                                         ┌────┴────┬─────────┐
//!                                         ▼         ▼         ▼
//!                                     LogWriter  Metrics   Custom ...
//! ```

#[cfg(feature = "logging")]
mod embedded;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
