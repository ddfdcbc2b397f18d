//! # Core subscriber trait
//!
//! `Subscribe` is the extension point for observing supervisors. Each subscriber
//! is driven by a dedicated worker loop fed by a bounded queue owned by the
//! [`SubscriberSet`](crate::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow (I/O, batching); they do **not** block the
//!   publisher (a supervisor in the middle of `stop()`) nor other subscribers.
//! - Each subscriber **declares** its preferred queue capacity via
//!   [`Subscribe::queue_capacity`]. On overflow, events for that subscriber are
//!   dropped and `SubscriberOverflow` is published.
//!
//! ## Example
//! ```rust
//! use forkvisor::{Event, EventKind, Subscribe};
//!
//! struct Kills;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for Kills {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::KillSent {
//!             eprintln!("server {:?} had to be killed", ev.server);
//!         }
//!     }
//!     fn name(&self) -> &'static str { "kills" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
///
/// Called from a subscriber-dedicated worker task. Implementations should avoid
/// blocking the async runtime.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handle a single event for this subscriber.
    async fn on_event(&self, event: &Event);

    /// Human-readable name (for logs/metrics).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
