//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]. Supervisors and
//! the server collection publish on it; a listener task forwards to a
//! [`SubscriberSet`](crate::SubscriberSet).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                      Listener (one per SubscriberSet):
//!   Supervisor "a" ──┐
//!   Supervisor "b" ──┼──────► Bus ───────► SubscriberSet::listen ────► subscribers
//!   Collection     ──┘  (broadcast chan)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at send time.
//! - **Never inherited**: the forked child does not publish; events are parent-side only.

use tokio::sync::broadcast;

use super::event::Event;

/// Default ring buffer size.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Broadcast channel for runtime events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender). Publishing with no
/// receivers drops the event.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (min 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_only_see_later_events() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::ServerStarting));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::ServerStarted));
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::ServerStarted);
    }
}
