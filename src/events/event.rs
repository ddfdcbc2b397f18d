//! # Runtime events emitted by supervisors and the server collection.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Server lifecycle**: start, stop tiers, unexpected exit
//! - **Collection**: servers added, removed, cleaned for idleness
//! - **Shutdown**: OS signal observed by `ServerCollection::run_until_signal`
//! - **Subscriber**: overflow and panics inside subscriber workers
//!
//! The [`Event`] struct carries metadata such as timestamps, server name, pid,
//! stop tier and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use forkvisor::{Event, EventKind, StopTier};
//!
//! let ev = Event::new(EventKind::ServerStopped)
//!     .with_server("echo")
//!     .with_pid(4242)
//!     .with_tier(StopTier::Terminated)
//!     .with_timeout(Duration::from_secs(3));
//!
//! assert_eq!(ev.kind, EventKind::ServerStopped);
//! assert_eq!(ev.server.as_deref(), Some("echo"));
//! assert_eq!(ev.tier, Some(StopTier::Terminated));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::core::StopTier;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `server`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `server`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Shutdown events ===
    /// Shutdown requested (OS signal observed by the collection).
    ShutdownRequested,

    // === Server lifecycle events ===
    /// `start()` is about to fork.
    ///
    /// Sets:
    /// - `server`: server name
    ServerStarting,

    /// The child process is running and the channel is open.
    ///
    /// Sets:
    /// - `server`: server name
    /// - `pid`: child pid
    ServerStarted,

    /// `stop()` closed the channel and started the escalation.
    ///
    /// Sets:
    /// - `server`, `pid`
    /// - `timeout_ms`: `exit_timeout`
    StopRequested,

    /// The termination signal was sent (second tier).
    ///
    /// Sets:
    /// - `server`, `pid`
    /// - `timeout_ms`: `term_timeout`
    /// - `reason`: signal name
    TerminationSent,

    /// `SIGKILL` was sent (third tier).
    ///
    /// Sets:
    /// - `server`, `pid`
    /// - `timeout_ms`: `kill_timeout`
    /// - `reason`: set only if the child was not reaped in time
    KillSent,

    /// The child is gone and `stop()` returned.
    ///
    /// Sets:
    /// - `server`, `pid`
    /// - `tier`: stop tier that ended the child
    ServerStopped,

    /// The child went away while the parent was talking to it.
    ///
    /// Sets:
    /// - `server`, `pid`
    /// - `reason`: what the parent observed
    ServerExited,

    // === Collection events ===
    /// A supervisor was stored in the collection.
    ///
    /// Sets:
    /// - `server`: collection key
    ServerAdded,

    /// A supervisor was stopped and removed from the collection.
    ///
    /// Sets:
    /// - `server`: collection key
    ServerRemoved,

    /// A supervisor was stopped by the idle cleaner.
    ///
    /// Sets:
    /// - `server`: collection key
    /// - `timeout_ms`: the server's max idle time
    IdleCleaned,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Server name or collection key (subscriber name for subscriber events).
    pub server: Option<Arc<str>>,
    /// Child process id.
    pub pid: Option<i32>,
    /// Stop tier that ended the child.
    pub tier: Option<StopTier>,
    /// Timeout relevant to this event in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            server: None,
            pid: None,
            tier: None,
            timeout_ms: None,
            reason: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a server name.
    #[inline]
    pub fn with_server(mut self, server: impl Into<Arc<str>>) -> Self {
        self.server = Some(server.into());
        self
    }

    #[inline]
    pub fn with_pid(mut self, pid: i32) -> Self {
        self.pid = Some(pid);
        self
    }

    #[inline]
    pub fn with_tier(mut self, tier: StopTier) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_server(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_server(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::ServerStarting);
        let b = Event::new(EventKind::ServerStarted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn timeouts_saturate_at_u32() {
        let ev = Event::new(EventKind::StopRequested).with_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(ev.timeout_ms, Some(u32::MAX));
    }

    #[test]
    fn subscriber_helpers_classify() {
        assert!(Event::subscriber_overflow("log", "full").is_subscriber_overflow());
        let ev = Event::subscriber_panicked("log", "boom".into());
        assert!(ev.is_subscriber_panic());
        assert_eq!(ev.server.as_deref(), Some("log"));
    }
}
