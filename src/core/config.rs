//! # Supervisor configuration.
//!
//! Provides [`SupervisorConfig`], the settings passed to
//! [`Supervisor::new`](crate::Supervisor::new). Nothing is read from globals.
//!
//! ## Sentinel values
//! - `max_idle_time = 0s` → never idle (the collection never cleans the server)
//! - `exit_timeout = 0s` → skip waiting after closing the channel, signal right away
//! - `term_timeout = 0s` → skip waiting after the termination signal, kill right away

use std::os::fd::RawFd;
use std::time::Duration;

use nix::sys::signal::Signal;

use crate::channel::DEFAULT_MAX_MESSAGE_LEN;

/// Configuration for one supervised server.
///
/// ## Field semantics
/// - `exit_timeout`: wait after closing the channel before escalating
/// - `term_timeout`: wait after the termination signal before `SIGKILL`
/// - `kill_timeout`: bound on reaping after `SIGKILL`
/// - `reap_interval`: poll period of the non-blocking reaper
/// - `termination_signal`: graceful stop signal (`SIGTERM`)
/// - `max_idle_time`: idle limit used by the server collection (`0s` = never)
/// - `keep_fds`: extra descriptors that survive the child's descriptor sweep
/// - `close_inherited_fds`: run the descriptor sweep at all
/// - `manage_signals`: install the child's signal table
/// - `max_message_len`: largest frame body accepted by either side
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over checking sentinels inline.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Time the child gets to exit on its own after the channel is closed.
    pub exit_timeout: Duration,

    /// Time the child gets to exit after `termination_signal`.
    pub term_timeout: Duration,

    /// Bound on reaping the child after `SIGKILL`.
    ///
    /// The parent never blocks indefinitely: if the child is still not reaped
    /// after this long (stuck in uninterruptible sleep), `stop` returns anyway.
    pub kill_timeout: Duration,

    /// Poll period while waiting for the child to exit.
    pub reap_interval: Duration,

    /// Signal sent in the second stop tier; also bound to "quit" in the child.
    pub termination_signal: Signal,

    /// Maximum time the server may stay unused before the collection stops it.
    ///
    /// - `Duration::ZERO` = never idle
    pub max_idle_time: Duration,

    /// Descriptors kept open in the child in addition to the channel and 0/1/2.
    pub keep_fds: Vec<RawFd>,

    /// Close every inherited descriptor not in the keep list.
    pub close_inherited_fds: bool,

    /// Install the child's signal table (quit on `termination_signal`/`SIGINT`, ignore `SIGHUP`).
    ///
    /// Turning this off is only useful when running the loop in-process.
    pub manage_signals: bool,

    /// Largest frame body (bytes) accepted on the channel.
    pub max_message_len: usize,
}

impl SupervisorConfig {
    /// Returns the idle limit as an `Option`.
    ///
    /// - `None` → never idle
    /// - `Some(d)` → idle once `d` passed since the last activity
    #[inline]
    pub fn idle_limit(&self) -> Option<Duration> {
        if self.max_idle_time == Duration::ZERO {
            None
        } else {
            Some(self.max_idle_time)
        }
    }

    /// Poll period clamped to at least 1ms.
    #[inline]
    pub fn reap_interval_clamped(&self) -> Duration {
        self.reap_interval.max(Duration::from_millis(1))
    }

    /// Upper bound for a full `stop()` (all tiers, plus one poll period each).
    pub fn worst_case_stop(&self) -> Duration {
        self.exit_timeout + self.term_timeout + self.kill_timeout + 3 * self.reap_interval_clamped()
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `exit_timeout = 3s`, `term_timeout = 3s`, `kill_timeout = 1s`
    /// - `reap_interval = 10ms`
    /// - `termination_signal = SIGTERM`
    /// - `max_idle_time = 0s` (never idle)
    /// - `keep_fds = []`, `close_inherited_fds = true`, `manage_signals = true`
    /// - `max_message_len = 16 MiB`
    fn default() -> Self {
        Self {
            exit_timeout: Duration::from_secs(3),
            term_timeout: Duration::from_secs(3),
            kill_timeout: Duration::from_secs(1),
            reap_interval: Duration::from_millis(10),
            termination_signal: Signal::SIGTERM,
            max_idle_time: Duration::ZERO,
            keep_fds: Vec::new(),
            close_inherited_fds: true,
            manage_signals: true,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_idle_time_means_never() {
        let mut cfg = SupervisorConfig::default();
        assert_eq!(cfg.idle_limit(), None);
        cfg.max_idle_time = Duration::from_secs(30);
        assert_eq!(cfg.idle_limit(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn worst_case_stop_covers_every_tier() {
        let cfg = SupervisorConfig {
            exit_timeout: Duration::from_millis(100),
            term_timeout: Duration::from_millis(200),
            kill_timeout: Duration::from_millis(300),
            reap_interval: Duration::ZERO,
            ..SupervisorConfig::default()
        };
        assert_eq!(cfg.reap_interval_clamped(), Duration::from_millis(1));
        assert_eq!(cfg.worst_case_stop(), Duration::from_millis(603));
    }
}
