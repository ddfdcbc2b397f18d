//! # Bounded, escalating stop of a child process.
//!
//! ```text
//! channel closed ──► wait exit_timeout ──► exited? ─► Closed
//!                                             │ no
//!                    termination_signal ──► wait term_timeout ──► exited? ─► Terminated
//!                                                                    │ no
//!                                   SIGKILL ──► reap within kill_timeout ─► Killed
//! ```
//!
//! ## Rules
//! - Every wait is bounded (`tokio::time::timeout` around a non-blocking reap poll).
//! - `ESRCH` / `ECHILD` mean "already gone" and are never errors.
//! - The child is reaped by whichever tier observes its exit; no zombie is left
//!   unless it survives `SIGKILL` past `kill_timeout`, which [`Escalation::reaped`]
//!   reports so the caller can reap it later.

use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tokio::time;

use super::config::SupervisorConfig;
use crate::events::{Bus, Event, EventKind};

/// The stop tier that ended the child.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StopTier {
    /// The child exited after its channel was closed.
    Closed,
    /// The child exited after the termination signal.
    Terminated,
    /// The child had to be killed.
    Killed,
}

impl StopTier {
    pub fn as_label(&self) -> &'static str {
        match self {
            StopTier::Closed => "closed",
            StopTier::Terminated => "terminated",
            StopTier::Killed => "killed",
        }
    }
}

/// Reaps `pid` without blocking. Returns `true` if the process is gone.
pub(crate) fn try_reap(pid: Pid) -> bool {
    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => true,
        Ok(_) => false,
        Err(Errno::ECHILD) | Err(Errno::ESRCH) => true,
        Err(_) => false,
    }
}

/// Sends `signal` to `pid`. Returns `false` if the process no longer exists.
pub(crate) fn send_signal(pid: Pid, signal: Signal) -> bool {
    !matches!(kill(pid, signal), Err(Errno::ESRCH))
}

/// Polls until `pid` is reaped or `timeout` passes. Returns `true` if reaped.
pub(crate) async fn wait_for_exit(pid: Pid, timeout: Duration, poll: Duration) -> bool {
    if try_reap(pid) {
        return true;
    }
    if timeout.is_zero() {
        return false;
    }
    let reaped = async {
        loop {
            time::sleep(poll).await;
            if try_reap(pid) {
                break;
            }
        }
    };
    time::timeout(timeout, reaped).await.is_ok() || try_reap(pid)
}

/// Result of [`escalate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Escalation {
    pub(crate) tier: StopTier,
    /// False only if the child survived `SIGKILL` past `kill_timeout`.
    pub(crate) reaped: bool,
}

impl Escalation {
    fn reaped(tier: StopTier) -> Self {
        Self { tier, reaped: true }
    }
}

/// Runs the escalation after the channel was closed.
///
/// Publishes `TerminationSent` / `KillSent` on `bus` for the tiers actually reached.
pub(crate) async fn escalate(
    pid: Pid,
    cfg: &SupervisorConfig,
    bus: Option<&Bus>,
    name: &str,
) -> Escalation {
    let poll = cfg.reap_interval_clamped();
    let publish = |ev: Event| {
        if let Some(bus) = bus {
            bus.publish(ev.with_server(name).with_pid(pid.as_raw()));
        }
    };

    if wait_for_exit(pid, cfg.exit_timeout, poll).await {
        return Escalation::reaped(StopTier::Closed);
    }

    if !send_signal(pid, cfg.termination_signal) {
        try_reap(pid);
        return Escalation::reaped(StopTier::Closed);
    }
    publish(
        Event::new(EventKind::TerminationSent)
            .with_timeout(cfg.term_timeout)
            .with_reason(cfg.termination_signal.as_str()),
    );
    if wait_for_exit(pid, cfg.term_timeout, poll).await {
        return Escalation::reaped(StopTier::Terminated);
    }

    if !send_signal(pid, Signal::SIGKILL) {
        try_reap(pid);
        return Escalation::reaped(StopTier::Terminated);
    }
    publish(Event::new(EventKind::KillSent).with_timeout(cfg.kill_timeout));
    let reaped = wait_for_exit(pid, cfg.kill_timeout, poll).await;
    if !reaped {
        publish(
            Event::new(EventKind::KillSent)
                .with_timeout(cfg.kill_timeout)
                .with_reason("not reaped within kill_timeout"),
        );
    }
    Escalation {
        tier: StopTier::Killed,
        reaped,
    }
}

/// Kills and reaps `pid` from synchronous code, giving up after `bound`.
pub(crate) fn kill_and_reap_blocking(pid: Pid, bound: Duration, poll: Duration) -> bool {
    if try_reap(pid) {
        return true;
    }
    if !send_signal(pid, Signal::SIGKILL) {
        try_reap(pid);
        return true;
    }
    let deadline = Instant::now() + bound;
    loop {
        if try_reap(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(poll);
    }
}
