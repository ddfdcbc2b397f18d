#![allow(unsafe_code)]
//! # Process signal dispositions for the child's lifetime.
//!
//! [`SignalManager::install`] captures the current disposition of every trappable
//! signal, resets all of them to the OS default and binds the ones named in the
//! plan. The returned guard restores the captured dispositions exactly once
//! (explicitly via [`SignalManager::restore`] or on drop).
//!
//! ## Handlers
//! ```text
//!   Quit signal     ──► on_quit_signal     ──► QUIT_SIGNAL = signo
//!                                           └─► shutdown(wakeup_fd, SHUT_RD)  (unblocks the read)
//!   Deferred signal ──► on_deferred_signal ──► PENDING[signo] = true
//!                                              (callback runs later, in the main loop)
//! ```
//!
//! ## Rules
//! - Handlers only touch atomics and async-signal-safe syscalls.
//! - Handlers are installed without `SA_RESTART`: a blocked `recvmsg` returns `EINTR`.
//! - `SIGHUP` is always ignored while installed.
//! - `SIGKILL`, `SIGSTOP` and the synchronous fault signals are never touched.

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use nix::errno::Errno;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

/// Highest signal number tracked for deferred delivery.
const MAX_SIGNO: usize = 64;

static PENDING: [AtomicBool; MAX_SIGNO + 1] = [const { AtomicBool::new(false) }; MAX_SIGNO + 1];
static QUIT_SIGNAL: AtomicI32 = AtomicI32::new(0);
static WAKEUP_FD: AtomicI32 = AtomicI32::new(-1);

/// What a signal is bound to while the manager is installed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// OS default action.
    Default,
    /// Ignored.
    Ignore,
    /// Requests the main loop to stop.
    Quit,
    /// Marked pending; the main loop runs the registered callback.
    Deferred,
}

impl Disposition {
    fn handler(self) -> SigHandler {
        match self {
            Disposition::Default => SigHandler::SigDfl,
            Disposition::Ignore => SigHandler::SigIgn,
            Disposition::Quit => SigHandler::Handler(on_quit_signal),
            Disposition::Deferred => SigHandler::Handler(on_deferred_signal),
        }
    }
}

/// Guard holding the captured original dispositions.
#[derive(Debug)]
pub struct SignalManager {
    saved: Vec<(Signal, SigAction)>,
}

impl SignalManager {
    /// Captures and overrides every trappable signal.
    ///
    /// Signals absent from `plan` are reset to [`Disposition::Default`]. If the OS
    /// refuses a signal with `EINVAL` it is skipped; any other error restores what
    /// was already changed and is returned.
    pub fn install<I>(plan: I) -> Result<Self, Errno>
    where
        I: IntoIterator<Item = (Signal, Disposition)>,
    {
        let plan: HashMap<Signal, Disposition> = plan.into_iter().collect();
        reset_flags();

        let mut manager = SignalManager { saved: Vec::new() };
        for signal in Signal::iterator().filter(|s| is_trappable(*s)) {
            let disposition = if signal == Signal::SIGHUP {
                Disposition::Ignore
            } else {
                plan.get(&signal).copied().unwrap_or(Disposition::Default)
            };
            let action = SigAction::new(disposition.handler(), SaFlags::empty(), SigSet::empty());

            // SAFETY: the installed handlers only store to atomics and call `shutdown(2)`,
            // both async-signal-safe.
            match unsafe { sigaction(signal, &action) } {
                Ok(original) => manager.saved.push((signal, original)),
                Err(Errno::EINVAL) => continue,
                Err(e) => {
                    let _ = manager.restore();
                    return Err(e);
                }
            }
        }
        Ok(manager)
    }

    /// Number of signals whose original disposition is held.
    pub fn captured(&self) -> usize {
        self.saved.len()
    }

    /// Restores every captured disposition and clears the capture table.
    ///
    /// Calling it again is a no-op. Returns the first error encountered, after
    /// attempting every signal.
    pub fn restore(&mut self) -> Result<(), Errno> {
        let mut first_err = None;
        for (signal, original) in self.saved.drain(..).rev() {
            // SAFETY: `original` was returned by the kernel for this very signal.
            if let Err(e) = unsafe { sigaction(signal, &original) } {
                first_err.get_or_insert(e);
            }
        }
        set_wakeup_fd(None);
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for SignalManager {
    fn drop(&mut self) {
        if !self.saved.is_empty() {
            let _ = self.restore();
        }
    }
}

/// True for signals the manager may capture and override.
pub fn is_trappable(signal: Signal) -> bool {
    !matches!(
        signal,
        Signal::SIGKILL
            | Signal::SIGSTOP
            | Signal::SIGSEGV
            | Signal::SIGBUS
            | Signal::SIGILL
            | Signal::SIGFPE
    )
}

/// Sets (or clears) the descriptor whose read half is shut down on a quit request.
///
/// The child's main loop registers its channel socket here so a quit signal
/// arriving just before the blocking read still ends the read.
pub fn set_wakeup_fd(fd: Option<RawFd>) {
    WAKEUP_FD.store(fd.unwrap_or(-1), Ordering::SeqCst);
}

/// Records a quit request and wakes the blocked read.
///
/// Safe to call from a signal handler, a message handler or another thread.
pub fn request_quit(signal: Signal) {
    record_quit(signal as i32);
}

/// True if a quit was requested and not yet consumed by the main loop.
///
/// Long-running handlers poll this to end cooperatively.
pub fn quit_requested() -> bool {
    QUIT_SIGNAL.load(Ordering::SeqCst) != 0
}

/// Consumes the pending quit request, if any.
pub fn take_quit_request() -> Option<Signal> {
    match QUIT_SIGNAL.swap(0, Ordering::SeqCst) {
        0 => None,
        signo => Signal::try_from(signo).ok(),
    }
}

/// Consumes every pending deferred signal, lowest number first.
pub fn take_pending() -> Vec<Signal> {
    PENDING
        .iter()
        .enumerate()
        .filter(|(_, flag)| flag.swap(false, Ordering::SeqCst))
        .filter_map(|(signo, _)| Signal::try_from(signo as i32).ok())
        .collect()
}

fn reset_flags() {
    for flag in &PENDING {
        flag.store(false, Ordering::SeqCst);
    }
    QUIT_SIGNAL.store(0, Ordering::SeqCst);
}

fn record_quit(signo: libc::c_int) {
    QUIT_SIGNAL.store(signo, Ordering::SeqCst);
    let fd = WAKEUP_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        // SAFETY: shutdown(2) is async-signal-safe; a stale fd only yields EBADF/ENOTSOCK.
        unsafe {
            libc::shutdown(fd, libc::SHUT_RD);
        }
    }
}

extern "C" fn on_quit_signal(signo: libc::c_int) {
    record_quit(signo);
}

extern "C" fn on_deferred_signal(signo: libc::c_int) {
    if let Some(flag) = usize::try_from(signo).ok().and_then(|i| PENDING.get(i)) {
        flag.store(true, Ordering::SeqCst);
    }
}
