#![allow(unsafe_code)]
//! # Child-side bootstrap.
//!
//! [`run_child`] is the explicit entry point of the forked child. It never returns.
//!
//! ```text
//! run_child
//!   ├─► sweep descriptors (keep: channel, 0/1/2, keep_fds, hook-added)
//!   ├─► server.after_fork()
//!   ├─► catch_unwind(run_server)
//!   │     ├─► install SignalManager (quit / ignore / deferred, SIGHUP ignored)
//!   │     ├─► initialize ─► main_loop ─► finalize
//!   │     └─► restore signals (guard drop)
//!   ├─► report fatal error on stderr
//!   └─► _exit(0 | 1)
//! ```
//!
//! ## Rules
//! - The child never unwinds into the parent's code and never runs the parent's
//!   atexit handlers or destructors: it always leaves via `_exit`.
//! - `finalize` runs even when `initialize` or the loop failed.
//! - `run_server` is also used by `Supervisor::run_in_process` (no fork, no sweep).

use std::io::Write;
use std::os::fd::RawFd;
use std::os::unix::net::UnixStream;
use std::panic::{self, AssertUnwindSafe};

use super::config::SupervisorConfig;
use super::dispatcher::{LoopExit, main_loop};
use super::server::{Context, Handlers, KeepList, Server};
use crate::channel::Channel;
use crate::error::DispatchError;
use crate::signals::{self, SignalManager, SignalTable};

/// Highest descriptor probed when `/proc/self/fd` is not available.
const FALLBACK_MAX_FD: RawFd = 65_536;

/// Child entry point after `fork`.
pub(crate) fn run_child<S: Server>(
    server: &mut S,
    handlers: &Handlers<S>,
    cfg: &SupervisorConfig,
    socket: UnixStream,
    mut keep: KeepList,
) -> ! {
    if cfg.close_inherited_fds {
        keep.keep(&socket);
        for fd in cfg.keep_fds.iter().copied() {
            keep.keep_raw(fd);
        }
        for fd in 0..=2 {
            if fd_is_open(fd) {
                keep.keep_raw(fd);
            }
        }
        close_inherited(&keep);
    }

    server.after_fork();

    let name = server.name().to_string();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run_server(server, handlers, cfg, socket)
    }));

    let code = match outcome {
        Ok(Ok(_)) => 0,
        Ok(Err(e)) => {
            report(&name, &format!("failed: {e} ({})", e.as_label()));
            1
        }
        Err(panic_err) => {
            let info = if let Some(msg) = panic_err.downcast_ref::<&'static str>() {
                (*msg).to_string()
            } else if let Some(msg) = panic_err.downcast_ref::<String>() {
                msg.clone()
            } else {
                "unknown panic".to_string()
            };
            report(&name, &format!("panicked: {info}"));
            1
        }
    };

    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
    // SAFETY: `_exit` terminates the process immediately; nothing runs afterwards.
    unsafe { libc::_exit(code) }
}

/// Runs the server in the current process: signals, hooks, main loop.
///
/// Signal dispositions (if managed) are restored before returning, also when
/// the loop failed.
pub(crate) fn run_server<S: Server>(
    server: &mut S,
    handlers: &Handlers<S>,
    cfg: &SupervisorConfig,
    socket: UnixStream,
) -> Result<LoopExit, DispatchError> {
    let channel = Channel::new(socket)
        .with_max_message_len(cfg.max_message_len)
        .interruptible(true);
    let mut ctx = Context::new(channel, cfg.manage_signals);

    let mut table = SignalTable::with_termination(cfg.termination_signal);
    server.signal_handlers(&mut table);

    let mut guard = if cfg.manage_signals {
        let guard = SignalManager::install(table.dispositions())?;
        signals::set_wakeup_fd(Some(ctx.raw_socket()));
        Some(guard)
    } else {
        None
    };

    let result = server
        .initialize(&mut ctx)
        .and_then(|()| main_loop(server, handlers, &table, &mut ctx));
    server.finalize(&mut ctx);

    let restored = match guard.as_mut() {
        Some(guard) => guard.restore(),
        None => Ok(()),
    };
    settle(result, restored)
}

/// The loop's own error wins over a failed signal restore.
fn settle(
    result: Result<LoopExit, DispatchError>,
    restored: Result<(), nix::errno::Errno>,
) -> Result<LoopExit, DispatchError> {
    let exit = result?;
    restored?;
    Ok(exit)
}

fn fd_is_open(fd: RawFd) -> bool {
    // SAFETY: F_GETFD only queries descriptor flags.
    unsafe { libc::fcntl(fd, libc::F_GETFD) != -1 }
}

/// Closes every open descriptor not in `keep`.
fn close_inherited(keep: &KeepList) {
    let open = list_open_fds().unwrap_or_else(|| (0..FALLBACK_MAX_FD).collect());
    for fd in open {
        if !keep.contains(fd) {
            // SAFETY: the parent's handles to these descriptors are never used in
            // the child; `after_fork` lets the server forget its own copies.
            unsafe {
                libc::close(fd);
            }
        }
    }
}

/// Lists open descriptors, collected before any is closed.
fn list_open_fds() -> Option<Vec<RawFd>> {
    let dir = std::fs::read_dir("/proc/self/fd")
        .or_else(|_| std::fs::read_dir("/dev/fd"))
        .ok()?;
    let fds = dir
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse::<RawFd>().ok())
        .collect();
    Some(fds)
}

fn report(name: &str, what: &str) {
    let mut err = std::io::stderr().lock();
    let _ = writeln!(err, "[forkvisor] server '{name}' {what}");
}
