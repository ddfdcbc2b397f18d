//! Process-wide signal dispositions under `SignalManager`.
//!
//! Dispositions are shared by every thread of the test binary, so this file
//! holds a single test and runs in its own process.

use forkvisor::Signal;
use forkvisor::signals::{Disposition, SignalManager};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, sigaction};

/// Current handler of `signal`, read without changing it.
fn handler_of(signal: Signal) -> libc::sighandler_t {
    unsafe {
        let mut current: libc::sigaction = std::mem::zeroed();
        assert_eq!(
            libc::sigaction(signal as libc::c_int, std::ptr::null(), &mut current),
            0
        );
        current.sa_sigaction
    }
}

fn is_custom(handler: libc::sighandler_t) -> bool {
    handler != libc::SIG_DFL && handler != libc::SIG_IGN
}

#[test]
fn install_overrides_and_restore_puts_everything_back() {
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    unsafe { sigaction(Signal::SIGUSR2, &ignore) }.unwrap();
    let hup_before = handler_of(Signal::SIGHUP);
    let usr1_before = handler_of(Signal::SIGUSR1);

    let plan = [
        (Signal::SIGUSR1, Disposition::Deferred),
        (Signal::SIGTERM, Disposition::Quit),
    ];
    let mut manager = SignalManager::install(plan).unwrap();
    assert!(manager.captured() > 0);

    // Absent from the plan: reset to the OS default.
    assert_eq!(handler_of(Signal::SIGUSR2), libc::SIG_DFL);
    assert_eq!(handler_of(Signal::SIGHUP), libc::SIG_IGN);
    assert!(is_custom(handler_of(Signal::SIGUSR1)));
    assert!(is_custom(handler_of(Signal::SIGTERM)));

    manager.restore().unwrap();
    assert_eq!(manager.captured(), 0);
    assert_eq!(handler_of(Signal::SIGUSR2), libc::SIG_IGN);
    assert_eq!(handler_of(Signal::SIGHUP), hup_before);
    assert_eq!(handler_of(Signal::SIGUSR1), usr1_before);
    assert!(!is_custom(handler_of(Signal::SIGTERM)));

    // Second restore has nothing left to do.
    manager.restore().unwrap();
    assert_eq!(handler_of(Signal::SIGUSR2), libc::SIG_IGN);

    // Dropping the guard restores as well.
    let manager = SignalManager::install([(Signal::SIGUSR1, Disposition::Ignore)]).unwrap();
    assert_eq!(handler_of(Signal::SIGUSR1), libc::SIG_IGN);
    assert_eq!(handler_of(Signal::SIGUSR2), libc::SIG_DFL);
    drop(manager);
    assert_eq!(handler_of(Signal::SIGUSR1), usr1_before);
    assert_eq!(handler_of(Signal::SIGUSR2), libc::SIG_IGN);
}
