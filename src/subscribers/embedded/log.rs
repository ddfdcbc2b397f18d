//! # LogWriter: simple event printer
//!
//! A minimal subscriber that prints incoming [`Event`]s to stdout.
//! Use it for tests or demos.
//!
//! ## Example output
//! ```text
//! [starting] server="echo"
//! [started] server="echo" pid=4242
//! [stop-requested] server="echo" pid=4242 exit_timeout_ms=3000
//! [termination-sent] server="echo" pid=4242 signal=SIGTERM term_timeout_ms=3000
//! [stopped] server="echo" pid=4242 tier=terminated
//! [idle-cleaned] server="echo" max_idle_ms=60000
//! [shutdown-requested]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn or_unknown(s: &Option<std::sync::Arc<str>>) -> &str {
    s.as_deref().unwrap_or("unknown")
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let server = or_unknown(&e.server);
        match e.kind {
            EventKind::ShutdownRequested => {
                println!("[shutdown-requested]");
            }
            EventKind::ServerStarting => {
                println!("[starting] server={server:?}");
            }
            EventKind::ServerStarted => {
                println!("[started] server={server:?} pid={:?}", e.pid);
            }
            EventKind::StopRequested => {
                println!(
                    "[stop-requested] server={server:?} pid={:?} exit_timeout_ms={:?}",
                    e.pid, e.timeout_ms
                );
            }
            EventKind::TerminationSent => {
                println!(
                    "[termination-sent] server={server:?} pid={:?} signal={} term_timeout_ms={:?}",
                    e.pid,
                    or_unknown(&e.reason),
                    e.timeout_ms
                );
            }
            EventKind::KillSent => match &e.reason {
                Some(reason) => println!("[kill-sent] server={server:?} pid={:?} {reason}", e.pid),
                None => println!("[kill-sent] server={server:?} pid={:?}", e.pid),
            },
            EventKind::ServerStopped => {
                println!(
                    "[stopped] server={server:?} pid={:?} tier={}",
                    e.pid,
                    e.tier.map_or("unknown", |t| t.as_label())
                );
            }
            EventKind::ServerExited => {
                println!(
                    "[exited] server={server:?} pid={:?} reason={}",
                    e.pid,
                    or_unknown(&e.reason)
                );
            }
            EventKind::ServerAdded => {
                println!("[added] server={server:?}");
            }
            EventKind::ServerRemoved => {
                println!("[removed] server={server:?}");
            }
            EventKind::IdleCleaned => {
                println!("[idle-cleaned] server={server:?} max_idle_ms={:?}", e.timeout_ms);
            }
            EventKind::SubscriberOverflow => {
                println!(
                    "[subscriber-overflow] subscriber={server} reason={}",
                    or_unknown(&e.reason)
                );
            }
            EventKind::SubscriberPanicked => {
                println!(
                    "[subscriber-panicked] subscriber={server} info={}",
                    or_unknown(&e.reason)
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
