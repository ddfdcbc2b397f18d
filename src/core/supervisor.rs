#![allow(unsafe_code)]
//! # Supervisor: one server process, its control channel and its lifecycle.
//!
//! The [`Supervisor`] forks the server into a child process, keeps the parent end
//! of a private socket pair as the control channel, and stops the child with a
//! bounded, escalating protocol.
//!
//! ## States
//! ```text
//!  NotStarted ──start()──► Started ──stop()──► Stopped (terminal)
//!      │                      │
//!      └─ stop() → NotStarted └─ start() → AlreadyStarted
//! ```
//!
//! ## start()
//! ```text
//! socket pair ─► before_fork(&mut KeepList) ─► flush stdio ─► fork
//!   child : drop parent end ─► bootstrap::run_child (never returns)
//!   parent: drop child end  ─► Channel(parent end) ─► Started ─► ServerStarted
//! ```
//!
//! ## stop()
//! ```text
//! drop channel (child reads EOF) ─► StopRequested
//!   └─► escalation::escalate(exit_timeout, term_timeout, kill_timeout)
//!         └─► Stopped ─► ServerStopped{tier}
//! ```
//!
//! ## Rules
//! - Configuration is per supervisor ([`SupervisorConfig`]); nothing is global.
//! - Events are published on the optional [`Bus`]; the child never publishes.
//! - Dropping a supervisor whose child was not reaped kills and reaps it (bounded).
//!
//! ## Example
//! ```rust,no_run
//! use forkvisor::{Handlers, Message, Server, Supervisor, SupervisorConfig};
//!
//! struct Echo;
//!
//! impl Server for Echo {
//!     fn name(&self) -> &str { "echo" }
//!     fn register(handlers: &mut Handlers<Self>) {
//!         handlers.on("echo", |_, ctx, args| ctx.reply(&Message::with_parts("echo", args)));
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut sup = Supervisor::new(Echo, SupervisorConfig::default());
//!     sup.start()?;
//!     let reply = sup.request(&Message::new("echo").with_arg("hi"))?;
//!     assert_eq!(reply.message.arg_str(0), Some("hi"));
//!     sup.stop().await?;
//!     Ok(())
//! }
//! ```

use std::io::{self, Write};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::unistd::{ForkResult, Pid, fork};

use super::bootstrap;
use super::config::SupervisorConfig;
use super::dispatcher::LoopExit;
use super::escalation::{self, StopTier};
use super::server::{Handlers, KeepList, Server};
use crate::channel::{Channel, Envelope, Message};
use crate::error::{ChannelError, DispatchError, ServerError};
use crate::events::{Bus, Event, EventKind};

/// Lifecycle state of a supervised server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    Started,
    Stopped,
}

/// Parent-side owner of one server process.
pub struct Supervisor<S: Server> {
    server: S,
    handlers: Handlers<S>,
    cfg: SupervisorConfig,
    name: Arc<str>,
    bus: Option<Bus>,

    state: ServerState,
    pid: Option<Pid>,
    reaped: bool,
    channel: Option<Channel<UnixStream>>,
    last_activity: Instant,
}

impl<S: Server> Supervisor<S> {
    /// Creates a supervisor and builds the server's handler table.
    pub fn new(server: S, cfg: SupervisorConfig) -> Self {
        let mut handlers = Handlers::new();
        S::register(&mut handlers);
        let name: Arc<str> = Arc::from(server.name());
        Self {
            server,
            handlers,
            cfg,
            name,
            bus: None,
            state: ServerState::NotStarted,
            pid: None,
            reaped: false,
            channel: None,
            last_activity: Instant::now(),
        }
    }

    /// Publishes lifecycle events on `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Forks the server process and opens the control channel.
    ///
    /// Fails with [`ServerError::AlreadyStarted`] unless the supervisor was never started.
    pub fn start(&mut self) -> Result<(), ServerError> {
        if self.state != ServerState::NotStarted {
            return Err(ServerError::AlreadyStarted);
        }
        self.publish(Event::new(EventKind::ServerStarting));

        let (parent_end, child_end) =
            UnixStream::pair().map_err(|source| ServerError::Spawn { source })?;
        let mut keep = KeepList::new();
        self.server.before_fork(&mut keep)?;

        // Buffered output must not be written twice (once by each process).
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();

        // SAFETY: the child only runs `bootstrap::run_child`, which never returns
        // into the caller's code and leaves via `_exit`.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                drop(parent_end);
                bootstrap::run_child(&mut self.server, &self.handlers, &self.cfg, child_end, keep)
            }
            Ok(ForkResult::Parent { child }) => {
                drop(child_end);
                self.pid = Some(child);
                self.channel =
                    Some(Channel::new(parent_end).with_max_message_len(self.cfg.max_message_len));
                self.state = ServerState::Started;
                self.touch();
                self.publish(Event::new(EventKind::ServerStarted));
                Ok(())
            }
            Err(errno) => Err(ServerError::Spawn {
                source: io::Error::from(errno),
            }),
        }
    }

    /// Closes the channel and escalates until the child is gone.
    ///
    /// Returns the tier that ended the child. Always leaves the supervisor `Stopped`.
    pub async fn stop(&mut self) -> Result<StopTier, ServerError> {
        if self.state != ServerState::Started {
            return Err(ServerError::NotStarted);
        }
        let pid = self.pid.ok_or(ServerError::NotStarted)?;

        self.state = ServerState::Stopped;
        self.channel = None;
        self.publish(Event::new(EventKind::StopRequested).with_timeout(self.cfg.exit_timeout));

        let tier = if self.reaped {
            StopTier::Closed
        } else {
            let outcome =
                escalation::escalate(pid, &self.cfg, self.bus.as_ref(), &self.name).await;
            // An unreaped child is left to `Drop` for one more bounded kill-and-reap.
            self.reaped = outcome.reaped;
            outcome.tier
        };
        self.publish(Event::new(EventKind::ServerStopped).with_tier(tier));
        Ok(tier)
    }

    /// True iff the parent end of the channel is open.
    pub fn is_started(&self) -> bool {
        self.channel.is_some()
    }

    /// Lifecycle state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Process id of the child, once started.
    pub fn server_pid(&self) -> Option<Pid> {
        self.pid
    }

    /// Non-blocking liveness check. Reaps the child if it already exited.
    pub fn is_running(&mut self) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };
        if self.reaped {
            return false;
        }
        if escalation::try_reap(pid) {
            self.reaped = true;
            if self.state == ServerState::Started {
                self.publish(Event::new(EventKind::ServerExited).with_reason("reaped"));
            }
            return false;
        }
        true
    }

    /// The parent end of the control channel.
    pub fn channel(&mut self) -> Result<&mut Channel<UnixStream>, ServerError> {
        self.channel.as_mut().ok_or(ServerError::NotStarted)
    }

    /// Sends `message` and waits for one reply.
    ///
    /// A closed channel (either direction) becomes [`ServerError::ServerExited`].
    pub fn request(&mut self, message: &Message) -> Result<Envelope, ServerError> {
        self.touch();
        let pid = self.pid.map_or(0, Pid::as_raw);
        let channel = self.channel.as_mut().ok_or(ServerError::NotStarted)?;

        let reply = match channel.send(message) {
            Ok(()) => channel.receive(),
            Err(e) => Err(e),
        };
        match reply {
            Ok(Some(envelope)) => Ok(envelope),
            Ok(None) | Err(ChannelError::Closed) => {
                self.publish(
                    Event::new(EventKind::ServerExited)
                        .with_reason(format!("no reply to '{}'", message.name())),
                );
                Err(ServerError::ServerExited { pid })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Marks the server as used now.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Configured idle limit (`Duration::ZERO` = never idle).
    pub fn max_idle_time(&self) -> Duration {
        self.cfg.max_idle_time
    }

    /// When the server becomes idle, or `None` if it never does.
    pub fn idle_deadline(&self) -> Option<Instant> {
        self.cfg.idle_limit().map(|d| self.last_activity + d)
    }

    /// Name reported in events.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    /// The parent's copy of the server (the child has its own since the fork).
    pub fn server(&self) -> &S {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut S {
        &mut self.server
    }

    /// Runs the server loop in the current process over `socket`.
    ///
    /// Runs every child-side hook except the descriptor sweep; `before_fork` is
    /// not called. Blocks until the loop ends.
    pub fn run_in_process(&mut self, socket: UnixStream) -> Result<LoopExit, DispatchError> {
        self.server.after_fork();
        bootstrap::run_server(&mut self.server, &self.handlers, &self.cfg, socket)
    }

    fn publish(&self, ev: Event) {
        if let Some(bus) = &self.bus {
            let ev = ev.with_server(Arc::clone(&self.name));
            let ev = match self.pid {
                Some(pid) => ev.with_pid(pid.as_raw()),
                None => ev,
            };
            bus.publish(ev);
        }
    }
}

impl<S: Server> Drop for Supervisor<S> {
    fn drop(&mut self) {
        self.channel = None;
        if let (Some(pid), false) = (self.pid, self.reaped) {
            escalation::kill_and_reap_blocking(
                pid,
                self.cfg.kill_timeout,
                self.cfg.reap_interval_clamped(),
            );
        }
    }
}

impl<S: Server> std::fmt::Debug for Supervisor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;

    impl Server for Quiet {
        fn name(&self) -> &str {
            "quiet"
        }
        fn register(handlers: &mut Handlers<Self>) {
            handlers.on("echo", |_, ctx, args| {
                ctx.reply(&Message::with_parts("echo", args))
            });
        }
    }

    #[tokio::test]
    async fn misuse_before_start_is_reported() {
        let mut sup = Supervisor::new(Quiet, SupervisorConfig::default());
        assert!(!sup.is_started());
        assert!(!sup.is_running());
        assert!(matches!(sup.stop().await, Err(ServerError::NotStarted)));
        assert!(matches!(sup.channel(), Err(ServerError::NotStarted)));
        assert!(matches!(
            sup.request(&Message::new("echo")),
            Err(ServerError::NotStarted)
        ));
        assert_eq!(sup.state(), ServerState::NotStarted);
    }

    #[test]
    fn idle_deadline_follows_config() {
        let sup = Supervisor::new(Quiet, SupervisorConfig::default());
        assert_eq!(sup.idle_deadline(), None);

        let cfg = SupervisorConfig {
            max_idle_time: Duration::from_secs(5),
            ..SupervisorConfig::default()
        };
        let sup = Supervisor::new(Quiet, cfg);
        assert_eq!(
            sup.idle_deadline(),
            Some(sup.last_activity() + Duration::from_secs(5))
        );
    }

    #[test]
    fn run_in_process_serves_over_a_socket_pair() {
        let (a, b) = UnixStream::pair().unwrap();
        let cfg = SupervisorConfig {
            manage_signals: false,
            ..SupervisorConfig::default()
        };
        let mut sup = Supervisor::new(Quiet, cfg);
        let worker = std::thread::spawn(move || sup.run_in_process(b));

        let mut client = Channel::new(a);
        client.send(&Message::new("echo").with_arg("x")).unwrap();
        let reply = client.receive().unwrap().unwrap();
        assert_eq!(reply.message.arg_str(0), Some("x"));
        drop(client);

        assert_eq!(worker.join().unwrap().unwrap(), LoopExit::PeerClosed);
    }
}
