//! # forkvisor
//!
//! **Forkvisor** runs a backend server in a forked child process and talks to it
//! over a private, discrete-message channel.
//!
//! The parent owns the child's lifecycle: it starts the server, exchanges
//! binary-safe messages (optionally carrying an open file descriptor) and stops
//! it with a bounded, escalating protocol. The child runs a single-threaded
//! read-dispatch loop that routes each message to a handler registered by name.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!           parent process                                 child process (forked)
//! ┌───────────────────────────────────┐          ┌───────────────────────────────────────┐
//! │ Supervisor<S>                     │          │ bootstrap::run_child                  │
//! │  - SupervisorConfig               │  fork()  │  - descriptor sweep (KeepList)        │
//! │  - Channel (parent end) ◄─────────┼──────────┼─► Channel (child end)                 │
//! │  - pid, state, last_activity      │ socket-  │  - SignalManager (quit/ignore/defer)  │
//! │  - Bus (optional) ──► events      │   pair   │  - main loop ─► Handlers<S> ─► S      │
//! └──────────────┬────────────────────┘          └───────────────────────────────────────┘
//!                │
//! ┌──────────────▼────────────────────┐
//! │ ServerCollection<S>               │
//! │  - key → Arc<Mutex<Supervisor>>   │
//! │  - idle cleaner (CancellationTok.)│
//! └───────────────────────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! Supervisor::new(server, cfg) ─► Server::register(&mut Handlers)
//!
//! start():  socket pair ─► before_fork(&mut KeepList) ─► fork
//!             child : sweep fds ─► after_fork ─► signals ─► initialize
//!                     loop {
//!                       receive() ─► handler(&mut S, &mut Context, args)
//!                       ├─ EOF            ─► PeerClosed
//!                       ├─ ctx.quit()     ─► Quit
//!                       └─ quit signal    ─► Signalled(sig)
//!                     }
//!                     finalize ─► restore signals ─► _exit(0 | 1)
//!             parent: Channel ─► Started
//!
//! stop():   close channel ─► wait exit_timeout ─► termination signal ─► wait term_timeout
//!                         ─► SIGKILL ─► reap within kill_timeout ─► Stopped(StopTier)
//! ```
//!
//! ## Features
//! | Area              | Description                                                        | Key types / traits                       |
//! |-------------------|--------------------------------------------------------------------|------------------------------------------|
//! | **Servers**       | Define a backend: handlers by name, lifecycle hooks.               | [`Server`], [`Handlers`], [`Context`]    |
//! | **Supervision**   | Fork, control channel, escalating stop, liveness.                  | [`Supervisor`], [`StopTier`]             |
//! | **Channel**       | Discrete binary-safe messages, descriptor passing, scalar frames.  | [`Channel`], [`Message`], [`Envelope`]   |
//! | **Signals**       | Child-side capture/override/restore, deferred callbacks.           | [`SignalTable`], [`signals`]             |
//! | **Collections**   | Keyed supervisors with idle cleaning.                              | [`ServerCollection`]                     |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics).                     | [`Subscribe`], [`SubscriberSet`], [`Bus`]|
//! | **Errors**        | Typed errors for lifecycle, channel and dispatch.                  | [`ServerError`], [`ChannelError`], [`DispatchError`] |
//! | **Configuration** | Per-supervisor settings, no globals.                               | [`SupervisorConfig`]                     |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust,no_run
//! use forkvisor::{DispatchError, Handlers, Message, Server, Supervisor, SupervisorConfig};
//!
//! struct Calc;
//!
//! impl Server for Calc {
//!     fn name(&self) -> &str { "calc" }
//!
//!     fn register(handlers: &mut Handlers<Self>) {
//!         handlers.on("add", |_, ctx, args| {
//!             let mut sum = 0i64;
//!             for arg in args {
//!                 let n: i64 = std::str::from_utf8(arg)
//!                     .ok()
//!                     .and_then(|s| s.parse().ok())
//!                     .ok_or_else(|| DispatchError::fail("not a number"))?;
//!                 sum += n;
//!             }
//!             ctx.reply(&Message::new("sum").with_arg(sum.to_string()))
//!         });
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut sup = Supervisor::new(Calc, SupervisorConfig::default());
//!     sup.start()?;
//!
//!     let reply = sup.request(&Message::new("add").with_arg("2").with_arg("40"))?;
//!     assert_eq!(reply.message.arg_str(0), Some("42"));
//!
//!     let tier = sup.stop().await?;
//!     println!("stopped: {}", tier.as_label());
//!     Ok(())
//! }
//! ```
#![deny(unsafe_code)]

#[cfg(not(unix))]
compile_error!("forkvisor requires a unix platform (fork, socketpair, SCM_RIGHTS)");

mod channel;
mod core;
mod error;
mod events;
pub mod signals;
mod subscribers;

// ---- Public re-exports ----

pub use channel::{Channel, DEFAULT_MAX_MESSAGE_LEN, Envelope, Message, Transport};
pub use crate::core::{
    Context, Handler, Handlers, KeepList, LoopExit, Server, ServerCollection, ServerState,
    SharedSupervisor, StopTier, Supervisor, SupervisorConfig, wait_for_shutdown_signal,
};
pub use error::{ChannelError, DispatchError, ServerError};
pub use events::{Bus, DEFAULT_BUS_CAPACITY, Event, EventKind};
pub use signals::{SignalAction, SignalTable};
pub use subscribers::{Subscribe, SubscriberSet};

// Re-exported so servers can name signals without depending on nix directly.
pub use nix::sys::signal::Signal;

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
