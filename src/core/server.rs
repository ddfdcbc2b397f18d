//! # Server definition: the trait, its handler table and the child-side context.
//!
//! A [`Server`] is the user's backend. It is constructed in the parent, moved
//! into the child by `fork`, and driven there by the main loop.
//!
//! ## Hooks (in call order)
//! ```text
//! parent:  Server::register(&mut Handlers)          (once, at Supervisor::new)
//!          before_fork(&mut KeepList)               (every start, may add keep fds)
//!                    │ fork
//! child:   after_fork()                             (forget handles to swept fds)
//!          signal_handlers(&mut SignalTable)        (override quit/ignore/callbacks)
//!          initialize(&mut Context)
//!          main loop ... handler(&mut self, &mut Context, args)
//!          finalize(&mut Context)                   (always, even after a loop error)
//! ```
//!
//! ## Example
//! ```rust
//! use forkvisor::{Context, DispatchError, Handlers, Message, Server};
//!
//! struct Greeter {
//!     greeted: u32,
//! }
//!
//! impl Server for Greeter {
//!     fn name(&self) -> &str {
//!         "greeter"
//!     }
//!
//!     fn register(handlers: &mut Handlers<Self>) {
//!         handlers.on("hello", |srv, ctx, args| {
//!             srv.greeted += 1;
//!             let who = args.first().map(|a| String::from_utf8_lossy(a).into_owned());
//!             ctx.reply(&Message::new("hello").with_arg(format!("hi {}", who.unwrap_or_default())))
//!         });
//!     }
//! }
//!
//! let mut handlers = Handlers::new();
//! Greeter::register(&mut handlers);
//! assert!(handlers.contains("hello"));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::SystemTime;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::channel::{Channel, Message};
use crate::error::{DispatchError, ServerError};
use crate::signals::SignalTable;

/// Message handler: receives the server, the loop context and the message arguments.
pub type Handler<S> =
    Box<dyn Fn(&mut S, &mut Context, &[Vec<u8>]) -> Result<(), DispatchError> + Send + Sync>;

/// A backend server run in a child process.
pub trait Server: Send + Sized + 'static {
    /// Name used in events and child-side error reports.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Registers message handlers. Called once when the supervisor is built.
    fn register(handlers: &mut Handlers<Self>);

    /// Adjusts the child's signal table (defaults: termination signal and `SIGINT` quit).
    fn signal_handlers(&self, table: &mut SignalTable<Self>) {
        let _ = table;
    }

    /// Parent side, right before `fork`. Add descriptors the child must keep.
    fn before_fork(&mut self, keep: &mut KeepList) -> Result<(), ServerError> {
        let _ = keep;
        Ok(())
    }

    /// Child side, right after the descriptor sweep.
    fn after_fork(&mut self) {}

    /// Child side, before the main loop. An error ends the child.
    fn initialize(&mut self, ctx: &mut Context) -> Result<(), DispatchError> {
        let _ = ctx;
        Ok(())
    }

    /// Child side, after the main loop (also after a fatal loop error).
    fn finalize(&mut self, ctx: &mut Context) {
        let _ = ctx;
    }
}

/// Name → handler table.
///
/// Registering a name twice replaces the earlier handler.
pub struct Handlers<S> {
    map: BTreeMap<String, Handler<S>>,
}

impl<S> Handlers<S> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    /// Binds `name` to `handler`.
    pub fn on<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&mut S, &mut Context, &[Vec<u8>]) -> Result<(), DispatchError>
            + Send
            + Sync
            + 'static,
    {
        self.map.insert(name.into(), Box::new(handler));
        self
    }

    /// Looks up the handler for `name`.
    pub fn get(&self, name: &str) -> Option<&Handler<S>> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }
}

impl<S> Default for Handlers<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for Handlers<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.map.keys()).finish()
    }
}

/// Descriptors that survive the child's descriptor sweep.
#[derive(Clone, Debug, Default)]
pub struct KeepList {
    fds: BTreeSet<RawFd>,
}

impl KeepList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the descriptor behind `fd` open in the child.
    pub fn keep(&mut self, fd: impl AsFd) -> &mut Self {
        self.fds.insert(fd.as_fd().as_raw_fd());
        self
    }

    /// Keeps a raw descriptor number open in the child.
    pub fn keep_raw(&mut self, fd: RawFd) -> &mut Self {
        self.fds.insert(fd);
        self
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        self.fds.contains(&fd)
    }

    pub fn iter(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.fds.iter().copied()
    }
}

/// Child-side state of the main loop, handed to every handler.
pub struct Context {
    channel: Channel<UnixStream>,
    done: bool,
    last_activity: SystemTime,
    descriptor: Option<OwnedFd>,
    rng: StdRng,
    signals_managed: bool,
}

impl Context {
    /// Wraps the child's end of the channel.
    ///
    /// The random source is freshly seeded from the OS, so forked children never
    /// share a sequence with the parent or each other.
    pub(crate) fn new(channel: Channel<UnixStream>, signals_managed: bool) -> Self {
        Self {
            channel,
            done: false,
            last_activity: SystemTime::now(),
            descriptor: None,
            rng: StdRng::from_os_rng(),
            signals_managed,
        }
    }

    /// The channel to the parent (the "client" end from the server's view).
    pub fn client(&mut self) -> &mut Channel<UnixStream> {
        &mut self.channel
    }

    /// Sends one message back to the parent.
    pub fn reply(&mut self, message: &Message) -> Result<(), DispatchError> {
        self.channel.send(message).map_err(DispatchError::from)
    }

    /// Sends one message and a descriptor back to the parent.
    pub fn reply_with_descriptor(
        &mut self,
        message: &Message,
        fd: impl AsFd,
    ) -> Result<(), DispatchError> {
        self.channel
            .send_with_descriptor(message, fd)
            .map_err(DispatchError::from)
    }

    /// Ends the main loop after the current handler returns.
    pub fn quit(&mut self) {
        self.done = true;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// When the last message was received.
    pub fn last_activity(&self) -> SystemTime {
        self.last_activity
    }

    /// Takes the descriptor that arrived with the current message.
    ///
    /// Descriptors not taken by the handler are closed when the next message arrives.
    pub fn take_descriptor(&mut self) -> Option<OwnedFd> {
        self.descriptor.take()
    }

    /// Per-child random source.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// True if the process signal table is installed for this loop.
    pub fn signals_managed(&self) -> bool {
        self.signals_managed
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = SystemTime::now();
    }

    pub(crate) fn set_descriptor(&mut self, fd: Option<OwnedFd>) {
        self.descriptor = fd;
    }

    pub(crate) fn raw_socket(&self) -> RawFd {
        self.channel.get_ref().as_raw_fd()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("socket", &self.raw_socket())
            .field("done", &self.done)
            .field("last_activity", &self.last_activity)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);

    impl Server for Counter {
        fn register(handlers: &mut Handlers<Self>) {
            handlers
                .on("inc", |s, _, _| {
                    s.0 += 1;
                    Ok(())
                })
                .on("inc", |s, _, _| {
                    s.0 += 10;
                    Ok(())
                })
                .on("stop", |_, ctx, _| {
                    ctx.quit();
                    Ok(())
                });
        }
    }

    #[test]
    fn reregistering_replaces_the_handler() {
        let mut handlers = Handlers::new();
        Counter::register(&mut handlers);
        assert_eq!(handlers.len(), 2);
        assert_eq!(handlers.names().collect::<Vec<_>>(), vec!["inc", "stop"]);

        let (a, _b) = UnixStream::pair().unwrap();
        let mut ctx = Context::new(Channel::new(a), false);
        let mut srv = Counter(0);
        (handlers.get("inc").unwrap())(&mut srv, &mut ctx, &[]).unwrap();
        assert_eq!(srv.0, 10);

        (handlers.get("stop").unwrap())(&mut srv, &mut ctx, &[]).unwrap();
        assert!(ctx.is_done());
    }

    #[test]
    fn default_name_is_the_type_name() {
        assert!(Counter(0).name().ends_with("Counter"));
    }

    #[test]
    fn keep_list_deduplicates() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut keep = KeepList::new();
        keep.keep(&a).keep(&a).keep_raw(2);
        assert_eq!(keep.iter().count(), 2);
        assert!(keep.contains(a.as_raw_fd()));
    }
}
