//! # Child-side main loop: read, dispatch, handle.
//!
//! ```text
//! loop {
//!   ├─► receive()
//!   │     ├─ Some(msg) ─► touch last_activity, stash descriptor
//!   │     │               ├─ handler found ─► handler(&mut server, &mut ctx, args)  (error = fatal)
//!   │     │               └─ not found     ─► UnknownMessage                        (fatal)
//!   │     ├─ None      ─► quit signal seen? Signalled(sig) : PeerClosed
//!   │     ├─ EINTR     ─► fall through (not an error)
//!   │     └─ error     ─► quit signal seen? Signalled(sig) : fatal
//!   ├─► run deferred signal callbacks
//!   ├─► quit signal?     ─► Signalled(sig)
//!   └─► ctx.quit()?      ─► Quit
//! }
//! ```
//!
//! ## Rules
//! - Messages are handled strictly one at a time, in arrival order.
//! - The quit flag is checked after every iteration, so a handler that polls
//!   [`quit_requested`](crate::signals::quit_requested) and returns ends the loop.
//! - Process-wide signal flags are only consulted when the context manages signals.
//! - A read error while a quit is pending ends the loop as `Signalled`, not as a failure.

use nix::sys::signal::Signal;

use super::server::{Context, Handlers};
use crate::error::{ChannelError, DispatchError};
use crate::signals::{self, SignalAction, SignalTable};

/// Why the main loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopExit {
    /// The parent closed the channel.
    PeerClosed,
    /// A handler called [`Context::quit`].
    Quit,
    /// A quit signal was received.
    Signalled(Signal),
}

impl LoopExit {
    pub fn as_label(&self) -> &'static str {
        match self {
            LoopExit::PeerClosed => "peer_closed",
            LoopExit::Quit => "quit",
            LoopExit::Signalled(_) => "signalled",
        }
    }
}

/// Runs the main loop until the peer closes, a handler quits or a quit signal arrives.
pub fn main_loop<S>(
    server: &mut S,
    handlers: &Handlers<S>,
    table: &SignalTable<S>,
    ctx: &mut Context,
) -> Result<LoopExit, DispatchError> {
    loop {
        match ctx.client().receive() {
            Ok(Some(envelope)) => {
                let (message, descriptor) = envelope.into_parts();
                ctx.touch();
                ctx.set_descriptor(descriptor);
                let handler =
                    handlers
                        .get(message.name())
                        .ok_or_else(|| DispatchError::UnknownMessage {
                            name: message.name().to_string(),
                        })?;
                handler(server, ctx, message.args())?;
            }
            Ok(None) => {
                return Ok(pending_quit(ctx).map_or(LoopExit::PeerClosed, LoopExit::Signalled));
            }
            Err(ChannelError::Interrupted) => {}
            // A quit shuts the read half down, which can cut a buffered frame short.
            Err(e) => {
                return match pending_quit(ctx) {
                    Some(signal) => Ok(LoopExit::Signalled(signal)),
                    None => Err(e.into()),
                };
            }
        }

        run_deferred(server, table, ctx)?;
        if let Some(signal) = pending_quit(ctx) {
            return Ok(LoopExit::Signalled(signal));
        }
        if ctx.is_done() {
            return Ok(LoopExit::Quit);
        }
    }
}

fn pending_quit(ctx: &Context) -> Option<Signal> {
    if ctx.signals_managed() {
        signals::take_quit_request()
    } else {
        None
    }
}

fn run_deferred<S>(
    server: &mut S,
    table: &SignalTable<S>,
    ctx: &mut Context,
) -> Result<(), DispatchError> {
    if !ctx.signals_managed() {
        return Ok(());
    }
    for signal in signals::take_pending() {
        if let Some(SignalAction::Callback(callback)) = table.get(signal) {
            callback(server, ctx, signal)?;
        }
    }
    Ok(())
}
