//! # Per-server signal table.
//!
//! A [`SignalTable`] maps signals to [`SignalAction`]s. It is built in the child
//! right before the main loop starts: first the defaults from the config (the
//! termination signal and `SIGINT` quit the loop), then
//! [`Server::signal_handlers`](crate::Server::signal_handlers) may override them.
//!
//! Callbacks never run inside the OS handler; the handler only marks the signal
//! pending and the main loop calls the callback between messages.

use std::collections::BTreeMap;
use std::fmt;

use nix::sys::signal::Signal;

use super::manager::{Disposition, is_trappable};
use crate::core::Context;
use crate::error::DispatchError;

/// Deferred signal callback run by the main loop.
pub type SignalCallback<S> =
    Box<dyn Fn(&mut S, &mut Context, Signal) -> Result<(), DispatchError> + Send + Sync>;

/// Action bound to a signal.
pub enum SignalAction<S> {
    /// OS default action.
    Default,
    /// Ignore the signal.
    Ignore,
    /// End the main loop (reported as `LoopExit::Signalled`).
    Quit,
    /// Run a callback from the main loop.
    Callback(SignalCallback<S>),
}

impl<S> SignalAction<S> {
    fn disposition(&self) -> Disposition {
        match self {
            SignalAction::Default => Disposition::Default,
            SignalAction::Ignore => Disposition::Ignore,
            SignalAction::Quit => Disposition::Quit,
            SignalAction::Callback(_) => Disposition::Deferred,
        }
    }
}

impl<S> fmt::Debug for SignalAction<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalAction::Default => f.write_str("Default"),
            SignalAction::Ignore => f.write_str("Ignore"),
            SignalAction::Quit => f.write_str("Quit"),
            SignalAction::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Signal → action bindings for one server.
pub struct SignalTable<S> {
    actions: BTreeMap<i32, (Signal, SignalAction<S>)>,
}

impl<S> SignalTable<S> {
    /// Creates an empty table (every signal at its OS default).
    pub fn new() -> Self {
        Self {
            actions: BTreeMap::new(),
        }
    }

    /// Creates a table where `termination` and `SIGINT` quit the main loop.
    pub fn with_termination(termination: Signal) -> Self {
        let mut table = Self::new();
        table.quit_on(termination).quit_on(Signal::SIGINT);
        table
    }

    /// Binds `signal` to [`SignalAction::Quit`].
    pub fn quit_on(&mut self, signal: Signal) -> &mut Self {
        self.set(signal, SignalAction::Quit)
    }

    /// Binds `signal` to [`SignalAction::Ignore`].
    pub fn ignore(&mut self, signal: Signal) -> &mut Self {
        self.set(signal, SignalAction::Ignore)
    }

    /// Binds `signal` back to the OS default.
    pub fn default_on(&mut self, signal: Signal) -> &mut Self {
        self.set(signal, SignalAction::Default)
    }

    /// Binds `signal` to a callback run from the main loop.
    pub fn on<F>(&mut self, signal: Signal, callback: F) -> &mut Self
    where
        F: Fn(&mut S, &mut Context, Signal) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        self.set(signal, SignalAction::Callback(Box::new(callback)))
    }

    /// Returns the action bound to `signal`, if any.
    pub fn get(&self, signal: Signal) -> Option<&SignalAction<S>> {
        self.actions.get(&(signal as i32)).map(|(_, a)| a)
    }

    /// Plan handed to [`SignalManager::install`](super::SignalManager::install).
    ///
    /// Non-trappable signals are left out.
    pub fn dispositions(&self) -> Vec<(Signal, Disposition)> {
        self.actions
            .values()
            .filter(|(s, _)| is_trappable(*s))
            .map(|(s, a)| (*s, a.disposition()))
            .collect()
    }

    /// Number of bound signals.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// True if no signal is bound.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    fn set(&mut self, signal: Signal, action: SignalAction<S>) -> &mut Self {
        self.actions.insert(signal as i32, (signal, action));
        self
    }
}

impl<S> Default for SignalTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for SignalTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.actions.values().map(|(s, a)| (s, a)))
            .finish()
    }
}
