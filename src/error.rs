//! Error types used by the supervisor, the channel and the child-side dispatcher.
//!
//! This module defines three error enums:
//!
//! - [`ServerError`]: parent-side lifecycle errors (start/stop misuse, spawn failures, dead server).
//! - [`ChannelError`]: transport and framing failures of the message channel.
//! - [`DispatchError`]: child-side errors that end the main loop (fatal for the child).
//!
//! All types provide `as_label` for logging/metrics.

use std::io;

use nix::errno::Errno;
use thiserror::Error;

/// # Errors produced by the parent-side supervisor.
///
/// Lifecycle misuse (`AlreadyStarted`, `NotStarted`) is a local programming error
/// and is never retried. `ServerExited` means the child went away while the parent
/// was still talking to it; restarting is the caller's decision.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServerError {
    /// `start()` was called on a supervisor that is not in the `NotStarted` state.
    #[error("server is already started")]
    AlreadyStarted,

    /// An operation that needs a running server was called before `start()` or after `stop()`.
    #[error("server is not started")]
    NotStarted,

    /// Creating the socket pair or forking the child failed.
    #[error("failed to spawn server process: {source}")]
    Spawn {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A parent-side hook (`before_fork`) refused to continue.
    #[error("hook {hook} failed: {error}")]
    Hook {
        /// Name of the hook.
        hook: &'static str,
        /// The hook's error message.
        error: String,
    },

    /// The control channel failed.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The server process closed the channel or exited unexpectedly.
    #[error("server process {pid} exited unexpectedly")]
    ServerExited {
        /// Process id of the server.
        pid: i32,
    },
}

impl ServerError {
    /// Builds a [`ServerError::Hook`] from any displayable error.
    pub fn hook(hook: &'static str, error: impl std::fmt::Display) -> Self {
        ServerError::Hook {
            hook,
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use forkvisor::ServerError;
    ///
    /// assert_eq!(ServerError::NotStarted.as_label(), "server_not_started");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ServerError::AlreadyStarted => "server_already_started",
            ServerError::NotStarted => "server_not_started",
            ServerError::Spawn { .. } => "server_spawn_failed",
            ServerError::Hook { .. } => "server_hook_failed",
            ServerError::Channel(_) => "server_channel",
            ServerError::ServerExited { .. } => "server_exited",
        }
    }
}

/// # Errors produced by the message channel.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed its end (broken pipe / reset) while we were writing.
    #[error("channel closed by peer")]
    Closed,

    /// A blocking read was interrupted by a signal before a full frame arrived.
    ///
    /// Only returned by interruptible channels; buffered bytes are kept and the
    /// next `receive` resumes where this one stopped.
    #[error("interrupted by signal")]
    Interrupted,

    /// The transport cannot carry ancillary data (descriptor passing).
    #[error("transport does not support descriptor passing")]
    DescriptorUnsupported,

    /// The byte stream does not contain a valid frame.
    #[error("protocol violation: {reason}")]
    Protocol {
        /// What was wrong with the frame.
        reason: String,
    },

    /// A frame announced a body larger than the configured limit.
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Announced body length.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// A frame of a different kind than requested was received.
    #[error("expected {expected} frame, got {found}")]
    UnexpectedFrame {
        /// Kind the caller asked for.
        expected: &'static str,
        /// Kind found on the wire.
        found: &'static str,
    },
}

impl ChannelError {
    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        ChannelError::Protocol {
            reason: reason.into(),
        }
    }

    /// Maps an I/O error, folding peer-gone conditions into [`ChannelError::Closed`].
    pub(crate) fn from_write(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::WriteZero => ChannelError::Closed,
            _ => ChannelError::Io(err),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ChannelError::Io(_) => "channel_io",
            ChannelError::Closed => "channel_closed",
            ChannelError::Interrupted => "channel_interrupted",
            ChannelError::DescriptorUnsupported => "channel_descriptor_unsupported",
            ChannelError::Protocol { .. } => "channel_protocol",
            ChannelError::FrameTooLarge { .. } => "channel_frame_too_large",
            ChannelError::UnexpectedFrame { .. } => "channel_unexpected_frame",
        }
    }

    /// True if the peer is gone (the channel can no longer be used).
    pub fn is_closed(&self) -> bool {
        matches!(self, ChannelError::Closed)
    }
}

/// # Errors that end the child's main loop.
///
/// Any of these is fatal for the child: it reports the error, runs the
/// finalization path and exits. The parent observes end-of-stream.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No handler is registered for the received message name.
    #[error("unknown message '{name}' received")]
    UnknownMessage {
        /// The message name.
        name: String,
    },

    /// A handler or hook failed.
    #[error("handler failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// The channel to the parent failed.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Installing or restoring signal dispositions failed.
    #[error("signal setup failed: {0}")]
    Signals(#[from] Errno),
}

impl DispatchError {
    /// Builds a [`DispatchError::Failed`] from any displayable error.
    ///
    /// # Example
    /// ```
    /// use forkvisor::DispatchError;
    ///
    /// let err = DispatchError::fail("boom");
    /// assert_eq!(err.as_label(), "dispatch_failed");
    /// ```
    pub fn fail(error: impl std::fmt::Display) -> Self {
        DispatchError::Failed {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::UnknownMessage { .. } => "dispatch_unknown_message",
            DispatchError::Failed { .. } => "dispatch_failed",
            DispatchError::Channel(_) => "dispatch_channel",
            DispatchError::Signals(_) => "dispatch_signals",
        }
    }
}
