//! # Discrete-message channel over a connected stream socket.
//!
//! A [`Channel`] turns a byte stream into a sequence of [`Message`]s (and
//! optional file descriptors). It is used on both sides of the supervisor:
//! the parent holds one end as the control channel, the child's main loop
//! reads from the other.
//!
//! ## Architecture
//! ```text
//!   send(msg) ──► codec::encode_message ──► one frame ──► Transport::send_bytes / send_with_fd
//!                                                              │  (SCM_RIGHTS on first chunk)
//!                                                              ▼
//!   receive() ◄── codec::decode ◄── read buffer ◄── Transport::recv_with_fds ──► descriptor FIFO
//!        │                                                                        │
//!        └──────────── frame flag "has descriptor" pops the oldest ◄──────────────┘
//! ```
//!
//! ## Rules
//! - A frame is written completely before `send` returns (partial writes are continued).
//! - `receive` returns `Ok(None)` only on an orderly close at a frame boundary.
//! - Descriptors arrive no later than the first byte of their frame, so the FIFO
//!   always holds the descriptor when its frame completes.
//! - Interruptible channels surface `EINTR` as [`ChannelError::Interrupted`] and keep
//!   the partial frame buffered; other channels retry transparently.
//!
//! ## Example
//! ```rust
//! use std::os::unix::net::UnixStream;
//! use forkvisor::{Channel, Message};
//!
//! let (a, b) = UnixStream::pair().unwrap();
//! let (mut parent, mut child) = (Channel::new(a), Channel::new(b));
//!
//! parent.send(&Message::new("echo").with_arg("hello")).unwrap();
//! let envelope = child.receive().unwrap().expect("message");
//! assert_eq!(envelope.message.arg_str(0), Some("hello"));
//!
//! drop(parent);
//! assert!(child.receive().unwrap().is_none());
//! ```

mod codec;
mod message;
mod transport;

pub use message::{Envelope, Message};
pub use transport::Transport;

use std::collections::VecDeque;
use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::net::UnixStream;

use crate::error::ChannelError;
use codec::Frame;

/// Default upper bound for a frame body (16 MiB).
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Bidirectional message channel over a [`Transport`].
#[derive(Debug)]
pub struct Channel<T: Transport = UnixStream> {
    transport: T,
    rbuf: Vec<u8>,
    fds: VecDeque<OwnedFd>,
    eof: bool,
    interruptible: bool,
    max_len: usize,
}

impl<T: Transport> Channel<T> {
    /// Wraps a connected transport.
    ///
    /// The channel retries interrupted reads and uses [`DEFAULT_MAX_MESSAGE_LEN`].
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            rbuf: Vec::new(),
            fds: VecDeque::new(),
            eof: false,
            interruptible: false,
            max_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }

    /// Makes blocking reads return [`ChannelError::Interrupted`] on `EINTR`.
    pub fn interruptible(mut self, yes: bool) -> Self {
        self.interruptible = yes;
        self
    }

    /// Sets the maximum accepted frame body length (min 1).
    pub fn with_max_message_len(mut self, max: usize) -> Self {
        self.max_len = max.max(1);
        self
    }

    /// Returns a reference to the underlying transport.
    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    /// Consumes the channel, returning the transport.
    ///
    /// Buffered bytes and descriptors that were not yet claimed are dropped.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Sends one message.
    pub fn send(&mut self, message: &Message) -> Result<(), ChannelError> {
        let frame = codec::encode_message(message, false, self.max_len)?;
        self.write_frame(&frame, None)
    }

    /// Sends one message together with one open descriptor.
    ///
    /// The peer receives its own duplicate; closing ours afterwards does not affect it.
    pub fn send_with_descriptor(
        &mut self,
        message: &Message,
        descriptor: impl AsFd,
    ) -> Result<(), ChannelError> {
        if !self.transport.supports_descriptors() {
            return Err(ChannelError::DescriptorUnsupported);
        }
        let frame = codec::encode_message(message, true, self.max_len)?;
        self.write_frame(&frame, Some(descriptor.as_fd()))
    }

    /// Sends a raw byte blob as a single scalar frame.
    pub fn send_scalar(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        let frame = codec::encode_scalar(data, self.max_len)?;
        self.write_frame(&frame, None)
    }

    /// Blocks until one message arrives.
    ///
    /// Returns `Ok(None)` when the peer closed the channel.
    pub fn receive(&mut self) -> Result<Option<Envelope>, ChannelError> {
        match self.next_frame()? {
            None => Ok(None),
            Some((Frame::Message { message, .. }, descriptor)) => {
                Ok(Some(Envelope { message, descriptor }))
            }
            Some((frame, _)) => Err(ChannelError::UnexpectedFrame {
                expected: "message",
                found: frame.kind_name(),
            }),
        }
    }

    /// Blocks until one scalar frame arrives.
    ///
    /// Returns `Ok(None)` when the peer closed the channel.
    pub fn receive_scalar(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        match self.next_frame()? {
            None => Ok(None),
            Some((Frame::Scalar { data, .. }, _)) => Ok(Some(data)),
            Some((frame, _)) => Err(ChannelError::UnexpectedFrame {
                expected: "scalar",
                found: frame.kind_name(),
            }),
        }
    }

    fn next_frame(&mut self) -> Result<Option<(Frame, Option<OwnedFd>)>, ChannelError> {
        loop {
            if let Some(frame) = codec::decode(&mut self.rbuf, self.max_len)? {
                let descriptor = if frame.has_descriptor() {
                    let fd = self.fds.pop_front().ok_or_else(|| {
                        ChannelError::protocol("frame announced a descriptor that never arrived")
                    })?;
                    Some(fd)
                } else {
                    None
                };
                return Ok(Some((frame, descriptor)));
            }

            if self.eof {
                if self.rbuf.is_empty() {
                    return Ok(None);
                }
                return Err(ChannelError::protocol(format!(
                    "peer closed in the middle of a frame ({} bytes buffered)",
                    self.rbuf.len()
                )));
            }
            self.fill()?;
        }
    }

    fn fill(&mut self) -> Result<(), ChannelError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.transport.recv_with_fds(&mut chunk, &mut self.fds) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.rbuf.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    if self.interruptible {
                        return Err(ChannelError::Interrupted);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                    self.eof = true;
                    return Ok(());
                }
                Err(e) => return Err(ChannelError::Io(e)),
            }
        }
    }

    fn write_frame(
        &mut self,
        frame: &[u8],
        mut descriptor: Option<std::os::fd::BorrowedFd<'_>>,
    ) -> Result<(), ChannelError> {
        let mut written = 0;
        while written < frame.len() {
            let rest = &frame[written..];
            let res = match descriptor {
                Some(fd) => self.transport.send_with_fd(rest, fd),
                None => self.transport.send_bytes(rest),
            };
            match res {
                Ok(0) => return Err(ChannelError::Closed),
                Ok(n) => {
                    written += n;
                    descriptor = None;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ChannelError::from_write(e)),
            }
        }
        Ok(())
    }
}
