//! # Discrete messages exchanged over a [`Channel`](super::Channel).
//!
//! A [`Message`] is an ordered list of byte strings. Element 0 is the **name**
//! (non-empty UTF-8), the remaining elements are **arguments** and may contain
//! arbitrary bytes (NUL, newlines, non-UTF-8).
//!
//! ## Example
//! ```rust
//! use forkvisor::Message;
//!
//! let msg = Message::new("hello").with_arg("Joe").with_arg(b"\0raw\n");
//! assert_eq!(msg.name(), "hello");
//! assert_eq!(msg.arg_str(0), Some("Joe"));
//! assert_eq!(msg.arg(1), Some(&b"\0raw\n"[..]));
//! ```

use std::os::fd::OwnedFd;

/// An ordered sequence of strings: a name followed by arguments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Message {
    name: String,
    args: Vec<Vec<u8>>,
}

impl Message {
    /// Creates a message without arguments.
    ///
    /// The name must be non-empty; an empty name is rejected when the message is sent.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Creates a message from a name and a list of arguments.
    pub fn with_parts<I, A>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(|a| a.as_ref().to_vec()).collect(),
        }
    }

    /// Appends one argument.
    #[inline]
    pub fn with_arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(arg.as_ref().to_vec());
        self
    }

    /// Returns the message name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all arguments (the message without its name).
    #[inline]
    pub fn args(&self) -> &[Vec<u8>] {
        &self.args
    }

    /// Returns argument `i` as raw bytes.
    pub fn arg(&self, i: usize) -> Option<&[u8]> {
        self.args.get(i).map(Vec::as_slice)
    }

    /// Returns argument `i` if it is valid UTF-8.
    pub fn arg_str(&self, i: usize) -> Option<&str> {
        self.arg(i).and_then(|a| std::str::from_utf8(a).ok())
    }

    /// Number of elements including the name.
    #[inline]
    pub fn len(&self) -> usize {
        self.args.len() + 1
    }

    /// Always `false`: a message has at least its name.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Splits the message into name and arguments.
    pub fn into_parts(self) -> (String, Vec<Vec<u8>>) {
        (self.name, self.args)
    }
}

/// A received message and the descriptor that travelled with it, if any.
///
/// The descriptor is owned by the receiver: it stays valid after the sender
/// closes its own copy.
#[derive(Debug)]
pub struct Envelope {
    /// The decoded message.
    pub message: Message,
    /// Descriptor attached via `send_with_descriptor`.
    pub descriptor: Option<OwnedFd>,
}

impl Envelope {
    /// Splits the envelope into its message and optional descriptor.
    pub fn into_parts(self) -> (Message, Option<OwnedFd>) {
        (self.message, self.descriptor)
    }
}
