//! # Frame codec.
//!
//! Every record on the wire is self-delimiting, so argument boundaries survive
//! embedded NUL or newline bytes.
//!
//! ```text
//! ┌──────────┬──────────┬──────────────────┬───────────────────────────┐
//! │ kind: u8 │ flags:u8 │ body_len: u32 BE │ body (body_len bytes)     │
//! └──────────┴──────────┴──────────────────┴───────────────────────────┘
//!
//! kind = 1 (message) body:
//!   count: u16 BE (>= 1) │ len_0: u32 BE │ name │ len_1: u32 BE │ arg_1 │ ...
//!
//! kind = 2 (scalar) body:
//!   raw bytes
//!
//! flags bit 0: one descriptor accompanies this frame (SCM_RIGHTS).
//! ```
//!
//! ## Rules
//! - The name (element 0) must be non-empty UTF-8.
//! - `body_len` above the configured limit is rejected before any allocation.
//! - Element lengths must add up to `body_len` exactly.

use super::message::Message;
use crate::error::ChannelError;

/// Size of the fixed frame header.
pub(crate) const HEADER_LEN: usize = 6;

const KIND_MESSAGE: u8 = 1;
const KIND_SCALAR: u8 = 2;

const FLAG_DESCRIPTOR: u8 = 0b0000_0001;

/// A decoded frame.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Frame {
    Message {
        message: Message,
        has_descriptor: bool,
    },
    Scalar {
        data: Vec<u8>,
        has_descriptor: bool,
    },
}

impl Frame {
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Frame::Message { .. } => "message",
            Frame::Scalar { .. } => "scalar",
        }
    }

    pub(crate) fn has_descriptor(&self) -> bool {
        match self {
            Frame::Message { has_descriptor, .. } | Frame::Scalar { has_descriptor, .. } => {
                *has_descriptor
            }
        }
    }
}

/// Encodes a message frame.
pub(crate) fn encode_message(
    message: &Message,
    with_descriptor: bool,
    max_len: usize,
) -> Result<Vec<u8>, ChannelError> {
    if message.name().is_empty() {
        return Err(ChannelError::protocol("message name must not be empty"));
    }
    let count = message.len();
    if count > usize::from(u16::MAX) {
        return Err(ChannelError::protocol(format!(
            "too many message elements: {count}"
        )));
    }

    let body_len = 2
        + 4 * count
        + message.name().len()
        + message.args().iter().map(Vec::len).sum::<usize>();
    check_len(body_len, max_len)?;

    let mut out = Vec::with_capacity(HEADER_LEN + body_len);
    push_header(&mut out, KIND_MESSAGE, with_descriptor, body_len);
    out.extend_from_slice(&(count as u16).to_be_bytes());
    push_element(&mut out, message.name().as_bytes());
    for arg in message.args() {
        push_element(&mut out, arg);
    }
    Ok(out)
}

/// Encodes a scalar frame.
pub(crate) fn encode_scalar(data: &[u8], max_len: usize) -> Result<Vec<u8>, ChannelError> {
    check_len(data.len(), max_len)?;
    let mut out = Vec::with_capacity(HEADER_LEN + data.len());
    push_header(&mut out, KIND_SCALAR, false, data.len());
    out.extend_from_slice(data);
    Ok(out)
}

/// Tries to decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` if `buf` does not yet hold a complete frame; consumed bytes
/// are drained from `buf` only when a frame is returned.
pub(crate) fn decode(buf: &mut Vec<u8>, max_len: usize) -> Result<Option<Frame>, ChannelError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    let kind = buf[0];
    let flags = buf[1];
    let body_len = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]) as usize;
    check_len(body_len, max_len)?;
    if buf.len() < HEADER_LEN + body_len {
        return Ok(None);
    }

    let has_descriptor = flags & FLAG_DESCRIPTOR != 0;
    let frame = {
        let body = &buf[HEADER_LEN..HEADER_LEN + body_len];
        match kind {
            KIND_MESSAGE => Frame::Message {
                message: decode_message_body(body)?,
                has_descriptor,
            },
            KIND_SCALAR => Frame::Scalar {
                data: body.to_vec(),
                has_descriptor,
            },
            other => {
                return Err(ChannelError::protocol(format!("unknown frame kind {other}")));
            }
        }
    };
    buf.drain(..HEADER_LEN + body_len);
    Ok(Some(frame))
}

fn decode_message_body(body: &[u8]) -> Result<Message, ChannelError> {
    let mut cursor = Cursor { buf: body, pos: 0 };
    let count = usize::from(u16::from_be_bytes(cursor.take_array::<2>()?));
    if count == 0 {
        return Err(ChannelError::protocol("message without a name"));
    }

    let name = cursor.take_element()?;
    let name = String::from_utf8(name.to_vec())
        .map_err(|_| ChannelError::protocol("message name is not valid UTF-8"))?;
    if name.is_empty() {
        return Err(ChannelError::protocol("message name must not be empty"));
    }

    let mut args = Vec::with_capacity(count - 1);
    for _ in 1..count {
        args.push(cursor.take_element()?.to_vec());
    }
    if cursor.pos != body.len() {
        return Err(ChannelError::protocol(format!(
            "{} trailing bytes after message body",
            body.len() - cursor.pos
        )));
    }
    Ok(Message::with_parts(name, args))
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ChannelError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| ChannelError::protocol("element runs past end of frame"))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ChannelError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn take_element(&mut self) -> Result<&'a [u8], ChannelError> {
        let len = u32::from_be_bytes(self.take_array::<4>()?) as usize;
        self.take(len)
    }
}

fn check_len(len: usize, max_len: usize) -> Result<(), ChannelError> {
    if len > max_len || len > u32::MAX as usize {
        return Err(ChannelError::FrameTooLarge { len, max: max_len });
    }
    Ok(())
}

fn push_header(out: &mut Vec<u8>, kind: u8, with_descriptor: bool, body_len: usize) {
    out.push(kind);
    out.push(if with_descriptor { FLAG_DESCRIPTOR } else { 0 });
    out.extend_from_slice(&(body_len as u32).to_be_bytes());
}

fn push_element(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}
