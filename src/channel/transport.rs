#![allow(unsafe_code)]
//! # Byte-stream transports for the channel.
//!
//! This module uses unsafe code for the `sendmsg`/`recvmsg` calls and the
//! control-message macros (`CMSG_SPACE`, `CMSG_LEN`, `CMSG_DATA`) needed for
//! `SCM_RIGHTS` descriptor passing.
//!
//! [`Transport`] is the seam between the framing layer and the socket:
//! - [`UnixStream`] carries ancillary data (descriptor passing);
//! - [`TcpStream`] does not, and a channel over it refuses `send_with_descriptor`.
//!
//! ## Rules
//! - Writes never raise `SIGPIPE`: unix sockets use `MSG_NOSIGNAL`.
//! - Received descriptors are marked close-on-exec and become [`OwnedFd`]s
//!   immediately, so they are closed even if the frame they belong to is never read.
//! - Errors are returned raw (`EINTR` included); retry policy lives in the channel.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::mem;
use std::net::TcpStream;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::ptr;

/// Upper bound of descriptors accepted by a single `recvmsg`.
const MAX_FDS_PER_RECV: usize = 8;

/// Control buffer in `u64` words: properly aligned for `cmsghdr`.
const CONTROL_WORDS: usize = 16;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

#[cfg(any(target_os = "linux", target_os = "android"))]
const RECV_FLAGS: libc::c_int = libc::MSG_CMSG_CLOEXEC;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const RECV_FLAGS: libc::c_int = 0;

/// Connected byte stream a [`Channel`](super::Channel) can run over.
pub trait Transport: Read + Write + AsFd {
    /// Whether descriptors can be sent alongside data.
    fn supports_descriptors(&self) -> bool {
        false
    }

    /// Writes bytes; may write fewer than `buf.len()`.
    fn send_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write(buf)
    }

    /// Writes bytes together with one descriptor; may write fewer than `buf.len()`,
    /// but the descriptor is transferred whenever at least one byte is written.
    fn send_with_fd(&mut self, buf: &[u8], fd: BorrowedFd<'_>) -> io::Result<usize> {
        let _ = (buf, fd);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "transport cannot carry descriptors",
        ))
    }

    /// Reads bytes and pushes any received descriptors onto `fds` (oldest first).
    fn recv_with_fds(&mut self, buf: &mut [u8], fds: &mut VecDeque<OwnedFd>) -> io::Result<usize> {
        let _ = fds;
        self.read(buf)
    }
}

impl Transport for TcpStream {}

impl Transport for UnixStream {
    fn supports_descriptors(&self) -> bool {
        true
    }

    fn send_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
        // SAFETY: `buf` is valid for `buf.len()` bytes for the duration of the call.
        let n = unsafe {
            libc::send(
                self.as_raw_fd(),
                buf.as_ptr().cast(),
                buf.len(),
                SEND_FLAGS,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    fn send_with_fd(&mut self, buf: &[u8], fd: BorrowedFd<'_>) -> io::Result<usize> {
        let mut control = [0u64; CONTROL_WORDS];
        let fd_size = mem::size_of::<RawFd>();
        // SAFETY: CMSG_SPACE is a pure size computation.
        let space = unsafe { libc::CMSG_SPACE(fd_size as u32) } as usize;
        debug_assert!(space <= mem::size_of_val(&control));

        let mut iov = libc::iovec {
            iov_base: buf.as_ptr() as *mut libc::c_void,
            iov_len: buf.len(),
        };
        // SAFETY: an all-zero msghdr is a valid "empty" header.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr().cast();
        msg.msg_controllen = space as _;

        // SAFETY: `control` is aligned and large enough for one SCM_RIGHTS header
        // carrying a single descriptor; CMSG_FIRSTHDR is non-null because
        // msg_controllen >= size_of::<cmsghdr>().
        unsafe {
            let cmsg = libc::CMSG_FIRSTHDR(&msg);
            (*cmsg).cmsg_level = libc::SOL_SOCKET;
            (*cmsg).cmsg_type = libc::SCM_RIGHTS;
            (*cmsg).cmsg_len = libc::CMSG_LEN(fd_size as u32) as _;
            ptr::write_unaligned(libc::CMSG_DATA(cmsg).cast::<RawFd>(), fd.as_raw_fd());
        }

        // SAFETY: every pointer in `msg` refers to live stack data.
        let n = unsafe { libc::sendmsg(self.as_raw_fd(), &msg, SEND_FLAGS) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    fn recv_with_fds(&mut self, buf: &mut [u8], fds: &mut VecDeque<OwnedFd>) -> io::Result<usize> {
        let mut control = [0u64; CONTROL_WORDS];
        // SAFETY: pure size computation.
        let space =
            unsafe { libc::CMSG_SPACE((MAX_FDS_PER_RECV * mem::size_of::<RawFd>()) as u32) }
                as usize;
        debug_assert!(space <= mem::size_of_val(&control));

        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr().cast(),
            iov_len: buf.len(),
        };
        // SAFETY: an all-zero msghdr is a valid "empty" header.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr().cast();
        msg.msg_controllen = space as _;

        // SAFETY: every pointer in `msg` refers to live stack data or `buf`.
        let n = unsafe { libc::recvmsg(self.as_raw_fd(), &mut msg, RECV_FLAGS) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: the kernel filled `control` with `msg_controllen` bytes of
        // well-formed control messages; we only walk them with the CMSG macros.
        unsafe {
            let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
            while !cmsg.is_null() {
                if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                    let header = libc::CMSG_LEN(0) as usize;
                    let data_len = ((*cmsg).cmsg_len as usize).saturating_sub(header);
                    let count = data_len / mem::size_of::<RawFd>();
                    let data = libc::CMSG_DATA(cmsg).cast::<RawFd>();
                    for i in 0..count {
                        let raw = ptr::read_unaligned(data.add(i));
                        fds.push_back(OwnedFd::from_raw_fd(raw));
                    }
                }
                cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
            }
        }

        if msg.msg_flags & libc::MSG_CTRUNC != 0 {
            return Err(io::Error::other("ancillary data truncated; descriptors lost"));
        }
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::{Seek, SeekFrom};

    #[test]
    fn unix_stream_passes_a_descriptor() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"shared").unwrap();

        let n = a.send_with_fd(b"x", file.as_fd()).unwrap();
        assert_eq!(n, 1);
        drop(file);

        let mut buf = [0u8; 8];
        let mut fds = VecDeque::new();
        let n = b.recv_with_fds(&mut buf, &mut fds).unwrap();
        assert_eq!(&buf[..n], b"x");
        assert_eq!(fds.len(), 1);

        let mut received = File::from(fds.pop_front().unwrap());
        received.seek(SeekFrom::Start(0)).unwrap();
        let mut contents = String::new();
        received.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "shared");
    }

    #[test]
    fn tcp_stream_refuses_descriptors() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let file = tempfile::tempfile().unwrap();

        assert!(!stream.supports_descriptors());
        let err = stream.send_with_fd(b"x", file.as_fd()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn send_to_closed_peer_is_broken_pipe_not_sigpipe() {
        let (mut a, b) = UnixStream::pair().unwrap();
        drop(b);
        let err = a.send_bytes(b"hello").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
