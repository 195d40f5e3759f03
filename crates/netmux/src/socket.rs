//! Connection socket wrapper
//!
//! A [`Socket`] pairs the non-blocking stream with its per-connection
//! [`Attachment`] and the handle of the poller it is registered with.
//! It is shared as [`SocketRef`] between the poller (which owns the
//! registration), the worker processing it, and any thread parked on it.
//!
//! Reads and writes go through `&TcpStream`, so no exclusive borrow is
//! needed; registration itself happens by raw fd on the poller thread.

use crate::poller::PollerHandle;
use mio::net::TcpStream;
use netmux_core::attachment::Attachment;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Sentinel for "not registered with a poller".
pub(crate) const TOKEN_NONE: usize = usize::MAX;

/// A shared handle to one accepted connection.
pub type SocketRef = Arc<Socket>;

/// One accepted, non-blocking connection.
pub struct Socket {
    stream: TcpStream,
    peer: SocketAddr,
    token: AtomicUsize,
    attachment: Attachment,
    poller: PollerHandle,
    /// Back-reference so `&self` methods can hand a clone of the owning
    /// `Arc` to the poller queue.
    me: Weak<Socket>,
}

impl Socket {
    pub(crate) fn new(stream: TcpStream, peer: SocketAddr, poller: PollerHandle) -> SocketRef {
        Arc::new_cyclic(|me| Self {
            stream,
            peer,
            token: AtomicUsize::new(TOKEN_NONE),
            attachment: Attachment::new(),
            poller,
            me: me.clone(),
        })
    }

    /// Non-blocking read. `WouldBlock` means the socket has drained;
    /// `Ok(0)` means the peer closed its half.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.stream).read(buf)
    }

    /// Non-blocking write of as much of `buf` as the kernel accepts.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        (&self.stream).write(buf)
    }

    /// Write the whole buffer, spinning on `WouldBlock` only across
    /// partial progress. Handlers with large responses should prefer
    /// their own flow control.
    pub fn write_all(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::yield_now();
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn attachment(&self) -> &Attachment {
        &self.attachment
    }

    /// Return the connection to the poller awaiting the next request:
    /// read interest is re-armed on the poller thread.
    ///
    /// Called by the core when a handler returns
    /// [`SocketState::Open`](netmux_core::SocketState::Open), and by
    /// comet handlers that own their re-arm timing.
    pub fn rearm(&self) {
        if let Some(me) = self.me.upgrade() {
            self.poller.rearm(me);
        }
    }

    /// Park the calling thread until the connection becomes readable
    /// again (comet long-poll).
    ///
    /// Sets the wake-up flag, re-arms read interest, then parks on the
    /// attachment. The poller, seeing readiness with the flag up, clears
    /// it and releases the parker instead of dispatching. The signal is
    /// one-shot, so readiness arriving before the park is not lost.
    ///
    /// Returns `true` when released by readiness (or cancellation; the
    /// caller's next read tells them apart), `false` on timeout.
    pub fn park_until_readable(&self, timeout: Option<Duration>) -> bool {
        self.attachment.set_wake_up(true);
        self.rearm();
        let woken = self.attachment.park(timeout);
        if !woken {
            self.attachment.set_wake_up(false);
        }
        woken
    }

    /// Tear the connection down: wake any parked thread, shut both
    /// directions down, and queue deregistration with the poller. The
    /// descriptor itself closes when the last [`SocketRef`] drops.
    pub(crate) fn close(&self) {
        self.release_parker();
        self.shutdown_now();
        if let Some(me) = self.me.upgrade() {
            self.poller.close(me);
        }
    }

    /// Release a thread parked on this connection, if any.
    pub(crate) fn release_parker(&self) {
        if self.attachment.wake_up() {
            self.attachment.set_wake_up(false);
            self.attachment.unpark();
        }
    }

    /// Shut both directions down without going through the poller.
    /// Used on the poller thread itself, where queueing would be
    /// pointless, and on teardown paths.
    pub(crate) fn shutdown_now(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    pub(crate) fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub(crate) fn registered_token(&self) -> usize {
        self.token.load(Ordering::Acquire)
    }

    pub(crate) fn set_registered_token(&self, token: usize) {
        self.token.store(token, Ordering::Release);
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("peer", &self.peer)
            .field("token", &self.token.load(Ordering::Relaxed))
            .finish()
    }
}
