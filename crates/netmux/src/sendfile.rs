//! Sendfile interface
//!
//! Zero-copy file transmission is an interface in this release, not an
//! implementation: no OS sendfile backend is wired in, so
//! [`Endpoint::init`](crate::Endpoint::init) disables `use_sendfile`
//! with a warning and handlers fall back to ordinary writes. The types
//! exist so a backend can be plugged in without changing callers.

use crate::socket::SocketRef;
use log::debug;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One queued file transmission.
pub struct SendfileData {
    /// File to transmit.
    pub file_name: String,
    /// First byte offset.
    pub start: u64,
    /// One past the last byte offset.
    pub end: u64,
    /// Current position, advanced by the sender.
    pub pos: u64,
    /// Hand the socket back to a worker when the file completes, rather
    /// than closing it.
    pub keep_alive: bool,
    /// Target connection.
    pub socket: SocketRef,
}

/// The static-file sender.
pub struct Sendfile {
    count: AtomicUsize,
}

impl Sendfile {
    pub fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
        }
    }

    /// Reset the sender. A real backend would allocate its pollset here.
    pub fn init(&self) {
        self.count.store(0, Ordering::Relaxed);
    }

    /// Drop anything still queued. A real backend would close the
    /// sockets remaining in its pollset.
    pub fn destroy(&self) {
        self.count.store(0, Ordering::Relaxed);
    }

    /// Try to transmit the file.
    ///
    /// Returns `true` when the whole range was sent synchronously and
    /// `false` when it was not; with no backend available this always
    /// declines and the caller must write the file itself.
    pub fn add(&self, data: &SendfileData) -> bool {
        debug!(
            "sendfile declined for {} ({}..{}): no backend",
            data.file_name, data.start, data.end
        );
        false
    }

    /// Number of sockets currently queued on the sendfile poller.
    pub fn sendfile_count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for Sendfile {
    fn default() -> Self {
        Self::new()
    }
}
