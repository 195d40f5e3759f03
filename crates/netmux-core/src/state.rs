//! Handler verdict types

use core::fmt;

/// What the protocol handler wants done with a socket after a dispatch.
///
/// Returned by `Handler::process` and `Handler::event`; the endpoint core
/// acts on it, the handler never touches selector state directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// Keep the connection: the core re-arms read readiness and the socket
    /// goes back to the poller as a keep-alive connection.
    Open,

    /// The conversation is over (or broken): the core closes the socket.
    Closed,

    /// Long-running request: the socket stays registered but is not
    /// re-armed. The handler has taken ownership of re-arm timing
    /// (comet / long-poll).
    Long,
}

impl SocketState {
    /// True if the core should close the socket.
    #[inline]
    pub const fn is_closed(&self) -> bool {
        matches!(self, SocketState::Closed)
    }
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketState::Open => write!(f, "open"),
            SocketState::Closed => write!(f, "closed"),
            SocketState::Long => write!(f, "long"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_closed() {
        assert!(SocketState::Closed.is_closed());
        assert!(!SocketState::Open.is_closed());
        assert!(!SocketState::Long.is_closed());
    }
}
