//! Protocol handler contract
//!
//! The boundary between the endpoint core and whatever protocol runs on
//! top of it. The core delivers readiness, the handler reads and writes
//! the non-blocking socket, and the returned [`SocketState`] tells the
//! core what to do next. Handlers never touch selector state.

use crate::socket::SocketRef;
use netmux_core::state::SocketState;

/// Socket-processing callbacks.
///
/// Both methods are invoked from worker threads (or an external
/// executor), potentially many at once for different sockets, so
/// implementations take `&self` and hold their own synchronization.
/// The same socket is never dispatched twice concurrently: readiness is
/// one-shot and the worker owns the socket until it closes or re-arms.
pub trait Handler: Send + Sync {
    /// Normal readiness: the socket has data (or EOF) to read.
    fn process(&self, socket: &SocketRef) -> SocketState;

    /// Comet readiness: the socket was registered as a long-poll
    /// connection. `error` is true when the dispatch arose from
    /// cancellation or failure rather than data.
    ///
    /// The default closes the connection, which is the correct answer
    /// for handlers that never mark a socket comet.
    fn event(&self, socket: &SocketRef, error: bool) -> SocketState {
        let _ = (socket, error);
        SocketState::Closed
    }
}
