//! Error types for the netmux endpoint

use core::fmt;
use std::io;

/// Result type for endpoint operations
pub type EndpointResult<T> = Result<T, EndpointError>;

/// Errors that can occur while running the endpoint.
///
/// Per-connection I/O failures are not represented here; those are
/// logged and contained where they happen. Only operations whose
/// failure the caller must act on (lifecycle, dispatch) surface an
/// `EndpointError`.
#[derive(Debug)]
pub enum EndpointError {
    /// Binding the listening socket failed
    Bind(io::Error),

    /// Creating the readiness selector or its waker failed
    Selector(io::Error),

    /// An acceptor, poller or worker thread could not be spawned
    SpawnFailed(&'static str),

    /// The external executor refused the task
    Rejected,

    /// Operation requires a running endpoint
    NotRunning,

    /// Configuration failed validation
    InvalidConfig(&'static str),

    /// Any other I/O failure on the endpoint's own sockets
    Io(io::Error),
}

impl fmt::Display for EndpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointError::Bind(e) => write!(f, "bind failed: {}", e),
            EndpointError::Selector(e) => write!(f, "selector setup failed: {}", e),
            EndpointError::SpawnFailed(what) => write!(f, "failed to spawn {} thread", what),
            EndpointError::Rejected => write!(f, "executor rejected the task"),
            EndpointError::NotRunning => write!(f, "endpoint is not running"),
            EndpointError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            EndpointError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for EndpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EndpointError::Bind(e)
            | EndpointError::Selector(e)
            | EndpointError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for EndpointError {
    fn from(e: io::Error) -> Self {
        EndpointError::Io(e)
    }
}

/// Error returned by an [`Executor`](crate::traits::Executor) that cannot
/// take more work (queue full, shut down).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRejected;

impl fmt::Display for TaskRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task rejected")
    }
}

impl std::error::Error for TaskRejected {}

impl From<TaskRejected> for EndpointError {
    fn from(_: TaskRejected) -> Self {
        EndpointError::Rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = EndpointError::SpawnFailed("worker");
        assert_eq!(format!("{}", e), "failed to spawn worker thread");

        let e = EndpointError::InvalidConfig("backlog must be > 0");
        assert_eq!(format!("{}", e), "invalid config: backlog must be > 0");
    }

    #[test]
    fn test_source_chain() {
        let io_err = io::Error::new(io::ErrorKind::AddrInUse, "port taken");
        let e = EndpointError::Bind(io_err);
        assert!(std::error::Error::source(&e).is_some());

        let e = EndpointError::NotRunning;
        assert!(std::error::Error::source(&e).is_none());
    }

    #[test]
    fn test_conversions() {
        let e: EndpointError = TaskRejected.into();
        assert!(matches!(e, EndpointError::Rejected));

        let e: EndpointError = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(e, EndpointError::Io(_)));
    }
}
