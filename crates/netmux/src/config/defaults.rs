//! Compile-time configuration defaults
//!
//! Runtime overrides come from `NMX_*` environment variables, see
//! [`EndpointConfig::from_env`](super::EndpointConfig::from_env).

/// Listening port (0 = kernel-assigned ephemeral port)
pub const PORT: u16 = 0;

/// Listen backlog
pub const BACKLOG: u32 = 100;

/// TCP_NODELAY on accepted sockets
pub const TCP_NODELAY: bool = false;

/// SO_LINGER on accepted sockets, seconds
pub const SO_LINGER_SECS: u64 = 100;

/// Idle-connection timeout, ms (0 = disabled)
pub const SO_TIMEOUT_MS: u64 = 0;

/// Budget for the first read before a connection is parked, ms.
/// Enforced by protocol handlers, not by the endpoint core.
pub const FIRST_READ_TIMEOUT_MS: u64 = 60_000;

/// Upper bound on lazily-created worker threads
pub const MAX_THREADS: i64 = 40;

/// Thread name prefix
pub const NAME: &str = "nmx";

/// Maximum connections registered per poller
pub const POLLER_SIZE: usize = 8192;

/// Poll interval, microseconds. Bounds how long poller destruction waits
/// for an in-flight selection.
pub const POLL_TIME_US: u64 = 2_000;

/// Upper bound for one blocking selection, ms
pub const SELECTOR_TIMEOUT_MS: u64 = 5_000;

/// Acceptor thread count
pub const ACCEPTOR_THREADS: usize = 1;

/// Poller thread count (held at 1 in this release; the poller owns
/// selector state that is not sharded)
pub const POLLER_THREADS: usize = 1;

/// Sendfile acceleration (no backend in this build)
pub const USE_SENDFILE: bool = false;

/// Comet (long-poll) dispatch
pub const USE_COMET: bool = true;
