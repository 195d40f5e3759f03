//! Endpoint configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Configuration priority (highest wins)
//!
//! 1. Builder methods (programmatic)
//! 2. Environment variables (`NMX_*`, runtime)
//! 3. Library defaults
//!
//! # Example
//!
//! ```ignore
//! use netmux::EndpointConfig;
//! use std::time::Duration;
//!
//! let config = EndpointConfig::from_env()
//!     .port(8080)
//!     .max_threads(Some(16))
//!     .so_timeout(Some(Duration::from_secs(30)));
//! ```

pub mod defaults;

use netmux_core::env::{env_get, env_get_bool, env_get_str};
use netmux_core::error::{EndpointError, EndpointResult};
use std::net::IpAddr;
use std::time::Duration;

/// Endpoint configuration with builder pattern.
///
/// Use [`from_env`](Self::from_env) to start from compile-time defaults
/// with any environment overrides applied, or [`new`](Self::new) for the
/// bare defaults.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Listening port (0 = ephemeral)
    pub port: u16,
    /// Bind address
    pub address: IpAddr,
    /// Listen backlog
    pub backlog: u32,
    /// TCP_NODELAY on accepted sockets
    pub tcp_nodelay: bool,
    /// SO_LINGER on accepted sockets (None = kernel default)
    pub so_linger: Option<Duration>,
    /// Idle-connection timeout enforced by the poller scan (None = never)
    pub so_timeout: Option<Duration>,
    /// Budget for the first read before parking; enforced by handlers
    pub first_read_timeout: Duration,
    /// Worker thread cap (None = unbounded)
    pub max_threads: Option<usize>,
    /// Thread name prefix
    pub name: String,
    /// Maximum connections registered per poller
    pub poller_size: usize,
    /// Poll interval; bounds the destroy drain wait
    pub poll_time: Duration,
    /// Upper bound for one blocking selection
    pub selector_timeout: Duration,
    /// Poller thread count; held at 1 in this release
    pub poller_threads: usize,
    /// Acceptor thread count
    pub acceptor_threads: usize,
    /// Sendfile acceleration (no backend in this build)
    pub use_sendfile: bool,
    /// Honor comet registrations
    pub use_comet: bool,
    /// TLS settings; accepted but the handshake engine is not wired in
    pub tls: Option<TlsConfig>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl EndpointConfig {
    /// Bare compile-time defaults, no environment lookup.
    pub fn new() -> Self {
        Self {
            port: defaults::PORT,
            address: IpAddr::from([0, 0, 0, 0]),
            backlog: defaults::BACKLOG,
            tcp_nodelay: defaults::TCP_NODELAY,
            so_linger: Some(Duration::from_secs(defaults::SO_LINGER_SECS)),
            so_timeout: None,
            first_read_timeout: Duration::from_millis(defaults::FIRST_READ_TIMEOUT_MS),
            max_threads: Some(defaults::MAX_THREADS as usize),
            name: defaults::NAME.to_string(),
            poller_size: defaults::POLLER_SIZE,
            poll_time: Duration::from_micros(defaults::POLL_TIME_US),
            selector_timeout: Duration::from_millis(defaults::SELECTOR_TIMEOUT_MS),
            poller_threads: defaults::POLLER_THREADS,
            acceptor_threads: defaults::ACCEPTOR_THREADS,
            use_sendfile: defaults::USE_SENDFILE,
            use_comet: defaults::USE_COMET,
            tls: None,
        }
    }

    /// Defaults with `NMX_*` environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `NMX_PORT`, `NMX_ADDRESS`, `NMX_BACKLOG`
    /// - `NMX_TCP_NODELAY`, `NMX_SO_LINGER_SECS` (-1 disables linger)
    /// - `NMX_SO_TIMEOUT_MS` (0 disables the idle scan)
    /// - `NMX_FIRST_READ_TIMEOUT_MS`
    /// - `NMX_MAX_THREADS` (-1 = unbounded)
    /// - `NMX_NAME`
    /// - `NMX_POLLER_SIZE`, `NMX_POLL_TIME_US`, `NMX_SELECTOR_TIMEOUT_MS`
    /// - `NMX_ACCEPTOR_THREADS`
    /// - `NMX_USE_SENDFILE`, `NMX_USE_COMET`
    pub fn from_env() -> Self {
        let base = Self::new();

        let linger: i64 = env_get("NMX_SO_LINGER_SECS", defaults::SO_LINGER_SECS as i64);
        let so_timeout: u64 = env_get("NMX_SO_TIMEOUT_MS", defaults::SO_TIMEOUT_MS);
        let max_threads: i64 = env_get("NMX_MAX_THREADS", defaults::MAX_THREADS);

        Self {
            port: env_get("NMX_PORT", base.port),
            address: env_get_str("NMX_ADDRESS", "0.0.0.0")
                .parse()
                .unwrap_or(base.address),
            backlog: env_get("NMX_BACKLOG", base.backlog),
            tcp_nodelay: env_get_bool("NMX_TCP_NODELAY", base.tcp_nodelay),
            so_linger: if linger < 0 {
                None
            } else {
                Some(Duration::from_secs(linger as u64))
            },
            so_timeout: if so_timeout == 0 {
                None
            } else {
                Some(Duration::from_millis(so_timeout))
            },
            first_read_timeout: Duration::from_millis(env_get(
                "NMX_FIRST_READ_TIMEOUT_MS",
                defaults::FIRST_READ_TIMEOUT_MS,
            )),
            max_threads: if max_threads < 0 {
                None
            } else {
                Some(max_threads as usize)
            },
            name: env_get_str("NMX_NAME", &base.name),
            poller_size: env_get("NMX_POLLER_SIZE", base.poller_size),
            poll_time: Duration::from_micros(env_get("NMX_POLL_TIME_US", defaults::POLL_TIME_US)),
            selector_timeout: Duration::from_millis(env_get(
                "NMX_SELECTOR_TIMEOUT_MS",
                defaults::SELECTOR_TIMEOUT_MS,
            )),
            poller_threads: base.poller_threads,
            acceptor_threads: env_get("NMX_ACCEPTOR_THREADS", base.acceptor_threads),
            use_sendfile: env_get_bool("NMX_USE_SENDFILE", base.use_sendfile),
            use_comet: env_get_bool("NMX_USE_COMET", base.use_comet),
            tls: None,
        }
    }

    // Builder methods

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn address(mut self, address: IpAddr) -> Self {
        self.address = address;
        self
    }

    pub fn backlog(mut self, backlog: u32) -> Self {
        if backlog > 0 {
            self.backlog = backlog;
        }
        self
    }

    pub fn tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.tcp_nodelay = nodelay;
        self
    }

    pub fn so_linger(mut self, linger: Option<Duration>) -> Self {
        self.so_linger = linger;
        self
    }

    pub fn so_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.so_timeout = timeout;
        self
    }

    pub fn first_read_timeout(mut self, timeout: Duration) -> Self {
        self.first_read_timeout = timeout;
        self
    }

    pub fn max_threads(mut self, max: Option<usize>) -> Self {
        self.max_threads = max;
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn poller_size(mut self, size: usize) -> Self {
        self.poller_size = size;
        self
    }

    pub fn poll_time(mut self, d: Duration) -> Self {
        self.poll_time = d;
        self
    }

    pub fn selector_timeout(mut self, d: Duration) -> Self {
        self.selector_timeout = d;
        self
    }

    pub fn acceptor_threads(mut self, n: usize) -> Self {
        self.acceptor_threads = n;
        self
    }

    pub fn use_sendfile(mut self, enable: bool) -> Self {
        self.use_sendfile = enable;
        self
    }

    pub fn use_comet(mut self, enable: bool) -> Self {
        self.use_comet = enable;
        self
    }

    pub fn tls(mut self, tls: Option<TlsConfig>) -> Self {
        self.tls = tls;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> EndpointResult<()> {
        if self.backlog == 0 {
            return Err(EndpointError::InvalidConfig("backlog must be > 0"));
        }
        if self.poller_size == 0 {
            return Err(EndpointError::InvalidConfig("poller_size must be > 0"));
        }
        if self.acceptor_threads == 0 || self.acceptor_threads > 32 {
            return Err(EndpointError::InvalidConfig(
                "acceptor_threads must be in 1..=32",
            ));
        }
        if self.max_threads == Some(0) {
            return Err(EndpointError::InvalidConfig(
                "max_threads must be > 0 or unbounded",
            ));
        }
        if self.selector_timeout.is_zero() {
            return Err(EndpointError::InvalidConfig(
                "selector_timeout must be > 0",
            ));
        }
        if self.name.is_empty() {
            return Err(EndpointError::InvalidConfig("name must not be empty"));
        }
        if let Some(tls) = &self.tls {
            tls.validate()?;
        }
        Ok(())
    }
}

/// TLS settings for the endpoint.
///
/// The full surface is accepted and validated so embedders can carry
/// their configuration through, but no handshake engine is wired into
/// this build; [`Endpoint::init`](crate::Endpoint::init) reports the
/// listener as plaintext when any of this is set.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Engine selector ("off" disables; anything else names an engine)
    pub engine: String,
    /// Protocol selection, e.g. "all", "TLSv1.2"
    pub protocol: String,
    /// Cipher suite filter
    pub cipher_suite: String,
    /// Server certificate (PEM)
    pub certificate_file: Option<String>,
    /// Server private key (PEM)
    pub certificate_key_file: Option<String>,
    /// Intermediate chain
    pub certificate_chain_file: Option<String>,
    /// Trusted CA directory
    pub ca_certificate_path: Option<String>,
    /// Trusted CA bundle
    pub ca_certificate_file: Option<String>,
    /// Revocation list directory
    pub ca_revocation_path: Option<String>,
    /// Revocation list file
    pub ca_revocation_file: Option<String>,
    /// Client certificate verification mode
    pub verify_client: VerifyMode,
    /// Maximum verification chain depth
    pub verify_depth: u32,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            engine: "off".to_string(),
            protocol: "all".to_string(),
            cipher_suite: "ALL".to_string(),
            certificate_file: None,
            certificate_key_file: None,
            certificate_chain_file: None,
            ca_certificate_path: None,
            ca_certificate_file: None,
            ca_revocation_path: None,
            ca_revocation_file: None,
            verify_client: VerifyMode::None,
            verify_depth: 10,
        }
    }
}

impl TlsConfig {
    /// True when the engine selector actually asks for TLS.
    pub fn enabled(&self) -> bool {
        !self.engine.eq_ignore_ascii_case("off")
    }

    fn validate(&self) -> EndpointResult<()> {
        if self.enabled() && self.certificate_file.is_none() {
            return Err(EndpointError::InvalidConfig(
                "tls enabled without a certificate file",
            ));
        }
        if self.enabled() && self.certificate_key_file.is_none() {
            return Err(EndpointError::InvalidConfig(
                "tls enabled without a certificate key file",
            ));
        }
        Ok(())
    }
}

/// Client certificate verification mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    /// No client certificate requested
    None,
    /// Requested, connection proceeds without one
    Optional,
    /// Requested, connection fails without a valid one
    Required,
    /// Requested, accepted even without a known CA
    OptionalNoCa,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EndpointConfig::new();
        assert_eq!(config.backlog, 100);
        assert_eq!(config.max_threads, Some(40));
        assert_eq!(config.poller_size, 8192);
        assert_eq!(config.poller_threads, 1);
        assert_eq!(config.acceptor_threads, 1);
        assert!(config.so_timeout.is_none());
        assert!(config.use_comet);
        assert!(!config.use_sendfile);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = EndpointConfig::new()
            .port(8080)
            .max_threads(None)
            .so_timeout(Some(Duration::from_millis(200)))
            .name("edge");
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_threads, None);
        assert_eq!(config.so_timeout, Some(Duration::from_millis(200)));
        assert_eq!(config.name, "edge");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backlog_builder_ignores_zero() {
        let config = EndpointConfig::new().backlog(0);
        assert_eq!(config.backlog, 100);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(EndpointConfig::new()
            .max_threads(Some(0))
            .validate()
            .is_err());
        assert!(EndpointConfig::new().name("").validate().is_err());

        let mut config = EndpointConfig::new();
        config.acceptor_threads = 0;
        assert!(config.validate().is_err());

        config = EndpointConfig::new();
        config.poller_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tls_validation() {
        let tls = TlsConfig {
            engine: "on".to_string(),
            ..TlsConfig::default()
        };
        // Enabled without cert material
        assert!(EndpointConfig::new().tls(Some(tls.clone())).validate().is_err());

        let tls = TlsConfig {
            engine: "on".to_string(),
            certificate_file: Some("server.pem".to_string()),
            certificate_key_file: Some("server.key".to_string()),
            ..TlsConfig::default()
        };
        assert!(EndpointConfig::new().tls(Some(tls)).validate().is_ok());

        // "off" engine carries no requirements
        assert!(EndpointConfig::new()
            .tls(Some(TlsConfig::default()))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("__NMX_CFG_GUARD__", "1");
        std::env::set_var("NMX_BACKLOG", "17");
        std::env::set_var("NMX_MAX_THREADS", "-1");
        std::env::set_var("NMX_SO_TIMEOUT_MS", "250");
        let config = EndpointConfig::from_env();
        assert_eq!(config.backlog, 17);
        assert_eq!(config.max_threads, None);
        assert_eq!(config.so_timeout, Some(Duration::from_millis(250)));
        std::env::remove_var("NMX_BACKLOG");
        std::env::remove_var("NMX_MAX_THREADS");
        std::env::remove_var("NMX_SO_TIMEOUT_MS");
        std::env::remove_var("__NMX_CFG_GUARD__");
    }
}
