//! Error types shared by every subsystem.
//!
//! Callers need to tell apart "the proxy or network failed" ([`Error::Dial`]),
//! "the server was too slow" ([`Error::Timeout`]) and "we gave up"
//! ([`Error::Cancelled`]), so these never collapse into one variant.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for connection establishment.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad configuration, raised before any network activity.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Proxy, transport or TLS failure while dialing.
    #[error(transparent)]
    Dial(#[from] DialError),

    /// The deadline elapsed with no result and no captured dial failure.
    #[error("timed out after {:.3}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The caller cancelled the wait.
    #[error("operation cancelled")]
    Cancelled,

    /// The server answered with something other than a usable greeting.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A background task panicked instead of returning.
    #[error("background task panicked")]
    TaskPanicked,

    /// The call does not fit the current phase of the connection attempt.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

/// Failure while opening the transport, directly or through a proxy.
///
/// Causes are reference counted so the same failure can be recorded in the
/// wait record and returned from the dial task.
#[derive(Debug, Clone, Error)]
pub enum DialError {
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("proxy handshake with {proxy} failed: {source}")]
    Proxy {
        proxy: String,
        #[source]
        source: Arc<tokio_socks::Error>,
    },

    #[error("TLS handshake with {server_name} failed: {source}")]
    Tls {
        server_name: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("invalid TLS server name {0:?}")]
    InvalidServerName(String),
}

impl DialError {
    pub(crate) fn connect(addr: impl Into<String>, source: std::io::Error) -> Self {
        DialError::Connect {
            addr: addr.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn proxy(proxy: impl Into<String>, source: tokio_socks::Error) -> Self {
        DialError::Proxy {
            proxy: proxy.into(),
            source: Arc::new(source),
        }
    }
}
