//! Error types for the fake server.

use std::time::Duration;

/// Errors surfaced by the fake server's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `listen_addr` is not a resolvable `host:port` pair.
    #[error("invalid listen address '{0}' (expected host:port)")]
    InvalidAddress(String),

    /// The listener could not be bound.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The readiness probe never saw the server answer.
    #[error("server at {url} not ready after {attempts} probe attempts")]
    NotReady { url: String, attempts: u32 },

    /// A driver operation ran before `start`.
    #[error("server not started")]
    NotStarted,

    /// Fewer requests arrived than the driver waited for.
    #[error("timeout waiting for request: got {received} of {expected} within {timeout:?}")]
    RequestTimeout {
        received: usize,
        expected: usize,
        timeout: Duration,
    },

    /// Config file could not be parsed.
    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for fake server operations.
pub type Result<T> = std::result::Result<T, Error>;
