//! Error types for tunkeeper-core

use thiserror::Error;

/// Errors raised while building session parameters or reading a server directory.
///
/// These are reported to the status sink before any worker exists and are not
/// retried without caller correction.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Bad port: {0:?} (expected an integer in 1-65535)")]
    InvalidPort(String),

    #[error("Server address is empty")]
    EmptyAddress,

    #[error("Shared secret is empty")]
    EmptySecret,

    #[error("Malformed server directory: {0}")]
    Directory(#[from] serde_json::Error),

    #[error("Server directory has no entries")]
    EmptyDirectory,

    #[error("Server not found in directory: {0}")]
    UnknownServer(String),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors a session worker can end with.
///
/// Every variant is routed through the manager's disconnect path; none of
/// them ever reaches the caller of `start` or `stop`.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to reach server: {0}")]
    Connect(#[source] std::io::Error),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Tunnel dropped: {0}")]
    Dropped(String),

    #[error("Worker was interrupted")]
    Interrupted,

    #[error("Worker panicked: {0}")]
    Panicked(String),
}

impl WorkerError {
    /// Whether this ending was caused by the manager rather than the peer.
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Failure to release a tunnel handle. Only ever logged.
#[derive(Error, Debug)]
#[error("Closing tunnel {tunnel} failed: {source}")]
pub struct TeardownError {
    pub tunnel: String,
    #[source]
    pub source: std::io::Error,
}
