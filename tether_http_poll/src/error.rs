//! Error types for the HTTP poll transport.

use thiserror::Error;

/// Problem with the transport configuration string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The base target URI is empty.
    #[error("transport target URI is empty")]
    EmptyUri,
}

/// Errors from the transport lifecycle.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The configuration string could not be used.
    #[error("invalid transport configuration: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built.
    #[error("HTTP client setup failed: {0}")]
    HttpClient(String),

    /// `start` was called on a transport that is already running.
    #[error("transport already running")]
    AlreadyRunning,
}
