//! Server error types.

use thiserror::Error;

/// Errors raised while starting or running the HTTP listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or serving the listener failed.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The configured host is not an IP address.
    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),
    /// The Prometheus recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}
