//! Server error types
//!
//! Only lifecycle operations fail with a `ServerError`. Evaluation problems
//! are never errors at this level: they become `eval_result` frames.

use std::io;
use std::net::SocketAddr;

/// Error starting or configuring the server
#[derive(Debug)]
pub enum ServerError {
    /// The listening socket could not be bound (port in use, permissions)
    Bind { addr: SocketAddr, source: io::Error },
    /// A socket option could not be applied after binding
    Socket(io::Error),
    /// Configuration could not be read or parsed
    Config(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Bind { addr, source } => {
                write!(f, "failed to bind {}: {}", addr, source)
            }
            ServerError::Socket(e) => write!(f, "socket error: {}", e),
            ServerError::Config(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Bind { source, .. } => Some(source),
            ServerError::Socket(e) => Some(e),
            ServerError::Config(_) => None,
        }
    }
}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        ServerError::Socket(e)
    }
}
