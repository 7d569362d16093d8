//! Server configuration
//!
//! Every field is optional when loaded from a document; missing fields fall
//! back to the defaults below.
//!
//! | Field | Default | Description |
//! |-------|---------|-------------|
//! | `port` | `8172` | TCP port bound on the loopback interface |
//! | `timeout` | `0` | Accept wait in seconds; `0` is fully non-blocking |
//! | `greeting` | `UE4SS REPL ready!` | Message sent in the `connected` frame |
//! | `max_line_bytes` | `1048576` | Longest request line accepted |
//!
//! ## Example
//!
//! ```toml
//! port = 9000
//! timeout = 0.05
//! ```

use crate::error::ServerError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default port, kept for compatibility with existing consoles
pub const DEFAULT_PORT: u16 = 8172;

/// Greeting existing consoles wait for before sending requests
pub const DEFAULT_GREETING: &str = "UE4SS REPL ready!";

// Maximum bytes buffered for a single request line
const DEFAULT_MAX_LINE_BYTES: usize = 1_048_576;

/// Configuration supplied to `start`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Port to bind on 127.0.0.1 (0 = OS-assigned)
    pub port: u16,
    /// Accept timeout in seconds; 0 means a single non-blocking attempt
    pub timeout: f64,
    /// Message sent to a client right after it is accepted
    pub greeting: String,
    /// Upper bound on a buffered request line
    pub max_line_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: 0.0,
            greeting: DEFAULT_GREETING.to_string(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.as_secs_f64();
        self
    }

    /// Accept timeout as a `Duration`
    ///
    /// Negative, NaN and infinite values collapse to zero (non-blocking).
    pub fn timeout(&self) -> Duration {
        if self.timeout.is_finite() && self.timeout > 0.0 {
            Duration::from_secs_f64(self.timeout)
        } else {
            Duration::ZERO
        }
    }

    /// Parse a TOML document, merging it over the defaults
    pub fn from_toml_str(source: &str) -> Result<Self, ServerError> {
        toml::from_str(source).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Load a TOML configuration file
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }
}
