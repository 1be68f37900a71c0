//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a settings file may specify any subset of fields.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 8080, "path": "/subscriptions" },
///   "protocol": { "connectionInitWaitTimeoutMs": 5000 },
///   "logging": { "level": "debug", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GqlwsSettings {
    /// Network settings.
    pub server: ServerSettings,
    /// Subscription protocol timing and buffering.
    pub protocol: ProtocolSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl GqlwsSettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if !self.server.path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "server.path must start with '/': {}",
                self.server.path
            )));
        }
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be at least 1".into(),
            ));
        }
        if self.protocol.outbound_buffer_size == 0 {
            return Err(SettingsError::InvalidValue(
                "protocol.outboundBufferSize must be at least 1".into(),
            ));
        }
        let keep_alive = self.protocol.keep_alive_interval_ms;
        if keep_alive > 0 && self.protocol.keep_alive_timeout_ms < keep_alive {
            return Err(SettingsError::InvalidValue(format!(
                "protocol.keepAliveTimeoutMs ({}) must not be shorter than keepAliveIntervalMs ({keep_alive})",
                self.protocol.keep_alive_timeout_ms
            )));
        }
        Ok(())
    }
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` to auto-assign).
    pub port: u16,
    /// HTTP path of the WebSocket endpoint.
    pub path: String,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            path: "/graphql".to_string(),
            max_connections: 1024,
            max_message_size: 1024 * 1024,
        }
    }
}

/// Subscription protocol settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtocolSettings {
    /// How long a client may wait before sending `connection_init`.
    /// `0` disables the timeout.
    pub connection_init_wait_timeout_ms: u64,
    /// Interval between server keep-alive packets. `0` disables keep-alive.
    pub keep_alive_interval_ms: u64,
    /// Close the connection after this long without inbound traffic.
    pub keep_alive_timeout_ms: u64,
    /// Outbound packet queue length per connection.
    pub outbound_buffer_size: usize,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            connection_init_wait_timeout_ms: 3_000,
            keep_alive_interval_ms: 12_000,
            keep_alive_timeout_ms: 60_000,
            outbound_buffer_size: 256,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (overridden by `RUST_LOG`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
