//! Server configuration.

use std::time::Duration;

use gqlws_settings::GqlwsSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the gqlws server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// HTTP path of the `WebSocket` endpoint.
    pub path: String,
    /// Maximum concurrent `WebSocket` connections.
    pub max_connections: usize,
    /// Max `WebSocket` message size in bytes.
    pub max_message_size: usize,
    /// Wait for `connection_init` in milliseconds (`0` disables).
    pub init_timeout_ms: u64,
    /// Keep-alive interval in milliseconds (`0` disables).
    pub keep_alive_interval_ms: u64,
    /// Close after this long without inbound traffic, in milliseconds.
    pub keep_alive_timeout_ms: u64,
    /// Outbound packet queue length per connection.
    pub outbound_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            path: "/graphql".into(),
            max_connections: 1024,
            max_message_size: 1024 * 1024, // 1 MB
            init_timeout_ms: 3_000,
            keep_alive_interval_ms: 12_000,
            keep_alive_timeout_ms: 60_000,
            outbound_buffer_size: 256,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &GqlwsSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            path: settings.server.path.clone(),
            max_connections: settings.server.max_connections,
            max_message_size: settings.server.max_message_size,
            init_timeout_ms: settings.protocol.connection_init_wait_timeout_ms,
            keep_alive_interval_ms: settings.protocol.keep_alive_interval_ms,
            keep_alive_timeout_ms: settings.protocol.keep_alive_timeout_ms,
            outbound_buffer_size: settings.protocol.outbound_buffer_size,
        }
    }

    /// Init timeout, or `None` when disabled.
    pub fn init_timeout(&self) -> Option<Duration> {
        non_zero_ms(self.init_timeout_ms)
    }

    /// Keep-alive interval, or `None` when disabled.
    pub fn keep_alive_interval(&self) -> Option<Duration> {
        non_zero_ms(self.keep_alive_interval_ms)
    }

    /// Inbound silence tolerated before closing with 4504.
    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_millis(self.keep_alive_timeout_ms)
    }
}

fn non_zero_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_zero() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.path, "/graphql");
    }

    #[test]
    fn durations() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.init_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(cfg.keep_alive_interval(), Some(Duration::from_secs(12)));
        assert_eq!(cfg.keep_alive_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn zero_disables_timers() {
        let cfg = ServerConfig {
            init_timeout_ms: 0,
            keep_alive_interval_ms: 0,
            ..ServerConfig::default()
        };
        assert!(cfg.init_timeout().is_none());
        assert!(cfg.keep_alive_interval().is_none());
    }

    #[test]
    fn from_settings_copies_fields() {
        let mut settings = GqlwsSettings::default();
        settings.server.port = 8080;
        settings.server.path = "/subscriptions".into();
        settings.protocol.connection_init_wait_timeout_ms = 500;
        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.path, "/subscriptions");
        assert_eq!(cfg.init_timeout_ms, 500);
        assert_eq!(cfg.outbound_buffer_size, settings.protocol.outbound_buffer_size);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.max_connections, cfg.max_connections);
        assert_eq!(back.keep_alive_timeout_ms, cfg.keep_alive_timeout_ms);
    }
}
