//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

use crate::websocket::registry::ConnectionRegistry;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while serving, `"shutting_down"` once shutdown has begun.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open `WebSocket` connections.
    pub connections: usize,
    /// Live operations across all connections.
    pub active_subscriptions: usize,
}

/// Snapshot the registry into a health response.
pub fn health_check(
    start_time: Instant,
    registry: &ConnectionRegistry,
    shutting_down: bool,
) -> HealthResponse {
    HealthResponse {
        status: if shutting_down { "shutting_down" } else { "ok" },
        uptime_secs: start_time.elapsed().as_secs(),
        connections: registry.connection_count(),
        active_subscriptions: registry.subscription_count(),
    }
}
