//! Graceful shutdown: stop accepting upgrades, close live sessions with 1001,
//! and wait for them to drain.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::websocket::registry::ConnectionRegistry;

/// How long to wait for sessions to drain when no timeout is given.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// How often the drain loop re-checks the registry.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Owns the server-wide cancellation token.
///
/// Every session loop selects on a clone of [`ShutdownCoordinator::token`];
/// the HTTP listener stops accepting once it fires.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator whose token is not yet cancelled.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Token sessions and the listener watch.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown, then wait up to `timeout` for the listener task to
    /// stop and every registered connection to leave `registry`.
    ///
    /// Returns `true` when everything drained in time.
    pub async fn graceful_shutdown(
        &self,
        listener: JoinHandle<()>,
        registry: &ConnectionRegistry,
        timeout: Option<Duration>,
    ) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();
        info!(
            connections = registry.connection_count(),
            timeout_ms = timeout.as_millis() as u64,
            "draining connections"
        );

        let drain = async {
            let _ = listener.await;
            while registry.connection_count() > 0 {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                remaining = registry.connection_count(),
                "shutdown timed out with connections still open"
            );
            return false;
        }
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gqlws_core::ConnectionId;

    use super::*;
    use crate::websocket::session::Session;

    fn register(registry: &ConnectionRegistry, id: &str) {
        registry.add(ConnectionId::from(id), Arc::new(Session::new()));
    }

    #[test]
    fn session_tokens_follow_shutdown() {
        let coord = ShutdownCoordinator::default();
        let session_token = coord.token().child_token();
        assert!(!coord.is_shutting_down());
        coord.shutdown();
        coord.shutdown();
        assert!(session_token.is_cancelled());
    }

    #[tokio::test]
    async fn drains_once_sessions_leave_registry() {
        let coord = ShutdownCoordinator::new();
        let registry = Arc::new(ConnectionRegistry::new());
        register(&registry, "c1");

        // Stands in for a session loop that closes with 1001 and deregisters.
        let token = coord.token();
        let session_registry = registry.clone();
        let _session = tokio::spawn(async move {
            token.cancelled().await;
            let _ = session_registry.remove(&ConnectionId::from("c1"));
        });
        let listener = tokio::spawn(async {});

        assert!(coord.graceful_shutdown(listener, &registry, None).await);
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_a_connection_lingers() {
        let coord = ShutdownCoordinator::new();
        let registry = ConnectionRegistry::new();
        register(&registry, "stuck");
        let listener = tokio::spawn(async {});

        let drained = coord
            .graceful_shutdown(listener, &registry, Some(Duration::from_millis(100)))
            .await;
        assert!(!drained);
        assert!(coord.is_shutting_down());
    }
}
