//! `GqlwsServer`: Axum HTTP + `WebSocket` server.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use gqlws_core::ProtocolVariant;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::engine::GraphQlEngine;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::metrics::{WS_CONNECTIONS_REJECTED_TOTAL, render};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::handler::serve_socket;
use crate::websocket::registry::ConnectionRegistry;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Engine executing operations.
    pub engine: Arc<dyn GraphQlEngine>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Live connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// One permit per allowed connection; a session holds its permit until
    /// it ends.
    pub slots: Arc<Semaphore>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The GraphQL subscription server.
pub struct GqlwsServer {
    config: Arc<ServerConfig>,
    engine: Arc<dyn GraphQlEngine>,
    registry: Arc<ConnectionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    slots: Arc<Semaphore>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl GqlwsServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, engine: Arc<dyn GraphQlEngine>) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(config.max_connections)),
            config: Arc::new(config),
            engine,
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from this Prometheus handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            engine: self.engine.clone(),
            config: self.config.clone(),
            registry: self.registry.clone(),
            shutdown: self.shutdown.clone(),
            slots: self.slots.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route(&self.config.path, get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    /// The task ends once [`ShutdownCoordinator::shutdown`] is called and
    /// in-flight HTTP requests finish.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let ip: IpAddr = self
            .config
            .host
            .parse()
            .map_err(|_| ServerError::InvalidAddress(self.config.host.clone()))?;
        let listener = tokio::net::TcpListener::bind(SocketAddr::new(ip, self.config.port)).await?;
        let local_addr = listener.local_addr()?;

        info!(%local_addr, path = %self.config.path, "gqlws server started");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                warn!(error = %e, "server stopped with error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET `<path>`: `WebSocket` upgrade.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let permit = if state.shutdown.is_shutting_down() {
        None
    } else {
        state.slots.clone().try_acquire_owned().ok()
    };
    let Some(permit) = permit else {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(
            connections = state.registry.connection_count(),
            "rejecting WebSocket upgrade"
        );
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let AppState {
        engine,
        config,
        registry,
        shutdown,
        ..
    } = state;
    let max_message_size = config.max_message_size;
    ws.protocols(ProtocolVariant::SUBPROTOCOLS)
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| async move {
            serve_socket(socket, engine, config, registry, shutdown.token()).await;
            drop(permit);
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        &state.registry,
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
