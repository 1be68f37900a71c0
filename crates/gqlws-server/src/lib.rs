//! # gqlws-server
//!
//! GraphQL subscriptions over `WebSocket`, served by Axum.
//!
//! - Session loop: handshake, init timeout, keep-alive, ordered dispatch
//! - One dispatcher for the current and legacy packet vocabularies
//! - One task per operation, cancelled through a `CancellationToken` tree
//! - HTTP endpoints: `WebSocket` upgrade, `/health`, `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod engine;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use engine::{EngineError, Execution, ExecutionContext, GraphQlEngine, ResponseStream};
pub use errors::ServerError;
pub use server::GqlwsServer;
