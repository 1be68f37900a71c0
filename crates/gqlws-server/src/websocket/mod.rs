//! `WebSocket` session management.

pub mod connection;
pub mod dispatcher;
pub mod handler;
pub mod heartbeat;
pub mod registry;
pub mod runner;
pub mod session;
