//! # Engine Trait
//!
//! Seam between the session manager and the GraphQL execution engine.
//! Parsing, validation and execution live behind [`GraphQlEngine`]; the
//! server only frames what the engine produces.
//!
//! A query or mutation yields [`Execution::Single`]; a subscription yields
//! [`Execution::Stream`], a boxed [`Stream`] polled by the operation runner
//! until it ends or the operation is cancelled. Dropping the stream is how
//! the engine learns that nobody is listening any more.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use gqlws_core::{ConnectionId, GraphQlError, GraphQlRequest, GraphQlResponse, ProtocolVariant};
use parking_lot::Mutex;
use serde_json::{Map, Value};

/// Boxed stream of responses returned by [`Execution::Stream`].
pub type ResponseStream = Pin<Box<dyn Stream<Item = GraphQlResponse> + Send>>;

/// Errors that stop an operation before it produces any response.
///
/// Field-level errors belong in [`GraphQlResponse::errors`] instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The request failed parsing or validation.
    #[error("request failed: {}", join_messages(.0))]
    Request(Vec<GraphQlError>),

    /// The connection hook refused the client.
    #[error("connection rejected: {0}")]
    Rejected(String),

    /// Engine-internal failure.
    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    /// Convenience constructor for a single-message request error.
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request(vec![GraphQlError::new(message)])
    }

    /// Errors to put in the `error` packet payload.
    pub fn into_graphql_errors(self) -> Vec<GraphQlError> {
        match self {
            Self::Request(errors) => errors,
            Self::Rejected(message) | Self::Internal(message) => vec![GraphQlError::new(message)],
        }
    }
}

fn join_messages(errors: &[GraphQlError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// What an engine produced for a request.
pub enum Execution {
    /// One response (query, mutation).
    Single(GraphQlResponse),
    /// A sequence of responses (subscription).
    Stream(ResponseStream),
}

impl Execution {
    /// View either shape as a stream.
    pub fn into_stream(self) -> ResponseStream {
        match self {
            Self::Single(response) => Box::pin(futures::stream::once(async move { response })),
            Self::Stream(stream) => stream,
        }
    }
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(response) => f.debug_tuple("Single").field(response).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Ambient data handed to the engine with every request.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    /// Connection the operation arrived on.
    pub connection_id: ConnectionId,
    /// Client-chosen operation ID.
    pub operation_id: String,
    /// Vocabulary the operation was started with.
    pub variant: ProtocolVariant,
    /// `connection_init` payload.
    pub connection_params: Option<Value>,
    /// Per-connection scratch map shared by all operations of the connection.
    pub locals: Arc<Mutex<Map<String, Value>>>,
}

/// A GraphQL execution engine.
#[async_trait]
pub trait GraphQlEngine: Send + Sync {
    /// Execute one request.
    async fn execute(
        &self,
        request: GraphQlRequest,
        context: ExecutionContext,
    ) -> Result<Execution, EngineError>;

    /// Inspect the `connection_init` payload.
    ///
    /// `Ok(payload)` accepts the connection and becomes the `connection_ack`
    /// payload; `Err` closes the connection with 4403.
    async fn on_connect(&self, _params: Option<&Value>) -> Result<Option<Value>, EngineError> {
        Ok(None)
    }
}
