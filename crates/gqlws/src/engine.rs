//! Built-in loop-back engine.
//!
//! Lets the binary run without a schema: plain operations echo their request
//! back, and any document starting with `subscription` ticks a counter once
//! per second until the client stops it.

use std::time::Duration;

use async_trait::async_trait;
use gqlws_core::{GraphQlRequest, GraphQlResponse};
use gqlws_server::{EngineError, Execution, ExecutionContext, GraphQlEngine};
use serde_json::json;

/// Echo/ticker engine.
pub struct LoopbackEngine {
    tick: Duration,
}

impl LoopbackEngine {
    /// Create an engine whose subscriptions tick every `tick`.
    pub fn new(tick: Duration) -> Self {
        Self { tick }
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl GraphQlEngine for LoopbackEngine {
    async fn execute(
        &self,
        request: GraphQlRequest,
        context: ExecutionContext,
    ) -> Result<Execution, EngineError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(EngineError::request("Must provide query string."));
        }
        if !query.starts_with("subscription") {
            return Ok(Execution::Single(GraphQlResponse::data(json!({
                "echo": request.query,
                "operationName": request.operation_name,
                "variables": request.variables,
            }))));
        }

        let tick = self.tick;
        let operation_id = context.operation_id;
        Ok(Execution::Stream(Box::pin(async_stream::stream! {
            let mut interval = tokio::time::interval(tick);
            let mut counter = 0u64;
            loop {
                let _ = interval.tick().await;
                counter += 1;
                yield GraphQlResponse::data(json!({
                    "counter": counter,
                    "operationId": operation_id,
                }));
            }
        })))
    }
}
