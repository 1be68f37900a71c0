//! Operation runner: one task per started operation.
//!
//! The runner is the only writer of `next`/`data` and `complete` packets for
//! its ID. That makes "at most one `complete`" a local property: whichever of
//! natural end and cancellation wins, the runner leaves its loop once and
//! sends one `complete` on the way out.

use std::sync::Arc;

use futures::StreamExt;
use gqlws_core::{GraphQlRequest, ProtocolVariant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::connection::Connection;
use super::session::{Session, SubscriptionHandle};
use crate::engine::{ExecutionContext, GraphQlEngine, ResponseStream};

/// How an operation task ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The response sequence ended; `complete` was sent.
    Completed,
    /// The handle was cancelled; `complete` was sent (if the socket allowed).
    Cancelled,
    /// The engine refused the request; one `error` packet was sent.
    Failed,
    /// The socket went away mid-stream; nothing more was sent.
    Disconnected,
}

/// Everything one operation task needs.
pub struct Operation {
    /// Registry handle for this operation.
    pub handle: SubscriptionHandle,
    /// Parsed request.
    pub request: GraphQlRequest,
    /// Vocabulary replies are labelled with.
    pub variant: ProtocolVariant,
    /// Context handed to the engine.
    pub context: ExecutionContext,
}

/// Spawn the task driving `operation`.
pub fn spawn_operation(
    operation: Operation,
    engine: Arc<dyn GraphQlEngine>,
    session: Arc<Session>,
    connection: Arc<Connection>,
) -> JoinHandle<RunOutcome> {
    tokio::spawn(async move {
        let id = operation.handle.id.clone();
        let _exited = operation.handle.exited.clone().drop_guard();
        let outcome = run_operation(operation, engine.as_ref(), &session, &connection).await;
        debug!(connection_id = %connection.id, operation_id = %id, ?outcome, "operation finished");
        outcome
    })
}

async fn run_operation(
    operation: Operation,
    engine: &dyn GraphQlEngine,
    session: &Session,
    connection: &Connection,
) -> RunOutcome {
    let Operation {
        handle,
        request,
        variant,
        context,
    } = operation;
    let token = handle.token.clone();

    let execution = tokio::select! {
        biased;
        () = token.cancelled() => None,
        result = engine.execute(request, context) => Some(result),
    };

    let outcome = match execution {
        None => RunOutcome::Cancelled,
        Some(Err(error)) => {
            warn!(operation_id = %handle.id, %error, "engine refused operation");
            let _ = session.complete(&handle.id, handle.generation);
            let errors = error.into_graphql_errors();
            let _ = connection.send(variant.error(&handle.id, &errors)).await;
            return RunOutcome::Failed;
        }
        Some(Ok(execution)) => forward(execution.into_stream(), &handle, variant, connection).await,
    };

    // Leave the registry before `complete` goes out so a client that reuses
    // the ID right after seeing `complete` is not told it already exists.
    let _ = session.complete(&handle.id, handle.generation);
    if outcome != RunOutcome::Disconnected {
        let _ = connection.send(variant.complete(&handle.id)).await;
    }
    outcome
}

/// Forward each response as `next`/`data` until the stream ends, the handle
/// is cancelled, or the socket goes away. The stream is dropped on return.
async fn forward(
    mut stream: ResponseStream,
    handle: &SubscriptionHandle,
    variant: ProtocolVariant,
    connection: &Connection,
) -> RunOutcome {
    let token = &handle.token;
    loop {
        let next = tokio::select! {
            biased;
            () = token.cancelled() => return RunOutcome::Cancelled,
            next = stream.next() => next,
        };
        let Some(response) = next else {
            return RunOutcome::Completed;
        };
        let packet = variant.next(&handle.id, &response);
        let sent = tokio::select! {
            biased;
            () = token.cancelled() => return RunOutcome::Cancelled,
            sent = connection.send(packet) => sent,
        };
        if !sent {
            return RunOutcome::Disconnected;
        }
    }
}
