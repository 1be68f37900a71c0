//! Protocol dispatcher: routes decoded packets by type and session state.
//!
//! One dispatcher serves both vocabularies. The packet type the client used
//! picks the [`ProtocolVariant`] of the operation, and every reply for that
//! operation uses the same vocabulary.
//!
//! | State        | Packet                    | Effect                                   |
//! |--------------|---------------------------|------------------------------------------|
//! | AwaitingInit | `connection_init`         | engine hook, `connection_ack`, Ready     |
//! | Ready        | `connection_init`         | close 4429                               |
//! | any          | `ping`                    | `pong` echoing id and payload            |
//! | any          | `pong`                    | nothing                                  |
//! | AwaitingInit | `subscribe` / `start`     | close 4401                               |
//! | Ready        | `subscribe` / `start`     | 4400 / 4409 checks, then spawn a runner  |
//! | any          | `complete`                | cancel, wait for the runner to exit      |
//! | any          | `stop`                    | cancel, wait, then close 1000            |
//! | any          | `connection_terminate`    | close 1000                               |
//! | any          | server-only types         | close 4400 `Unexpected packet type`      |
//!
//! A started ID stays reserved until its runner has queued its final packet,
//! so a client that reuses an ID right after `complete` never sees the new
//! operation's results ahead of the old operation's `complete`.

use std::collections::HashMap;
use std::sync::Arc;

use gqlws_core::{CloseFrame, GraphQlRequest, Packet, PacketType};
use metrics::counter;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::connection::Connection;
use super::runner::{Operation, spawn_operation};
use super::session::Session;
use crate::engine::{ExecutionContext, GraphQlEngine};
use crate::metrics::{PACKETS_RECEIVED_TOTAL, SUBSCRIPTIONS_TOTAL};

/// Dispatcher state, derived from the session's init flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatcherState {
    /// Waiting for `connection_init`.
    AwaitingInit,
    /// Handshake done; operations accepted.
    Ready,
}

/// What the session loop should do after a packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading.
    Continue,
    /// Send this close frame and stop reading.
    Close(CloseFrame),
}

/// Per-connection packet router.
pub struct Dispatcher {
    connection: Arc<Connection>,
    session: Arc<Session>,
    engine: Arc<dyn GraphQlEngine>,
    connection_params: Option<Value>,
    locals: Arc<Mutex<Map<String, Value>>>,
    /// `exited` tokens of runners this dispatcher started, by operation ID.
    runners: HashMap<String, CancellationToken>,
}

impl Dispatcher {
    /// Create a dispatcher for one connection.
    pub fn new(
        connection: Arc<Connection>,
        session: Arc<Session>,
        engine: Arc<dyn GraphQlEngine>,
    ) -> Self {
        Self {
            connection,
            session,
            engine,
            connection_params: None,
            locals: Arc::new(Mutex::new(Map::new())),
            runners: HashMap::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> DispatcherState {
        if self.session.is_initialized() {
            DispatcherState::Ready
        } else {
            DispatcherState::AwaitingInit
        }
    }

    /// Decode one frame and dispatch it. Undecodable frames close with 4400.
    pub async fn dispatch_frame(&mut self, bytes: &[u8]) -> Flow {
        match Packet::decode(bytes) {
            Ok(packet) => self.dispatch(packet).await,
            Err(error) => {
                debug!(%error, "undecodable frame");
                Flow::Close(CloseFrame::bad_request(error.to_string()))
            }
        }
    }

    /// Dispatch one decoded packet.
    pub async fn dispatch(&mut self, packet: Packet) -> Flow {
        counter!(PACKETS_RECEIVED_TOTAL, "type" => packet.kind.label()).increment(1);
        trace!(kind = packet.kind.label(), state = ?self.state(), "dispatching packet");
        match packet.kind {
            PacketType::ConnectionInit => self.on_init(packet.payload).await,
            PacketType::Ping => {
                let _ = self.connection.send(Packet::pong_for(&packet)).await;
                Flow::Continue
            }
            PacketType::Pong => Flow::Continue,
            PacketType::Subscribe | PacketType::Start => self.on_subscribe(packet).await,
            PacketType::Complete => self.on_cancel(packet.id.as_deref(), false).await,
            PacketType::Stop => self.on_cancel(packet.id.as_deref(), true).await,
            PacketType::ConnectionTerminate => Flow::Close(CloseFrame::normal()),
            PacketType::ConnectionAck
            | PacketType::ConnectionError
            | PacketType::KeepAlive
            | PacketType::Next
            | PacketType::Data
            | PacketType::Error => Flow::Close(CloseFrame::unexpected_type(packet.kind.label())),
        }
    }

    async fn on_init(&mut self, params: Option<Value>) -> Flow {
        if self.state() == DispatcherState::Ready {
            return Flow::Close(CloseFrame::too_many_init_requests());
        }
        let ack = match self.engine.on_connect(params.as_ref()).await {
            Ok(ack) => ack,
            Err(error) => {
                info!(connection_id = %self.connection.id, %error, "connection refused");
                return Flow::Close(CloseFrame::forbidden());
            }
        };
        if !self.session.try_initialize() {
            return Flow::Close(CloseFrame::too_many_init_requests());
        }
        self.connection_params = params;
        let _ = self.connection.send(Packet::connection_ack(ack)).await;
        debug!(connection_id = %self.connection.id, "connection acknowledged");
        Flow::Continue
    }

    async fn on_subscribe(&mut self, packet: Packet) -> Flow {
        if self.state() == DispatcherState::AwaitingInit {
            return Flow::Close(CloseFrame::unauthorized());
        }
        let variant = packet.kind.variant().unwrap_or_default();
        let Some(id) = packet.id else {
            return Flow::Close(CloseFrame::id_required());
        };
        let request = match GraphQlRequest::from_payload(packet.payload.as_ref()) {
            Ok(request) => request,
            Err(reason) => {
                return Flow::Close(CloseFrame::bad_request(format!(
                    "Invalid subscribe payload: {reason}"
                )));
            }
        };
        if self.session.is_live(&id) {
            return Flow::Close(CloseFrame::subscriber_exists(&id));
        }
        self.wait_for_runner(&id).await;
        let Some(handle) = self.session.register_subscription(&id) else {
            return Flow::Close(CloseFrame::subscriber_exists(&id));
        };
        self.runners.retain(|_, exited| !exited.is_cancelled());
        let _ = self.runners.insert(id.clone(), handle.exited.clone());

        counter!(SUBSCRIPTIONS_TOTAL, "variant" => variant.subprotocol()).increment(1);
        debug!(connection_id = %self.connection.id, operation_id = %id, ?variant, "operation started");
        let context = ExecutionContext {
            connection_id: self.connection.id.clone(),
            operation_id: id,
            variant,
            connection_params: self.connection_params.clone(),
            locals: self.locals.clone(),
        };
        // Detached: the runner removes its own entry and the session token
        // reaches it on teardown.
        drop(spawn_operation(
            Operation {
                handle,
                request,
                variant,
                context,
            },
            self.engine.clone(),
            self.session.clone(),
            self.connection.clone(),
        ));
        Flow::Continue
    }

    async fn on_cancel(&mut self, id: Option<&str>, close_after: bool) -> Flow {
        let Some(id) = id else {
            return Flow::Close(CloseFrame::id_required());
        };
        if self.session.cancel(id) {
            debug!(connection_id = %self.connection.id, operation_id = %id, "operation cancelled by client");
        }
        self.wait_for_runner(id).await;
        if close_after {
            Flow::Close(CloseFrame::normal())
        } else {
            Flow::Continue
        }
    }

    /// Wait until the last runner started for `id` has queued its final
    /// packet. Returns at once when `id` was never started here. Runners
    /// leave promptly once cancelled or out of the registry.
    async fn wait_for_runner(&mut self, id: &str) {
        if let Some(exited) = self.runners.remove(id) {
            exited.cancelled().await;
        }
    }
}
