//! `WebSocket` session lifecycle: handles a single connected client from
//! upgrade through disconnect.
//!
//! [`run_session`] is transport-agnostic: it consumes an ordered stream of
//! [`Inbound`] frames and writes through the connection's outbound queue.
//! [`serve_socket`] adapts an Axum [`WebSocket`] to it and owns the writer
//! task that turns [`Outbound`] items into frames.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{self, Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, Stream, StreamExt};
use gqlws_core::{CloseFrame, ConnectionId, ProtocolVariant};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::{Connection, Outbound};
use super::dispatcher::{Dispatcher, Flow};
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::registry::ConnectionRegistry;
use super::session::Session;
use crate::config::ServerConfig;
use crate::engine::GraphQlEngine;
use crate::metrics::{
    PROTOCOL_VIOLATIONS_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// How long the writer may take to flush a queued close frame.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// One inbound transport event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Text frame.
    Text(String),
    /// Binary frame (UTF-8 JSON is accepted).
    Binary(Vec<u8>),
    /// Transport-level ping/pong: proves liveness, carries no packet.
    Alive,
    /// The peer closed the socket or the transport failed.
    Closed,
}

/// Timer settings for one session.
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    /// Deadline for `connection_init`; `None` waits forever.
    pub init_timeout: Option<Duration>,
    /// Keep-alive period; `None` disables keep-alive.
    pub keep_alive_interval: Option<Duration>,
    /// Inbound silence tolerated before closing with 4504.
    pub keep_alive_timeout: Duration,
}

impl SessionOptions {
    /// Derive from server configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            init_timeout: config.init_timeout(),
            keep_alive_interval: config.keep_alive_interval(),
            keep_alive_timeout: config.keep_alive_timeout(),
        }
    }
}

/// How a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionEnd {
    /// Close frame the server sent, or `None` if the peer went away first.
    pub close: Option<CloseFrame>,
    /// Operations still live at teardown.
    pub cancelled_operations: usize,
}

/// Run the protocol for one connection until it closes.
///
/// 1. Arms the `connection_init` timer (4408 when it fires before the ack)
/// 2. Sends keep-alives and closes with 4504 on inbound silence
/// 3. Dispatches inbound frames strictly in arrival order
/// 4. Closes with 1001 when `shutdown` fires
/// 5. Queues the close frame, then cancels every live operation
#[instrument(skip_all, fields(connection_id = %connection.id))]
pub async fn run_session<S>(
    mut inbound: S,
    connection: Arc<Connection>,
    session: Arc<Session>,
    engine: Arc<dyn GraphQlEngine>,
    options: SessionOptions,
    shutdown: CancellationToken,
) -> SessionEnd
where
    S: Stream<Item = Inbound> + Unpin + Send,
{
    let mut dispatcher = Dispatcher::new(connection.clone(), session.clone(), engine);

    let heartbeat_conn = connection.clone();
    let heartbeat_cancel = shutdown.child_token();
    let heartbeat = async move {
        match options.keep_alive_interval {
            Some(interval) => {
                run_heartbeat(
                    heartbeat_conn,
                    interval,
                    options.keep_alive_timeout,
                    heartbeat_cancel,
                )
                .await
            }
            None => std::future::pending().await,
        }
    };
    tokio::pin!(heartbeat);

    let init_armed = options.init_timeout.is_some();
    let init_timer = tokio::time::sleep(options.init_timeout.unwrap_or_default());
    tokio::pin!(init_timer);

    let close = loop {
        let frame = tokio::select! {
            biased;
            () = shutdown.cancelled() => break Some(CloseFrame::going_away()),
            () = &mut init_timer, if init_armed && !session.is_initialized() => {
                break Some(CloseFrame::init_timeout());
            }
            result = &mut heartbeat => match result {
                HeartbeatResult::TimedOut => {
                    debug!(idle = ?connection.last_activity_elapsed(), "keep-alive timed out");
                    break Some(CloseFrame::keep_alive_timeout());
                }
                HeartbeatResult::Cancelled | HeartbeatResult::Disconnected => break None,
            },
            frame = inbound.next() => frame,
        };

        let flow = match frame {
            None | Some(Inbound::Closed) => break None,
            Some(Inbound::Alive) => {
                connection.mark_alive();
                continue;
            }
            Some(Inbound::Text(text)) => {
                connection.mark_alive();
                dispatcher.dispatch_frame(text.as_bytes()).await
            }
            Some(Inbound::Binary(bytes)) => {
                connection.mark_alive();
                dispatcher.dispatch_frame(&bytes).await
            }
        };
        if let Flow::Close(frame) = flow {
            break Some(frame);
        }
    };

    if let Some(frame) = &close {
        if frame.code.is_violation() {
            counter!(PROTOCOL_VIOLATIONS_TOTAL, "code" => frame.code.as_u16().to_string())
                .increment(1);
            warn!(code = frame.code.as_u16(), reason = %frame.reason, "closing on protocol violation");
        } else {
            info!(code = frame.code.as_u16(), reason = %frame.reason, "closing connection");
        }
        let _ = connection.close(frame.clone()).await;
    }
    let cancelled_operations = session.cancel_all();
    debug!(cancelled_operations, "session torn down");

    SessionEnd {
        close,
        cancelled_operations,
    }
}

/// Serve an upgraded Axum socket until it closes.
pub async fn serve_socket(
    socket: WebSocket,
    engine: Arc<dyn GraphQlEngine>,
    config: Arc<ServerConfig>,
    registry: Arc<ConnectionRegistry>,
    shutdown: CancellationToken,
) {
    let variant = socket
        .protocol()
        .and_then(|value| value.to_str().ok())
        .and_then(ProtocolVariant::from_subprotocol)
        .unwrap_or_default();
    let (ws_tx, ws_rx) = socket.split();

    let (send_tx, send_rx) = mpsc::channel::<Outbound>(config.outbound_buffer_size);
    let connection = Arc::new(Connection::new(ConnectionId::new(), variant, send_tx));
    let session = Arc::new(Session::new());
    info!(connection_id = %connection.id, subprotocol = variant.subprotocol(), "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    registry.add(connection.id.clone(), session.clone());

    let mut writer = tokio::spawn(write_frames(ws_tx, send_rx));

    let inbound = ws_rx.map(|message| match message {
        Ok(Message::Text(text)) => Inbound::Text(text.as_str().to_owned()),
        Ok(Message::Binary(bytes)) => Inbound::Binary(bytes.to_vec()),
        Ok(Message::Ping(_) | Message::Pong(_)) => Inbound::Alive,
        Ok(Message::Close(_)) | Err(_) => Inbound::Closed,
    });

    let end = run_session(
        inbound,
        connection.clone(),
        session,
        engine,
        SessionOptions::from_config(&config),
        shutdown,
    )
    .await;

    if end.close.is_some() {
        let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut writer).await;
    }
    writer.abort();

    info!(
        connection_id = %connection.id,
        dropped_packets = connection.drop_count(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    let _ = registry.remove(&connection.id);
}

/// Drain the outbound queue into the socket. Stops after a close frame or
/// on the first write error.
async fn write_frames(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(item) = rx.recv().await {
        let result = match item {
            Outbound::Packet(packet) => sink.send(Message::Text(packet.encode().into())).await,
            Outbound::KeepAlive(packet) => {
                match sink.send(Message::Text(packet.encode().into())).await {
                    Ok(()) => sink.send(Message::Ping(Default::default())).await,
                    Err(e) => Err(e),
                }
            }
            Outbound::Close(frame) => {
                let close = ws::CloseFrame {
                    code: frame.code.as_u16(),
                    reason: frame.reason.into(),
                };
                let _ = sink.send(Message::Close(Some(close))).await;
                break;
            }
        };
        if result.is_err() {
            break;
        }
    }
}
