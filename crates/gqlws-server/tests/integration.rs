//! End-to-end integration tests using a real WebSocket client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use gqlws_core::{GraphQlRequest, GraphQlResponse};
use gqlws_server::{
    EngineError, Execution, ExecutionContext, GqlwsServer, GraphQlEngine, ServerConfig,
};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Echoes queries; `subscription { count }` streams three items and
/// `subscription { ticks }` streams until cancelled.
struct LoopbackEngine;

#[async_trait]
impl GraphQlEngine for LoopbackEngine {
    async fn execute(
        &self,
        request: GraphQlRequest,
        context: ExecutionContext,
    ) -> Result<Execution, EngineError> {
        if request.query.contains("count") {
            return Ok(Execution::Stream(Box::pin(async_stream::stream! {
                for n in 1..=3 {
                    yield GraphQlResponse::data(json!({ "count": n }));
                }
            })));
        }
        if request.query.contains("ticks") {
            return Ok(Execution::Stream(Box::pin(async_stream::stream! {
                let mut n = 0u64;
                loop {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    n += 1;
                    yield GraphQlResponse::data(json!({ "ticks": n }));
                }
            })));
        }
        Ok(Execution::Single(GraphQlResponse::data(json!({
            "echo": request.query,
            "operationId": context.operation_id,
        }))))
    }
}

/// Boot a test server and return the WS URL plus the server.
async fn boot_server(config: ServerConfig) -> (String, Arc<GqlwsServer>) {
    let server = Arc::new(GqlwsServer::new(config, Arc::new(LoopbackEngine)));
    let (addr, _handle) = server.listen().await.unwrap();
    (format!("ws://{addr}{}", server.config().path), server)
}

async fn connect(url: &str, subprotocol: &'static str) -> WsStream {
    let mut request = url.into_client_request().unwrap();
    let _ = request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(subprotocol));
    let (ws, response) = timeout(TIMEOUT, connect_async(request))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        response.headers()["sec-websocket-protocol"],
        HeaderValue::from_static(subprotocol)
    );
    ws
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Read the next JSON packet, skipping transport-level pings.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for packet")
            .expect("stream ended")
            .expect("ws error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("expected text packet, got {other:?}"),
        }
    }
}

/// Read until the close frame and return `(code, reason)`.
async fn read_close(ws: &mut WsStream) -> (u16, String) {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for close")
            .expect("stream ended")
            .expect("ws error");
        if let Message::Close(Some(frame)) = msg {
            return (u16::from(frame.code), frame.reason.as_str().to_owned());
        }
    }
}

async fn init(ws: &mut WsStream) {
    send_json(ws, json!({"type": "connection_init"})).await;
    assert_eq!(read_json(ws).await, json!({"type": "connection_ack"}));
}

#[tokio::test]
async fn handshake_and_ping_pong() {
    let (url, server) = boot_server(ServerConfig::default()).await;
    let mut ws = connect(&url, "graphql-transport-ws").await;
    init(&mut ws).await;
    assert_eq!(server.registry().connection_count(), 1);

    send_json(&mut ws, json!({"type": "ping", "payload": {"n": 1}})).await;
    assert_eq!(
        read_json(&mut ws).await,
        json!({"type": "pong", "payload": {"n": 1}})
    );
}

#[tokio::test]
async fn subscription_streams_then_completes() {
    let (url, _server) = boot_server(ServerConfig::default()).await;
    let mut ws = connect(&url, "graphql-transport-ws").await;
    init(&mut ws).await;

    send_json(
        &mut ws,
        json!({"id": "1", "type": "subscribe", "payload": {"query": "subscription { count }"}}),
    )
    .await;
    for n in 1..=3 {
        assert_eq!(
            read_json(&mut ws).await,
            json!({"id": "1", "type": "next", "payload": {"data": {"count": n}}})
        );
    }
    assert_eq!(
        read_json(&mut ws).await,
        json!({"id": "1", "type": "complete"})
    );

    // The ID is free again once `complete` has been seen.
    send_json(
        &mut ws,
        json!({"id": "1", "type": "subscribe", "payload": {"query": "{ again }"}}),
    )
    .await;
    let next = read_json(&mut ws).await;
    assert_eq!(next["payload"]["data"]["echo"], "{ again }");
    assert_eq!(
        read_json(&mut ws).await,
        json!({"id": "1", "type": "complete"})
    );
}

#[tokio::test]
async fn client_complete_stops_subscription() {
    let (url, server) = boot_server(ServerConfig::default()).await;
    let mut ws = connect(&url, "graphql-transport-ws").await;
    init(&mut ws).await;

    send_json(
        &mut ws,
        json!({"id": "t", "type": "subscribe", "payload": {"query": "subscription { ticks }"}}),
    )
    .await;
    assert_eq!(read_json(&mut ws).await["type"], "next");
    send_json(&mut ws, json!({"id": "t", "type": "complete"})).await;

    loop {
        let packet = read_json(&mut ws).await;
        if packet["type"] == "complete" {
            assert_eq!(packet["id"], "t");
            break;
        }
        assert_eq!(packet["type"], "next");
    }
    assert_eq!(server.registry().subscription_count(), 0);
}

#[tokio::test]
async fn duplicate_id_closes_4409() {
    let (url, _server) = boot_server(ServerConfig::default()).await;
    let mut ws = connect(&url, "graphql-transport-ws").await;
    init(&mut ws).await;

    let subscribe =
        json!({"id": "d", "type": "subscribe", "payload": {"query": "subscription { ticks }"}});
    send_json(&mut ws, subscribe.clone()).await;
    send_json(&mut ws, subscribe).await;
    assert_eq!(
        read_close(&mut ws).await,
        (4409, "Subscriber for d already exists".to_owned())
    );
}

#[tokio::test]
async fn unknown_type_closes_4400() {
    let (url, _server) = boot_server(ServerConfig::default()).await;
    let mut ws = connect(&url, "graphql-transport-ws").await;
    send_json(&mut ws, json!({"type": "bogus"})).await;
    let (code, _) = read_close(&mut ws).await;
    assert_eq!(code, 4400);
}

#[tokio::test]
async fn long_type_label_still_closes_4400() {
    let (url, _server) = boot_server(ServerConfig::default()).await;
    let mut ws = connect(&url, "graphql-transport-ws").await;
    send_json(&mut ws, json!({"type": "x".repeat(200)})).await;
    let (code, reason) = read_close(&mut ws).await;
    assert_eq!(code, 4400);
    assert!(reason.starts_with("Unexpected packet type: xxx"));
    assert!(reason.len() <= gqlws_core::MAX_REASON_BYTES);
}

#[tokio::test]
async fn long_duplicate_id_still_closes_4409() {
    let (url, _server) = boot_server(ServerConfig::default()).await;
    let mut ws = connect(&url, "graphql-transport-ws").await;
    init(&mut ws).await;

    let id = "i".repeat(300);
    let subscribe =
        json!({"id": id, "type": "subscribe", "payload": {"query": "subscription { ticks }"}});
    send_json(&mut ws, subscribe.clone()).await;
    send_json(&mut ws, subscribe).await;
    let (code, reason) = read_close(&mut ws).await;
    assert_eq!(code, 4409);
    assert!(reason.starts_with("Subscriber for iii"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reused_id_after_complete_sees_old_complete_first() {
    let (url, _server) = boot_server(ServerConfig::default()).await;
    let mut ws = connect(&url, "graphql-transport-ws").await;
    init(&mut ws).await;

    for round in 0..50 {
        send_json(
            &mut ws,
            json!({"id": "x", "type": "subscribe", "payload": {"query": "subscription { ticks }"}}),
        )
        .await;
        assert_eq!(read_json(&mut ws).await["type"], "next");

        send_json(&mut ws, json!({"id": "x", "type": "complete"})).await;
        send_json(
            &mut ws,
            json!({"id": "x", "type": "subscribe", "payload": {"query": "{ fresh }"}}),
        )
        .await;

        // Stray ticks may precede the old complete; nothing of the new
        // operation may.
        let mut packet = read_json(&mut ws).await;
        while packet["type"] == "next" && packet["payload"]["data"].get("ticks").is_some() {
            packet = read_json(&mut ws).await;
        }
        assert_eq!(packet, json!({"id": "x", "type": "complete"}), "round {round}");
        let next = read_json(&mut ws).await;
        assert_eq!(next["payload"]["data"]["echo"], "{ fresh }", "round {round}");
        assert_eq!(
            read_json(&mut ws).await,
            json!({"id": "x", "type": "complete"}),
            "round {round}"
        );
    }
}

#[tokio::test]
async fn subscribe_before_ack_closes_4401() {
    let (url, _server) = boot_server(ServerConfig::default()).await;
    let mut ws = connect(&url, "graphql-transport-ws").await;
    send_json(
        &mut ws,
        json!({"id": "1", "type": "subscribe", "payload": {"query": "{ a }"}}),
    )
    .await;
    assert_eq!(read_close(&mut ws).await, (4401, "Unauthorized".to_owned()));
}

#[tokio::test]
async fn legacy_start_data_stop() {
    let (url, _server) = boot_server(ServerConfig::default()).await;
    let mut ws = connect(&url, "graphql-ws").await;
    init(&mut ws).await;

    send_json(
        &mut ws,
        json!({"id": "s", "type": "start", "payload": {"query": "subscription { ticks }"}}),
    )
    .await;
    let data = read_json(&mut ws).await;
    assert_eq!(data["type"], "data");
    assert_eq!(data["id"], "s");

    send_json(&mut ws, json!({"id": "s", "type": "stop"})).await;
    assert_eq!(read_close(&mut ws).await, (1000, "Ok".to_owned()));
}

#[tokio::test]
async fn init_timeout_closes_4408() {
    let config = ServerConfig {
        init_timeout_ms: 100,
        ..ServerConfig::default()
    };
    let (url, _server) = boot_server(config).await;
    let mut ws = connect(&url, "graphql-transport-ws").await;
    assert_eq!(
        read_close(&mut ws).await,
        (4408, "Connection initialisation timeout".to_owned())
    );
}

#[tokio::test]
async fn shutdown_closes_1001() {
    let (url, server) = boot_server(ServerConfig::default()).await;
    let mut ws = connect(&url, "graphql-transport-ws").await;
    init(&mut ws).await;

    server.shutdown().shutdown();
    assert_eq!(
        read_close(&mut ws).await,
        (1001, "Server shutting down".to_owned())
    );
}

#[tokio::test]
async fn connection_limit_rejects_upgrade() {
    let config = ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    };
    let (url, _server) = boot_server(config).await;
    let mut first = connect(&url, "graphql-transport-ws").await;
    init(&mut first).await;

    let second = timeout(TIMEOUT, connect_async(url.as_str())).await.unwrap();
    assert!(second.is_err());

    // Closing the first connection frees its slot.
    first.close(None).await.unwrap();
    let reopened = timeout(TIMEOUT, async {
        loop {
            if let Ok((ws, _)) = connect_async(url.as_str()).await {
                return ws;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reopened.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_upgrades_respect_limit() {
    let config = ServerConfig {
        max_connections: 2,
        ..ServerConfig::default()
    };
    let (url, server) = boot_server(config).await;

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let url = url.clone();
            tokio::spawn(async move { connect_async(url.as_str()).await })
        })
        .collect();
    let mut open = Vec::new();
    for attempt in attempts {
        if let Ok((ws, _)) = timeout(TIMEOUT, attempt).await.unwrap().unwrap() {
            open.push(ws);
        }
    }
    assert_eq!(open.len(), 2);
    assert!(server.registry().connection_count() <= 2);
}
