//! Wire packet envelope and its JSON codec.
//!
//! Every frame on the socket is one JSON object:
//!
//! ```json
//! { "id": "1", "type": "subscribe", "payload": { "query": "subscription { count }" } }
//! ```
//!
//! `id` and `payload` are optional on the wire. The codec does not enforce
//! which packet types need an `id`; the dispatcher does, so that a missing id
//! is reported with its dedicated close reason.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::CodecError;
use crate::protocol::ProtocolVariant;

/// Packet type labels of both protocol vocabularies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// `connection_init` (client → server).
    ConnectionInit,
    /// `connection_ack` (server → client).
    ConnectionAck,
    /// `connection_error` (legacy, server → client).
    ConnectionError,
    /// `connection_terminate` (legacy, client → server).
    ConnectionTerminate,
    /// `ka` keep-alive (legacy, server → client).
    KeepAlive,
    /// `ping` (either direction).
    Ping,
    /// `pong` (either direction).
    Pong,
    /// `subscribe` (client → server).
    Subscribe,
    /// `next` (server → client).
    Next,
    /// `error` (server → client).
    Error,
    /// `complete` (either direction).
    Complete,
    /// `start` (legacy alias of `subscribe`).
    Start,
    /// `data` (legacy alias of `next`).
    Data,
    /// `stop` (legacy alias of client `complete`).
    Stop,
}

impl PacketType {
    /// Every packet type, in declaration order.
    pub const ALL: [Self; 14] = [
        Self::ConnectionInit,
        Self::ConnectionAck,
        Self::ConnectionError,
        Self::ConnectionTerminate,
        Self::KeepAlive,
        Self::Ping,
        Self::Pong,
        Self::Subscribe,
        Self::Next,
        Self::Error,
        Self::Complete,
        Self::Start,
        Self::Data,
        Self::Stop,
    ];

    /// The `type` label used on the wire.
    pub fn label(self) -> &'static str {
        match self {
            Self::ConnectionInit => "connection_init",
            Self::ConnectionAck => "connection_ack",
            Self::ConnectionError => "connection_error",
            Self::ConnectionTerminate => "connection_terminate",
            Self::KeepAlive => "ka",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Subscribe => "subscribe",
            Self::Next => "next",
            Self::Error => "error",
            Self::Complete => "complete",
            Self::Start => "start",
            Self::Data => "data",
            Self::Stop => "stop",
        }
    }

    /// Look up a packet type by its wire label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }

    /// Whether packets of this type are bound to an operation and need an `id`.
    pub fn is_operation(self) -> bool {
        matches!(
            self,
            Self::Subscribe
                | Self::Next
                | Self::Error
                | Self::Complete
                | Self::Start
                | Self::Data
                | Self::Stop
        )
    }

    /// The vocabulary that owns this label, or `None` for labels both share.
    pub fn variant(self) -> Option<ProtocolVariant> {
        match self {
            Self::Subscribe | Self::Next | Self::Ping | Self::Pong => {
                Some(ProtocolVariant::Current)
            }
            Self::Start
            | Self::Data
            | Self::Stop
            | Self::ConnectionError
            | Self::ConnectionTerminate
            | Self::KeepAlive => Some(ProtocolVariant::Legacy),
            Self::ConnectionInit | Self::ConnectionAck | Self::Error | Self::Complete => None,
        }
    }
}

/// One framed protocol message.
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    /// Operation correlation ID.
    pub id: Option<String>,
    /// Packet type.
    pub kind: PacketType,
    /// Structured payload. A JSON `null` payload is treated as absent.
    pub payload: Option<Value>,
}

#[derive(Deserialize)]
struct RawPacket {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
}

impl Packet {
    /// Build a packet from its parts.
    pub fn new(kind: PacketType, id: Option<String>, payload: Option<Value>) -> Self {
        Self {
            id,
            kind,
            payload: payload.filter(|p| !p.is_null()),
        }
    }

    /// A packet with neither `id` nor `payload`.
    pub fn bare(kind: PacketType) -> Self {
        Self::new(kind, None, None)
    }

    /// `connection_ack`, optionally carrying the engine's acknowledgement payload.
    pub fn connection_ack(payload: Option<Value>) -> Self {
        Self::new(PacketType::ConnectionAck, None, payload)
    }

    /// `pong` answering a `ping`: echoes the ping's `id` and `payload`.
    pub fn pong_for(ping: &Self) -> Self {
        Self::new(PacketType::Pong, ping.id.clone(), ping.payload.clone())
    }

    /// `complete` for an operation.
    pub fn complete(id: impl Into<String>) -> Self {
        Self::new(PacketType::Complete, Some(id.into()), None)
    }

    /// The operation ID, if any.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Decode one frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let raw: RawPacket = serde_json::from_slice(bytes)?;
        let kind = PacketType::from_label(&raw.kind)
            .ok_or_else(|| CodecError::UnexpectedType(raw.kind.clone()))?;
        Ok(Self::new(kind, raw.id, raw.payload))
    }

    /// Encode to the JSON text sent as one frame.
    pub fn encode(&self) -> String {
        let mut object = Map::new();
        if let Some(id) = &self.id {
            let _ = object.insert("id".into(), Value::String(id.clone()));
        }
        let _ = object.insert("type".into(), Value::String(self.kind.label().into()));
        if let Some(payload) = &self.payload {
            let _ = object.insert("payload".into(), payload.clone());
        }
        Value::Object(object).to_string()
    }
}
