//! Protocol vocabularies.
//!
//! The current `graphql-ws` protocol and the legacy `subscriptions-transport-ws`
//! protocol share one state machine and differ only in packet labels. The
//! dispatcher is parameterised by [`ProtocolVariant`] instead of carrying two
//! copies of the same logic.
//!
//! | Role                 | Current      | Legacy     |
//! |----------------------|--------------|------------|
//! | client subscribe     | `subscribe`  | `start`    |
//! | server result        | `next`       | `data`     |
//! | client cancel        | `complete`   | `stop`     |
//! | server completion    | `complete`   | `complete` |
//! | server keep-alive    | `ping`       | `ka`       |

use serde_json::{Value, json};

use crate::graphql::{GraphQlError, GraphQlResponse};
use crate::packet::{Packet, PacketType};

/// WebSocket sub-protocol name of the current protocol.
pub const CURRENT_SUBPROTOCOL: &str = "graphql-transport-ws";

/// WebSocket sub-protocol name of the legacy protocol.
pub const LEGACY_SUBPROTOCOL: &str = "graphql-ws";

/// Which packet vocabulary an operation or connection speaks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ProtocolVariant {
    /// `graphql-transport-ws`.
    #[default]
    Current,
    /// `graphql-ws` (subscriptions-transport-ws).
    Legacy,
}

impl ProtocolVariant {
    /// Sub-protocols the server offers during the upgrade, in preference order.
    pub const SUBPROTOCOLS: [&'static str; 2] = [CURRENT_SUBPROTOCOL, LEGACY_SUBPROTOCOL];

    /// The `Sec-WebSocket-Protocol` value for this variant.
    pub fn subprotocol(self) -> &'static str {
        match self {
            Self::Current => CURRENT_SUBPROTOCOL,
            Self::Legacy => LEGACY_SUBPROTOCOL,
        }
    }

    /// Resolve a negotiated sub-protocol name.
    pub fn from_subprotocol(name: &str) -> Option<Self> {
        match name.trim() {
            CURRENT_SUBPROTOCOL => Some(Self::Current),
            LEGACY_SUBPROTOCOL => Some(Self::Legacy),
            _ => None,
        }
    }

    /// Label the client uses to start an operation.
    pub fn subscribe_type(self) -> PacketType {
        match self {
            Self::Current => PacketType::Subscribe,
            Self::Legacy => PacketType::Start,
        }
    }

    /// Label the server uses for each operation result.
    pub fn next_type(self) -> PacketType {
        match self {
            Self::Current => PacketType::Next,
            Self::Legacy => PacketType::Data,
        }
    }

    /// Label the client uses to cancel an operation.
    pub fn cancel_type(self) -> PacketType {
        match self {
            Self::Current => PacketType::Complete,
            Self::Legacy => PacketType::Stop,
        }
    }

    /// Label of the server-initiated keep-alive.
    pub fn keep_alive_type(self) -> PacketType {
        match self {
            Self::Current => PacketType::Ping,
            Self::Legacy => PacketType::KeepAlive,
        }
    }

    /// Server keep-alive packet.
    pub fn keep_alive(self) -> Packet {
        Packet::bare(self.keep_alive_type())
    }

    /// Result packet for one GraphQL response.
    pub fn next(self, id: &str, response: &GraphQlResponse) -> Packet {
        Packet::new(self.next_type(), Some(id.to_owned()), Some(response.to_value()))
    }

    /// Error packet for an operation the engine refused to execute.
    ///
    /// The current protocol carries the error list; the legacy protocol
    /// carries a single `{message}` object.
    pub fn error(self, id: &str, errors: &[GraphQlError]) -> Packet {
        let payload = match self {
            Self::Current => Value::Array(errors.iter().map(GraphQlError::to_value).collect()),
            Self::Legacy => {
                let message = errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                json!({ "message": message })
            }
        };
        Packet::new(PacketType::Error, Some(id.to_owned()), Some(payload))
    }

    /// Completion packet. Both vocabularies use `complete` server-side.
    pub fn complete(self, id: &str) -> Packet {
        Packet::complete(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subprotocol_roundtrip() {
        for variant in [ProtocolVariant::Current, ProtocolVariant::Legacy] {
            assert_eq!(ProtocolVariant::from_subprotocol(variant.subprotocol()), Some(variant));
        }
        assert_eq!(ProtocolVariant::from_subprotocol("graphql-sse"), None);
    }

    #[test]
    fn default_is_current() {
        assert_eq!(ProtocolVariant::default(), ProtocolVariant::Current);
    }

    #[test]
    fn label_table() {
        assert_eq!(ProtocolVariant::Current.subscribe_type().label(), "subscribe");
        assert_eq!(ProtocolVariant::Legacy.subscribe_type().label(), "start");
        assert_eq!(ProtocolVariant::Current.next_type().label(), "next");
        assert_eq!(ProtocolVariant::Legacy.next_type().label(), "data");
        assert_eq!(ProtocolVariant::Current.cancel_type().label(), "complete");
        assert_eq!(ProtocolVariant::Legacy.cancel_type().label(), "stop");
        assert_eq!(ProtocolVariant::Legacy.keep_alive().encode(), r#"{"type":"ka"}"#);
        assert_eq!(ProtocolVariant::Current.keep_alive().encode(), r#"{"type":"ping"}"#);
    }

    #[test]
    fn labels_belong_to_their_variant() {
        for variant in [ProtocolVariant::Current, ProtocolVariant::Legacy] {
            assert_eq!(variant.subscribe_type().variant(), Some(variant));
            assert_eq!(variant.next_type().variant(), Some(variant));
        }
    }

    #[test]
    fn next_packet_carries_response() {
        let response = GraphQlResponse::data(json!({"count": 1}));
        let packet = ProtocolVariant::Legacy.next("7", &response);
        assert_eq!(packet.kind, PacketType::Data);
        assert_eq!(packet.id(), Some("7"));
        assert_eq!(packet.payload.unwrap()["data"]["count"], 1);
    }

    #[test]
    fn error_payload_shape_differs_by_variant() {
        let errors = vec![GraphQlError::new("bad field"), GraphQlError::new("bad arg")];

        let current = ProtocolVariant::Current.error("1", &errors);
        let payload = current.payload.unwrap();
        assert_eq!(payload.as_array().unwrap().len(), 2);
        assert_eq!(payload[0]["message"], "bad field");

        let legacy = ProtocolVariant::Legacy.error("1", &errors);
        assert_eq!(legacy.payload.unwrap()["message"], "bad field; bad arg");
    }
}
