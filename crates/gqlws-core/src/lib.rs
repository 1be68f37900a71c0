//! # gqlws-core
//!
//! Shared vocabulary for the GraphQL-over-WebSocket server.
//!
//! - **Packets**: [`Packet`] envelope `{id?, type, payload?}` with its JSON codec
//! - **Protocol variants**: [`ProtocolVariant`] label tables for the current
//!   (`graphql-transport-ws`) and legacy (`graphql-ws`) vocabularies
//! - **Close frames**: [`CloseFrame`] codes and reasons for protocol violations
//! - **GraphQL documents**: [`GraphQlRequest`], [`GraphQlResponse`], [`GraphQlError`]
//! - **Errors**: [`CodecError`] via `thiserror`
//! - **IDs**: [`ConnectionId`] newtype

#![deny(unsafe_code)]

pub mod close;
pub mod errors;
pub mod graphql;
pub mod ids;
pub mod packet;
pub mod protocol;

pub use close::{CloseCode, CloseFrame, MAX_REASON_BYTES};
pub use errors::CodecError;
pub use graphql::{GraphQlError, GraphQlRequest, GraphQlResponse, Location, PathSegment};
pub use ids::ConnectionId;
pub use packet::{Packet, PacketType};
pub use protocol::ProtocolVariant;
