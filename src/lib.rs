//! Cross-node broadcast/RPC adapter core for a Socket.IO-style realtime
//! server, coordinated over a Redis-like pub/sub broker.
//!
//! This crate implements the inter-node coordination protocol only: channel
//! naming and subscription topology, request/response correlation with
//! fan-in across an unknown number of peers, timeout-bounded collection,
//! broadcast with client-level acknowledgement aggregation, and idempotent
//! handling of self-originated messages. The local in-process adapter
//! (room membership, local delivery, local socket lookup), the Socket.IO
//! packet parser, and the pub/sub broker's concrete transport are external
//! collaborators the embedding application supplies through the
//! [`LocalAdapter`] and [`Broker`] traits.
//!
//! Start at [`Adapter`]: construct one per namespace with an
//! [`AdapterConfig`], a [`Broker`] (use [`RedisBroker`] in production,
//! [`MemoryBroker`] for tests or single-process operation), and a
//! `LocalAdapter` implementation.

pub mod ack;
pub mod adapter;
pub mod broker;
pub mod codec;
pub mod config;
pub mod correlation;
pub mod error;
mod id;
pub mod inbound;
pub mod local;
pub mod memory_broker;
pub mod namer;
pub mod packet;
pub mod protocol;
pub mod redis_broker;
pub mod request_client;
pub mod request_server;
pub mod subscriber;

pub use adapter::Adapter;
pub use broker::{Broker, ErrorHandler, ExactMessage, PatternMessage};
pub use codec::{BinaryPacker, MsgPackCodec};
pub use config::AdapterConfig;
pub use error::{AdapterError, Result};
pub use local::{LocalAdapter, OnAck, OnClientCount, SocketDetails};
pub use memory_broker::MemoryBroker;
pub use namer::ChannelNamer;
pub use packet::{BroadcastFlags, EncodedBroadcastOptions, Packet, PacketType};
pub use protocol::{BroadcastPacket, Request, RequestKind, Response, ServerId, SocketResponse};
pub use redis_broker::RedisBroker;
pub use request_client::FanInResult;

/// Generates the 12-character lower-hex identifiers used for server ids and
/// request correlation ids (base spec §3).
pub fn generate_id() -> String {
    id::generate()
}
