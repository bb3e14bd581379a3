//! Callback surface to the local, in-process adapter (base spec §1, §6).
//!
//! The local adapter — room membership, local delivery, local socket
//! lookup — is an external collaborator referenced only through this narrow
//! trait. Its own implementation (and the containing namespace object,
//! client session registry, and server-side emit dispatch it wraps) is out
//! of scope for this crate.

use async_trait::async_trait;
use serde_json::Value;

use crate::packet::{EncodedBroadcastOptions, Packet};

/// A remote or local socket's externally-visible details, returned by
/// `FetchSockets`/`REMOTE_FETCH` (base spec §4.5, §4.8).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SocketDetails {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handshake: Option<Value>,
    #[serde(default)]
    pub rooms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Invoked once per peer that reports a client count for a broadcast-with-ack
/// (base spec §4.7). May fire more than once; there is no guarantee it fires
/// exactly once per peer.
pub type OnClientCount = Box<dyn FnMut(usize) + Send>;

/// Invoked once per peer-reported client ack (base spec §4.7).
pub type OnAck = Box<dyn FnMut(Value) + Send>;

/// The narrow contract the cross-node core delegates local-side operations
/// to (base spec §6).
#[async_trait]
pub trait LocalAdapter: Send + Sync {
    /// Namespace this adapter instance is bound to.
    fn nsp(&self) -> &str;

    /// Deliver `packet` to locally connected sockets matching `opts`. Used
    /// both for genuinely local broadcasts and for the in-process delivery
    /// side of a cross-node broadcast (base spec §4.8).
    fn broadcast(&self, packet: &Packet, opts: &EncodedBroadcastOptions);

    /// Like [`broadcast`](Self::broadcast), but collects client-level acks.
    /// `on_client_count` and `on_ack` are always invoked for purely local
    /// acks; the Adapter Facade layers cross-node acks on top via the same
    /// callbacks (base spec §4.7).
    fn broadcast_with_ack(
        &self,
        packet: &Packet,
        opts: &EncodedBroadcastOptions,
        on_client_count: OnClientCount,
        on_ack: OnAck,
    );

    /// Enumerate locally connected sockets matching `opts`.
    async fn fetch_sockets(&self, opts: &EncodedBroadcastOptions) -> Vec<SocketDetails>;

    /// Add a set of local sockets to `rooms`.
    fn add_sockets(&self, opts: &EncodedBroadcastOptions, rooms: &[String]);

    /// Remove a set of local sockets from `rooms`.
    fn del_sockets(&self, opts: &EncodedBroadcastOptions, rooms: &[String]);

    /// Disconnect a set of local sockets matching `opts`.
    fn disconnect_sockets(&self, opts: &EncodedBroadcastOptions, close: bool);

    /// All room names currently held locally.
    fn rooms(&self) -> Vec<String>;

    /// Whether `room` is currently held by any locally connected socket
    /// (base spec §3 pattern-dispatch invariant).
    fn holds_room(&self, room: &str) -> bool;

    /// Local socket ids among `rooms` (empty `rooms` means "all local
    /// sockets"), for the `SOCKETS` request kind.
    fn local_socket_ids(&self, rooms: &[String]) -> Vec<String>;

    /// Single-`sid` join used by `REMOTE_JOIN`. Returns `true` if `sid`
    /// resolved to a local client.
    fn join(&self, sid: &str, room: &str) -> bool;

    /// Single-`sid` leave used by `REMOTE_LEAVE`.
    fn leave(&self, sid: &str, room: &str) -> bool;

    /// Single-`sid` disconnect used by `REMOTE_DISCONNECT`.
    fn disconnect(&self, sid: &str, close: bool) -> bool;

    /// Deliver a server-side-emit payload to the namespace's in-process
    /// dispatch (not delivered to clients).
    fn on_server_side_emit(&self, data: Value);
}
