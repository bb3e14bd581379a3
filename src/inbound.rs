//! Inbound Broadcast Handler (base spec §4.4).
//!
//! Validates channel/room/namespace/origin of an incoming broadcast packet
//! and hands it to the local adapter for local-only delivery. Cross-node
//! republish must never occur here.

use crate::broker::PatternMessage;
use crate::codec::{decode_payload, BinaryPacker};
use crate::local::LocalAdapter;
use crate::namer::ChannelNamer;
use crate::protocol::{BroadcastPacket, ServerId};

/// Processes one message delivered on the broadcast pattern subscription.
/// Every rejection path is a silent drop, per base spec §7 (decode/
/// validation errors are dropped with a debug log, never surfaced).
pub fn handle_broadcast_message(
    namer: &ChannelNamer,
    self_uid: &ServerId,
    local: &dyn LocalAdapter,
    packer: &dyn BinaryPacker,
    message: PatternMessage,
) {
    let Some(room) = namer.room_suffix(&message.channel) else {
        tracing::trace!(channel = %message.channel, "dropping broadcast message on unrelated channel");
        return;
    };

    if !room.is_empty() && !local.holds_room(room) {
        tracing::trace!(channel = %message.channel, room, "dropping broadcast for room not held locally");
        return;
    }

    let decoded: BroadcastPacket = match decode_payload(packer, &message.payload) {
        Ok(decoded) => decoded,
        Err(err) => {
            tracing::debug!(channel = %message.channel, error = %err, "dropping undecodable broadcast packet");
            return;
        }
    };

    if &decoded.uid == self_uid {
        tracing::trace!(channel = %message.channel, "dropping self-echoed broadcast");
        return;
    }

    let nsp = decoded.packet.normalized_nsp();
    if nsp != local.nsp() {
        tracing::trace!(channel = %message.channel, nsp, local_nsp = local.nsp(), "dropping broadcast for foreign namespace");
        return;
    }

    local.broadcast(&decoded.packet, &decoded.opts);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_binary, MsgPackCodec};
    use crate::local::{OnAck, OnClientCount, SocketDetails};
    use crate::packet::{EncodedBroadcastOptions, Packet, PacketType};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingLocal {
        rooms: Vec<String>,
        nsp: String,
        delivered: Arc<Mutex<Vec<Packet>>>,
    }

    #[async_trait]
    impl LocalAdapter for RecordingLocal {
        fn nsp(&self) -> &str {
            &self.nsp
        }
        fn broadcast(&self, packet: &Packet, _opts: &EncodedBroadcastOptions) {
            self.delivered.lock().push(packet.clone());
        }
        fn broadcast_with_ack(
            &self,
            _packet: &Packet,
            _opts: &EncodedBroadcastOptions,
            _on_client_count: OnClientCount,
            _on_ack: OnAck,
        ) {
        }
        async fn fetch_sockets(&self, _opts: &EncodedBroadcastOptions) -> Vec<SocketDetails> {
            Vec::new()
        }
        fn add_sockets(&self, _opts: &EncodedBroadcastOptions, _rooms: &[String]) {}
        fn del_sockets(&self, _opts: &EncodedBroadcastOptions, _rooms: &[String]) {}
        fn disconnect_sockets(&self, _opts: &EncodedBroadcastOptions, _close: bool) {}
        fn rooms(&self) -> Vec<String> {
            self.rooms.clone()
        }
        fn holds_room(&self, room: &str) -> bool {
            self.rooms.iter().any(|r| r == room)
        }
        fn local_socket_ids(&self, _rooms: &[String]) -> Vec<String> {
            Vec::new()
        }
        fn join(&self, _sid: &str, _room: &str) -> bool {
            false
        }
        fn leave(&self, _sid: &str, _room: &str) -> bool {
            false
        }
        fn disconnect(&self, _sid: &str, _close: bool) -> bool {
            false
        }
        fn on_server_side_emit(&self, _data: serde_json::Value) {}
    }

    fn sample_packet() -> BroadcastPacket {
        BroadcastPacket {
            uid: "BBBBBB".to_string(),
            packet: Packet {
                nsp: "/".to_string(),
                kind: PacketType::Event,
                data: serde_json::json!(["hi"]),
                ack_id: None,
            },
            opts: EncodedBroadcastOptions {
                rooms: vec!["r1".to_string()],
                except: Vec::new(),
                flags: Default::default(),
            },
        }
    }

    #[test]
    fn delivers_when_room_is_held_and_namespace_matches() {
        let namer = ChannelNamer::new("socket.io", "/");
        let packer = MsgPackCodec;
        let local = RecordingLocal {
            rooms: vec!["r1".to_string()],
            nsp: "/".to_string(),
            delivered: Arc::new(Mutex::new(Vec::new())),
        };
        let payload = encode_binary(&packer, &sample_packet()).unwrap();
        let message = PatternMessage {
            pattern: namer.broadcast_pattern(),
            channel: namer.room_channel("r1"),
            payload,
        };
        handle_broadcast_message(&namer, &"AAAAAA".to_string(), &local, &packer, message);
        assert_eq!(local.delivered.lock().len(), 1);
    }

    #[test]
    fn drops_when_room_not_held_locally() {
        let namer = ChannelNamer::new("socket.io", "/");
        let packer = MsgPackCodec;
        let local = RecordingLocal {
            rooms: Vec::new(),
            nsp: "/".to_string(),
            delivered: Arc::new(Mutex::new(Vec::new())),
        };
        let payload = encode_binary(&packer, &sample_packet()).unwrap();
        let message = PatternMessage {
            pattern: namer.broadcast_pattern(),
            channel: namer.room_channel("r1"),
            payload,
        };
        handle_broadcast_message(&namer, &"AAAAAA".to_string(), &local, &packer, message);
        assert!(local.delivered.lock().is_empty());
    }

    #[test]
    fn drops_self_echoed_broadcast() {
        let namer = ChannelNamer::new("socket.io", "/");
        let packer = MsgPackCodec;
        let local = RecordingLocal {
            rooms: vec!["r1".to_string()],
            nsp: "/".to_string(),
            delivered: Arc::new(Mutex::new(Vec::new())),
        };
        let mut packet = sample_packet();
        packet.uid = "AAAAAA".to_string();
        let payload = encode_binary(&packer, &packet).unwrap();
        let message = PatternMessage {
            pattern: namer.broadcast_pattern(),
            channel: namer.room_channel("r1"),
            payload,
        };
        handle_broadcast_message(&namer, &"AAAAAA".to_string(), &local, &packer, message);
        assert!(local.delivered.lock().is_empty());
    }
}
