//! The Socket.IO packet/frame shape carried inside broadcasts and requests.
//!
//! The packet/frame parser itself is an out-of-scope external collaborator
//! (base spec §1); this module only defines the data shape the adapter
//! passes through opaquely.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A Socket.IO packet as carried by a [`crate::protocol::BroadcastPacket`] or
/// a `BROADCAST`-kind request/response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nsp: String,
    #[serde(rename = "type")]
    pub kind: PacketType,
    pub data: Value,
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<u64>,
}

impl Packet {
    /// Normalizes an empty `nsp` to `"/"`, per base spec §4.4.
    pub fn normalized_nsp(&self) -> &str {
        if self.nsp.is_empty() { "/" } else { &self.nsp }
    }
}

/// Socket.IO packet type discriminant. Only `Event`/`BinaryEvent` are
/// produced by this adapter's own broadcast path; the others round-trip
/// opaquely when relayed from peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Connect = 0,
    Disconnect = 1,
    Event = 2,
    Ack = 3,
    ConnectError = 4,
    BinaryEvent = 5,
    BinaryAck = 6,
}

impl From<PacketType> for u8 {
    fn from(value: PacketType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for PacketType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Connect),
            1 => Ok(Self::Disconnect),
            2 => Ok(Self::Event),
            3 => Ok(Self::Ack),
            4 => Ok(Self::ConnectError),
            5 => Ok(Self::BinaryEvent),
            6 => Ok(Self::BinaryAck),
            other => Err(other),
        }
    }
}

impl Serialize for PacketType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(u8::from(*self))
    }
}

impl<'de> Deserialize<'de> for PacketType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = u8::deserialize(deserializer)?;
        PacketType::try_from(raw).map_err(|raw| {
            serde::de::Error::custom(format!("unknown packet type discriminant {raw}"))
        })
    }
}

/// Flags attached to a broadcast (base spec §3).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BroadcastFlags {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub local: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub compress: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub volatile: bool,
    #[serde(rename = "timeout_ms", default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Broadcast targeting options as they travel on the wire: room set,
/// exclusion set, and flags. The local adapter's richer `except`/room
/// representations are encoded into this flat shape before publishing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EncodedBroadcastOptions {
    #[serde(default)]
    pub rooms: Vec<String>,
    #[serde(default)]
    pub except: Vec<String>,
    #[serde(default)]
    pub flags: BroadcastFlags,
}

impl EncodedBroadcastOptions {
    /// A single-room broadcast is eligible for the room-channel optimization
    /// (base spec §4.8, §9).
    pub fn single_room(&self) -> Option<&str> {
        match self.rooms.as_slice() {
            [room] => Some(room.as_str()),
            _ => None,
        }
    }
}
