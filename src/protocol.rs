//! Wire types exchanged over the broker's pub/sub channels (base spec §3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::packet::{EncodedBroadcastOptions, Packet};

/// Opaque short identifier for an adapter instance (base spec §3), generated
/// once per adapter via [`crate::id::generate`].
pub type ServerId = String;

/// Published on a broadcast channel (`broadcastChannel` or `roomChannel(r)`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BroadcastPacket {
    pub uid: ServerId,
    pub packet: Packet,
    pub opts: EncodedBroadcastOptions,
}

/// Request kind discriminant (base spec §3). Values are wire-stable; do not
/// renumber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestKind {
    Sockets = 0,
    AllRooms = 1,
    RemoteJoin = 2,
    RemoteLeave = 3,
    RemoteDisconnect = 4,
    RemoteFetch = 5,
    ServerSideEmit = 6,
    Broadcast = 7,
    BroadcastClientCount = 8,
    BroadcastAck = 9,
}

impl From<RequestKind> for u8 {
    fn from(value: RequestKind) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for RequestKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use RequestKind::*;
        match value {
            0 => Ok(Sockets),
            1 => Ok(AllRooms),
            2 => Ok(RemoteJoin),
            3 => Ok(RemoteLeave),
            4 => Ok(RemoteDisconnect),
            5 => Ok(RemoteFetch),
            6 => Ok(ServerSideEmit),
            7 => Ok(Broadcast),
            8 => Ok(BroadcastClientCount),
            9 => Ok(BroadcastAck),
            other => Err(other),
        }
    }
}

impl Serialize for RequestKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(u8::from(*self))
    }
}

impl<'de> Deserialize<'de> for RequestKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = u8::deserialize(deserializer)?;
        RequestKind::try_from(raw)
            .map_err(|raw| serde::de::Error::custom(format!("unknown request kind {raw}")))
    }
}

/// A socket descriptor returned by `SOCKETS`/`REMOTE_FETCH` responses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SocketResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handshake: Option<Value>,
    #[serde(default)]
    pub rooms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Published on `requestChannel`.
///
/// `requestId` is absent for fire-and-forget kinds and for
/// `SERVER_SIDE_EMIT` without an ack callback; other optional fields are
/// populated depending on `kind` (base spec §3, §4.5).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub uid: ServerId,
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: RequestKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rooms: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opts: Option<EncodedBroadcastOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet: Option<Packet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Request {
    /// A bare request carrying only the fields every kind needs.
    pub fn new(uid: ServerId, kind: RequestKind) -> Self {
        Self {
            uid,
            request_id: None,
            kind,
            rooms: None,
            opts: None,
            sid: None,
            room: None,
            close: None,
            packet: None,
            data: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Published on `responseChannel` or a `specificResponseChannel`.
///
/// `kind` is set only for responses to broadcast-with-ack and
/// `SERVER_SIDE_EMIT`; every other response field is populated depending on
/// the originating request's kind (base spec §3).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<RequestKind>,
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sockets: Option<Vec<SocketResponse>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rooms: Option<Vec<String>>,
    #[serde(rename = "clientCount", default, skip_serializing_if = "Option::is_none")]
    pub client_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_kind_round_trips_through_json_as_integer() {
        let req = Request::new("AAAAAA".to_string(), RequestKind::AllRooms)
            .with_request_id("deadbeef0000");
        let encoded = serde_json::to_value(&req).unwrap();
        assert_eq!(encoded["type"], json!(1));
        let decoded: Request = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn request_without_request_id_omits_the_field() {
        let req = Request::new("AAAAAA".to_string(), RequestKind::ServerSideEmit);
        let encoded = serde_json::to_value(&req).unwrap();
        assert!(!encoded.as_object().unwrap().contains_key("requestId"));
    }

    #[test]
    fn response_round_trips() {
        let mut resp = Response::new("deadbeef0000");
        resp.rooms = Some(vec!["r1".into(), "r2".into()]);
        let encoded = serde_json::to_vec(&resp).unwrap();
        let decoded: Response = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, resp);
    }

    #[test]
    fn unknown_request_kind_is_rejected() {
        let raw = json!({"uid": "AAAAAA", "type": 42});
        let err = serde_json::from_value::<Request>(raw).unwrap_err();
        assert!(err.to_string().contains("unknown request kind"));
    }
}
