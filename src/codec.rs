//! Two encodings coexist on the wire (base spec §4.2): a compact binary
//! packer (default, used for broadcast packets and `BROADCAST`-kind
//! requests/responses) and JSON (used for the administrative request kinds).
//!
//! Decoding always sniffs the first byte: `0x7B` (`{`) means JSON, anything
//! else means binary. This byte-sniff is deliberate (base spec §9) and must
//! not be replaced with a version byte.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AdapterError, Result};

/// First byte of any JSON-encoded payload on this bus.
const JSON_SNIFF_BYTE: u8 = b'{';

/// A binary packer, pluggable via [`crate::config::AdapterConfig::parser`].
///
/// Operates on [`serde_json::Value`] as an intermediate representation so the
/// trait stays object-safe while still letting callers encode/decode any
/// `Serialize`/`DeserializeOwned` type through [`encode_binary`]/[`decode_binary`].
pub trait BinaryPacker: Send + Sync {
    fn encode_value(&self, value: &Value) -> Result<Vec<u8>>;
    fn decode_value(&self, bytes: &[u8]) -> Result<Value>;
}

/// The default binary packer: msgpack, matching the original implementation's
/// `notepack`-equivalent binary packer.
#[derive(Debug, Default, Clone, Copy)]
pub struct MsgPackCodec;

impl BinaryPacker for MsgPackCodec {
    fn encode_value(&self, value: &Value) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(value).map_err(|err| AdapterError::Encode(err.to_string()))
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<Value> {
        rmp_serde::from_slice(bytes).map_err(|err| AdapterError::Decode(err.to_string()))
    }
}

/// Encode `value` as JSON (used for the administrative request kinds).
pub fn encode_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|err| AdapterError::Encode(err.to_string()))
}

/// Encode `value` with the configured binary packer (used for broadcast
/// packets and `BROADCAST`-kind requests/responses).
pub fn encode_binary<T: Serialize>(packer: &dyn BinaryPacker, value: &T) -> Result<Vec<u8>> {
    let as_value = serde_json::to_value(value).map_err(|err| AdapterError::Encode(err.to_string()))?;
    packer.encode_value(&as_value)
}

/// Decode `bytes` with the configured binary packer.
pub fn decode_binary<T: DeserializeOwned>(packer: &dyn BinaryPacker, bytes: &[u8]) -> Result<T> {
    let value = packer.decode_value(bytes)?;
    serde_json::from_value(value).map_err(|err| AdapterError::Decode(err.to_string()))
}

/// Decode a payload whose wire type is determined by the first-byte sniff:
/// `0x7B` selects JSON, anything else selects the configured binary packer.
///
/// This is the single decode entry point the Subscriber Loop uses (base spec
/// §4.2, §8 invariant 4). An empty payload is a validation error, not a
/// decode attempt.
pub fn decode_payload<T: DeserializeOwned>(packer: &dyn BinaryPacker, bytes: &[u8]) -> Result<T> {
    match bytes.first() {
        None => Err(AdapterError::EmptyPacket),
        Some(&JSON_SNIFF_BYTE) => {
            serde_json::from_slice(bytes).map_err(|err| AdapterError::Decode(err.to_string()))
        }
        Some(_) => decode_binary(packer, bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Request, RequestKind};

    #[test]
    fn json_payload_is_sniffed_by_leading_brace() {
        let packer = MsgPackCodec;
        let req = Request::new("AAAAAA".to_string(), RequestKind::AllRooms);
        let bytes = encode_json(&req).unwrap();
        assert_eq!(bytes[0], b'{');
        let decoded: Request = decode_payload(&packer, &bytes).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn binary_payload_round_trips_through_msgpack() {
        let packer = MsgPackCodec;
        let req = Request::new("AAAAAA".to_string(), RequestKind::Broadcast)
            .with_request_id("deadbeef0000");
        let bytes = encode_binary(&packer, &req).unwrap();
        assert_ne!(bytes[0], b'{');
        let decoded: Request = decode_payload(&packer, &bytes).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn empty_payload_is_a_validation_error() {
        let packer = MsgPackCodec;
        let err = decode_payload::<Request>(&packer, &[]).unwrap_err();
        assert!(matches!(err, AdapterError::EmptyPacket));
    }
}
