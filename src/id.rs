//! Short random identifiers used for server ids and request correlation ids.
//!
//! The wire format is a bare lower-hex string, not a UUID: 6 random bytes
//! encoded as 12 hex characters, matching the original implementation's
//! `uid`/`requestId` shape (see base spec §3).

use rand::RngCore;

/// Generate a fresh 12-character lower-hex id from 6 random bytes.
pub fn generate() -> String {
    let mut bytes = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_twelve_hex_chars() {
        let id = generate();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generates_distinct_ids() {
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
    }
}
