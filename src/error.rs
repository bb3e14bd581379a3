//! Unified error type for the adapter.

use thiserror::Error;

/// Errors surfaced to callers of the adapter's public API.
///
/// Per base spec §7, the core never panics on bad peer input; decode and
/// validation failures are dropped internally and only reach this type when
/// they originate from a call the caller itself made.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("broker error: {0}")]
    Broker(String),

    #[error("redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    #[error("redis pool error: {0}")]
    RedisPool(#[from] deadpool_redis::PoolError),

    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("failed to decode message: {0}")]
    Decode(String),

    #[error("timeout reached while waiting for {what} response (got {got} of {expected})")]
    Timeout {
        what: &'static str,
        got: usize,
        expected: usize,
    },

    #[error("packet must not be empty")]
    EmptyPacket,

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_matches_base_spec_form() {
        let err = AdapterError::Timeout {
            what: "allRooms",
            got: 1,
            expected: 2,
        };
        assert_eq!(
            err.to_string(),
            "timeout reached while waiting for allRooms response (got 1 of 2)"
        );
    }

    #[test]
    fn empty_packet_is_a_validation_error_not_broker_io() {
        let err = AdapterError::EmptyPacket;
        assert_eq!(err.to_string(), "packet must not be empty");
    }
}
