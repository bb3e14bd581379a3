//! Adapter configuration (base spec §6).

use std::sync::Arc;
use std::time::Duration;

use crate::codec::BinaryPacker;
use crate::codec::MsgPackCodec;

/// Default deadline for fan-in requests (base spec §4.6).
pub const DEFAULT_REQUESTS_TIMEOUT: Duration = Duration::from_secs(5);

/// Default channel-name prefix (base spec §3).
pub const DEFAULT_KEY: &str = "socket.io";

/// Configuration for a single [`crate::adapter::Adapter`] instance.
///
/// CLI parsing and file-based layering are explicitly out of scope (base
/// spec §1) — this is a plain struct with a `Default` impl, constructed by
/// the embedding application.
#[derive(Clone)]
pub struct AdapterConfig {
    /// Channel-name prefix. Defaults to `"socket.io"`.
    pub key: String,
    /// Deadline for fan-in requests (`SOCKETS`, `ALL_ROOMS`, `REMOTE_FETCH`, …).
    pub requests_timeout: Duration,
    /// When true, responses are addressed to the originator's specific
    /// response channel instead of the shared one.
    pub publish_on_specific_response_channel: bool,
    /// Binary packer used for broadcast packets and BROADCAST-kind
    /// requests/responses. Defaults to the msgpack-style packer.
    pub parser: Arc<dyn BinaryPacker>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_KEY.to_string(),
            requests_timeout: DEFAULT_REQUESTS_TIMEOUT,
            publish_on_specific_response_channel: false,
            parser: Arc::new(MsgPackCodec),
        }
    }
}

impl AdapterConfig {
    /// Builder-style override of the channel-name prefix.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Builder-style override of the fan-in request timeout.
    pub fn with_requests_timeout(mut self, timeout: Duration) -> Self {
        self.requests_timeout = timeout;
        self
    }

    /// Builder-style enable of per-origin response channels.
    pub fn with_specific_response_channel(mut self, enabled: bool) -> Self {
        self.publish_on_specific_response_channel = enabled;
        self
    }
}
