//! Abstraction over the pub/sub transport (base spec §1, §4.3, §4.9).
//!
//! The base spec treats the broker client as an out-of-scope external
//! collaborator, but gives it real shape throughout: publish, exact
//! subscribe over a channel set, pattern subscribe, and a subscriber-count
//! query. This trait is the connective tissue that lets the rest of the
//! crate compile against a concrete transport — [`crate::redis_broker::RedisBroker`]
//! for production, [`crate::memory_broker::MemoryBroker`] for tests and
//! single-process operation.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{AdapterError, Result};

/// Callback installed on a [`Broker`] to observe transport-level failures
/// that don't otherwise have a direct caller to return a `Result` to (base
/// spec §6 "Error emission", §9). The `Adapter` installs a default one at
/// construction and removes it on [`Broker::close`] (base spec §4.10).
pub type ErrorHandler = Arc<dyn Fn(&AdapterError) + Send + Sync>;

/// A message delivered to an exact-channel subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExactMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

/// A message delivered to a pattern subscription, carrying both the pattern
/// that matched and the concrete channel it arrived on (base spec glossary:
/// "Pattern subscription").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternMessage {
    pub pattern: String,
    pub channel: String,
    pub payload: Vec<u8>,
}

/// Transport abstraction the Subscriber Loop, Request Client, Request
/// Server and Ack Aggregator publish and receive through.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish `payload` on `channel`.
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<()>;

    /// Subscribe to an exact set of channels, returning a stream of messages
    /// from any of them. Used for `requestChannel` / `responseChannel` /
    /// `specificResponseChannel` together (base spec §4.3).
    async fn subscribe(&self, channels: Vec<String>) -> Result<BoxStream<'static, ExactMessage>>;

    /// Subscribe to a single wildcard pattern, returning a stream of
    /// pattern matches. Used for `{broadcastChannel}*` (base spec §4.3).
    async fn psubscribe(&self, pattern: &str) -> Result<BoxStream<'static, PatternMessage>>;

    /// Number of subscribers currently on `channel`, used as the quorum
    /// estimate for fan-in requests (base spec §4.9).
    async fn server_count(&self, channel: &str) -> Result<usize>;

    /// Install (or clear, with `None`) the handler invoked for broker-side
    /// failures that arise outside a direct request/response call, e.g. a
    /// subscription bridge losing its connection. Replaces any previously
    /// installed handler.
    fn set_error_handler(&self, handler: Option<ErrorHandler>);

    /// Release all broker-side resources held by this instance (base spec
    /// §4.10). Idempotent.
    async fn close(&self) -> Result<()>;
}
