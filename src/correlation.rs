//! Correlation state for in-flight requests and broadcast-with-ack requests
//! (base spec §3, §5, §9).
//!
//! `requests` and `ackRequests` are concurrent maps keyed by `requestId`. A
//! pending entry must be removed exactly once, by quorum or by timer, never
//! both. `DashMap::remove` is the atomic "take" primitive this relies on:
//! whichever caller's `remove` returns `Some` owns the resolution; every
//! other caller (a concurrent timer, or a response arriving after removal)
//! sees `None` and does nothing.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::AdapterError;
use crate::protocol::{RequestKind, Response, SocketResponse};

/// Kind-specific aggregation state for a fan-in request (base spec §3,
/// `PendingRequest.accumulator`).
pub enum Accumulator {
    /// `ALL_ROOMS`: unique room names.
    Rooms(HashSet<String>),
    /// `SOCKETS` / `REMOTE_FETCH`: list of socket descriptors.
    Sockets(Vec<SocketResponse>),
    /// `SERVER_SIDE_EMIT` with ack: list of peer-reported ack payloads.
    ServerSideEmit(Vec<serde_json::Value>),
    /// `REMOTE_JOIN` / `REMOTE_LEAVE` / `REMOTE_DISCONNECT` with a specific
    /// `sid`: the first peer response completes the request.
    Unary(Option<Response>),
}

/// The outcome delivered to the original caller when a [`PendingRequest`]
/// resolves, by quorum or by timeout (base spec §4.6 step 5).
pub struct FanInOutcome {
    pub accumulator: Accumulator,
    pub error: Option<AdapterError>,
}

/// An in-flight fan-in request (base spec §3).
pub struct PendingRequest {
    pub kind: RequestKind,
    pub num_sub: usize,
    pub msg_count: AtomicUsize,
    pub accumulator: Mutex<Accumulator>,
    resolve: Mutex<Option<oneshot::Sender<FanInOutcome>>>,
}

impl PendingRequest {
    pub fn new(
        kind: RequestKind,
        num_sub: usize,
        initial_msg_count: usize,
        accumulator: Accumulator,
        resolve: oneshot::Sender<FanInOutcome>,
    ) -> Self {
        Self {
            kind,
            num_sub,
            msg_count: AtomicUsize::new(initial_msg_count),
            accumulator: Mutex::new(accumulator),
            resolve: Mutex::new(Some(resolve)),
        }
    }

    /// Post-increment quorum check (base spec §5: "comparison to `numSub`
    /// must be based on its post-increment value").
    pub fn record_response(&self) -> usize {
        self.msg_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn quorum_reached(&self) -> bool {
        self.msg_count.load(Ordering::SeqCst) >= self.num_sub
    }

    /// Single-`sid` `REMOTE_JOIN`/`REMOTE_LEAVE`/`REMOTE_DISCONNECT` resolve
    /// as soon as the one node holding `sid` responds (base spec §4.6: "any
    /// single peer response completes the request"), rather than waiting for
    /// `numSub` responses that will never all arrive.
    pub fn unary_resolved(&self) -> bool {
        matches!(&*self.accumulator.lock(), Accumulator::Unary(Some(_)))
    }

    /// Consume the resolve sender. Idempotent: returns `None` if already taken.
    pub fn take_resolver(&self) -> Option<oneshot::Sender<FanInOutcome>> {
        self.resolve.lock().take()
    }
}

/// An in-flight broadcast-with-ack request (base spec §3, §4.7).
pub struct PendingAck {
    pub on_client_count: Mutex<Box<dyn FnMut(usize) + Send>>,
    pub on_ack: Mutex<Box<dyn FnMut(serde_json::Value) + Send>>,
}

impl PendingAck {
    pub fn new(
        on_client_count: Box<dyn FnMut(usize) + Send>,
        on_ack: Box<dyn FnMut(serde_json::Value) + Send>,
    ) -> Self {
        Self {
            on_client_count: Mutex::new(on_client_count),
            on_ack: Mutex::new(on_ack),
        }
    }
}

/// The two correlation maps (base spec §3, §5). A `requestId` lives in at
/// most one of them at a time: callers choose which map to insert into
/// based on whether the request expects a fan-in result (`requests`) or
/// tracks a broadcast-with-ack (`ack_requests`).
#[derive(Default)]
pub struct CorrelationTables {
    pub requests: DashMap<String, PendingRequest>,
    pub ack_requests: DashMap<String, PendingAck>,
}

impl CorrelationTables {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_resolver_is_idempotent() {
        let (tx, _rx) = oneshot::channel();
        let pending = PendingRequest::new(
            RequestKind::AllRooms,
            2,
            1,
            Accumulator::Rooms(HashSet::new()),
            tx,
        );
        assert!(pending.take_resolver().is_some());
        assert!(pending.take_resolver().is_none());
    }

    #[test]
    fn quorum_reached_uses_post_increment_value() {
        let (tx, _rx) = oneshot::channel();
        let pending = PendingRequest::new(
            RequestKind::AllRooms,
            2,
            1,
            Accumulator::Rooms(HashSet::new()),
            tx,
        );
        assert!(!pending.quorum_reached());
        pending.record_response();
        assert!(pending.quorum_reached());
    }
}
