//! Request Client: issues requests to peers and collects fan-in responses
//! (base spec §4.6).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::broker::Broker;
use crate::codec::encode_json;
use crate::correlation::{Accumulator, CorrelationTables, FanInOutcome, PendingRequest};
use crate::error::{AdapterError, Result};
use crate::id;
use crate::local::LocalAdapter;
use crate::namer::ChannelNamer;
use crate::packet::EncodedBroadcastOptions;
use crate::protocol::{Request, RequestKind, Response, ServerId, SocketResponse};

/// The result of a fan-in call: whatever data was collected, plus an error
/// if the collection ended by timeout rather than quorum (base spec §4.6
/// step 5, §8 boundary behaviors).
pub struct FanInResult<T> {
    pub data: T,
    pub error: Option<AdapterError>,
}

impl<T> FanInResult<T> {
    fn ok(data: T) -> Self {
        Self { data, error: None }
    }
}

pub struct RequestClient {
    uid: ServerId,
    namer: ChannelNamer,
    broker: Arc<dyn Broker>,
    tables: Arc<CorrelationTables>,
    requests_timeout: Duration,
    local: Arc<dyn LocalAdapter>,
}

impl RequestClient {
    pub fn new(
        uid: ServerId,
        namer: ChannelNamer,
        broker: Arc<dyn Broker>,
        tables: Arc<CorrelationTables>,
        requests_timeout: Duration,
        local: Arc<dyn LocalAdapter>,
    ) -> Self {
        Self {
            uid,
            namer,
            broker,
            tables,
            requests_timeout,
            local,
        }
    }

    /// `ServerCount()` (base spec §4.9): number of subscribers on
    /// `requestChannel`, used as the quorum estimate.
    pub async fn server_count(&self) -> Result<usize> {
        self.broker.server_count(self.namer.request_channel()).await
    }

    /// `AllRooms` fan-in (base spec §4.6, §4.8).
    pub async fn all_rooms(&self) -> Result<FanInResult<Vec<String>>> {
        let local_rooms: HashSet<String> = self.local.rooms().into_iter().collect();
        let num_sub = self.server_count().await?;
        if num_sub <= 1 {
            return Ok(FanInResult::ok(local_rooms.into_iter().collect()));
        }

        let request = Request::new(self.uid.clone(), RequestKind::AllRooms);
        let outcome = self
            .fan_in(
                request,
                RequestKind::AllRooms,
                num_sub,
                1,
                Accumulator::Rooms(local_rooms),
                "allRooms",
            )
            .await?;
        let rooms = match outcome.accumulator {
            Accumulator::Rooms(set) => set.into_iter().collect(),
            _ => unreachable!("allRooms always uses a Rooms accumulator"),
        };
        Ok(FanInResult {
            data: rooms,
            error: outcome.error,
        })
    }

    /// `REMOTE_FETCH` fan-in (base spec §4.5, §4.8). `local_sockets` must
    /// already contain this node's own matching sockets, per the seeding
    /// rule in §4.6.
    pub async fn remote_fetch(
        &self,
        opts: EncodedBroadcastOptions,
        local_sockets: Vec<SocketResponse>,
    ) -> Result<FanInResult<Vec<SocketResponse>>> {
        let num_sub = self.server_count().await?;
        if num_sub <= 1 {
            return Ok(FanInResult::ok(local_sockets));
        }

        let mut request = Request::new(self.uid.clone(), RequestKind::RemoteFetch);
        request.opts = Some(opts);
        let outcome = self
            .fan_in(
                request,
                RequestKind::RemoteFetch,
                num_sub,
                1,
                Accumulator::Sockets(local_sockets),
                "remoteFetch",
            )
            .await?;
        let sockets = match outcome.accumulator {
            Accumulator::Sockets(list) => list,
            _ => unreachable!("remoteFetch always uses a Sockets accumulator"),
        };
        Ok(FanInResult {
            data: sockets,
            error: outcome.error,
        })
    }

    /// `SOCKETS` fan-in, serviced on the peer side per the request-kind
    /// table (base spec §4.5) even though the facade itself fans out via
    /// `REMOTE_FETCH`; kept for completeness of the wire protocol.
    pub async fn sockets(&self, rooms: Vec<String>) -> Result<FanInResult<Vec<SocketResponse>>> {
        let local_ids = self.local.local_socket_ids(&rooms);
        let local_sockets: Vec<SocketResponse> = local_ids
            .into_iter()
            .map(|id| SocketResponse {
                id,
                handshake: None,
                rooms: Vec::new(),
                data: None,
            })
            .collect();
        let num_sub = self.server_count().await?;
        if num_sub <= 1 {
            return Ok(FanInResult::ok(local_sockets));
        }
        let mut request = Request::new(self.uid.clone(), RequestKind::Sockets);
        request.rooms = Some(rooms);
        let outcome = self
            .fan_in(
                request,
                RequestKind::Sockets,
                num_sub,
                1,
                Accumulator::Sockets(local_sockets),
                "sockets",
            )
            .await?;
        let sockets = match outcome.accumulator {
            Accumulator::Sockets(list) => list,
            _ => unreachable!("sockets always uses a Sockets accumulator"),
        };
        Ok(FanInResult {
            data: sockets,
            error: outcome.error,
        })
    }

    /// Single-`sid` `REMOTE_JOIN`/`REMOTE_LEAVE`/`REMOTE_DISCONNECT`. Any
    /// single peer response completes the request; the timer bounds the
    /// case where `sid` belongs to no node (base spec §4.6).
    async fn unary_remote_op(&self, kind: RequestKind, mut request: Request) -> Result<()> {
        let num_sub = self.server_count().await?;
        if num_sub <= 1 {
            return Ok(());
        }
        let request_id = id::generate();
        request.request_id = Some(request_id.clone());
        self.fan_in_raw(request_id, request, kind, num_sub, 0, Accumulator::Unary(None), "remoteOp")
            .await?;
        Ok(())
    }

    pub async fn remote_join(&self, sid: &str, room: &str) -> Result<()> {
        let mut request = Request::new(self.uid.clone(), RequestKind::RemoteJoin);
        request.sid = Some(sid.to_string());
        request.room = Some(room.to_string());
        self.unary_remote_op(RequestKind::RemoteJoin, request).await
    }

    pub async fn remote_leave(&self, sid: &str, room: &str) -> Result<()> {
        let mut request = Request::new(self.uid.clone(), RequestKind::RemoteLeave);
        request.sid = Some(sid.to_string());
        request.room = Some(room.to_string());
        self.unary_remote_op(RequestKind::RemoteLeave, request).await
    }

    pub async fn remote_disconnect(&self, sid: &str, close: bool) -> Result<()> {
        let mut request = Request::new(self.uid.clone(), RequestKind::RemoteDisconnect);
        request.sid = Some(sid.to_string());
        request.close = Some(close);
        self.unary_remote_op(RequestKind::RemoteDisconnect, request)
            .await
    }

    /// `SERVER_SIDE_EMIT` with an ack callback. `numSub := ServerCount() - 1`
    /// (ignore self); zero peers resolves immediately with an empty list
    /// (base spec §4.6, scenario 6).
    pub async fn server_side_emit_with_ack(
        &self,
        data: serde_json::Value,
    ) -> Result<FanInResult<Vec<serde_json::Value>>> {
        let total = self.server_count().await?;
        let num_sub = total.saturating_sub(1);
        if num_sub == 0 {
            return Ok(FanInResult::ok(Vec::new()));
        }
        let mut request = Request::new(self.uid.clone(), RequestKind::ServerSideEmit);
        request.data = Some(data);
        let outcome = self
            .fan_in(
                request,
                RequestKind::ServerSideEmit,
                num_sub,
                0,
                Accumulator::ServerSideEmit(Vec::new()),
                "serverSideEmit",
            )
            .await?;
        let acks = match outcome.accumulator {
            Accumulator::ServerSideEmit(list) => list,
            _ => unreachable!("serverSideEmit always uses a ServerSideEmit accumulator"),
        };
        Ok(FanInResult {
            data: acks,
            error: outcome.error,
        })
    }

    /// Fire-and-forget publish with no correlation entry: `SERVER_SIDE_EMIT`
    /// without an ack, and the admin `AddSockets`/`DelSockets`/
    /// `DisconnectSockets` cross-node paths (base spec §4.8).
    pub async fn publish_fire_and_forget(&self, request: Request) -> Result<()> {
        let payload = encode_json(&request)?;
        self.broker.publish(self.namer.request_channel(), payload).await
    }

    async fn fan_in(
        &self,
        request: Request,
        kind: RequestKind,
        num_sub: usize,
        initial_msg_count: usize,
        accumulator: Accumulator,
        what: &'static str,
    ) -> Result<FanInOutcome> {
        let request_id = id::generate();
        self.fan_in_raw(request_id, request, kind, num_sub, initial_msg_count, accumulator, what)
            .await
    }

    async fn fan_in_raw(
        &self,
        request_id: String,
        mut request: Request,
        kind: RequestKind,
        num_sub: usize,
        initial_msg_count: usize,
        accumulator: Accumulator,
        what: &'static str,
    ) -> Result<FanInOutcome> {
        request.request_id = Some(request_id.clone());
        let (tx, rx) = oneshot::channel();
        let pending = PendingRequest::new(kind, num_sub, initial_msg_count, accumulator, tx);
        self.tables.requests.insert(request_id.clone(), pending);

        let timeout_tables = Arc::clone(&self.tables);
        let timeout_id = request_id.clone();
        let timeout_duration = self.requests_timeout;
        let timeout_expected = num_sub;
        tokio::spawn(async move {
            tokio::time::sleep(timeout_duration).await;
            if let Some((_, pending)) = timeout_tables.requests.remove(&timeout_id) {
                let got = pending.msg_count.load(std::sync::atomic::Ordering::SeqCst);
                if let Some(resolver) = pending.take_resolver() {
                    let _ = resolver.send(FanInOutcome {
                        accumulator: pending.accumulator.into_inner(),
                        error: Some(AdapterError::Timeout {
                            what,
                            got,
                            expected: timeout_expected,
                        }),
                    });
                }
            }
        });

        let payload = encode_json(&request)?;
        self.broker.publish(self.namer.request_channel(), payload).await?;

        rx.await.map_err(|_| AdapterError::Broker(
            "fan-in correlation entry dropped without resolving".to_string(),
        ))
    }

    /// Merge an incoming response into its correlation entry, if any.
    /// Returns `true` if a matching entry (pending request or pending ack)
    /// was found. Per base spec §4.6 step 4: look up `requests` first, then
    /// `ackRequests`, else drop.
    pub fn handle_response(&self, response: Response) -> bool {
        if let Some(pending) = self.tables.requests.get(&response.request_id) {
            merge_response(&pending, &response);
            let reached = pending.quorum_reached() || pending.unary_resolved();
            drop(pending);
            if reached {
                if let Some((_, pending)) = self.tables.requests.remove(&response.request_id) {
                    if let Some(resolver) = pending.take_resolver() {
                        let _ = resolver.send(FanInOutcome {
                            accumulator: pending.accumulator.into_inner(),
                            error: None,
                        });
                    }
                }
            }
            return true;
        }

        if let Some(pending) = self.tables.ack_requests.get(&response.request_id) {
            match response.kind {
                Some(RequestKind::BroadcastClientCount) => {
                    if let Some(count) = response.client_count {
                        (pending.on_client_count.lock())(count);
                    }
                }
                Some(RequestKind::BroadcastAck) => {
                    if let Some(args) = response.packet {
                        (pending.on_ack.lock())(args);
                    }
                }
                _ => {
                    tracing::warn!(request_id = %response.request_id, "response for ack request with unexpected kind");
                }
            }
            return true;
        }

        false
    }
}

fn merge_response(pending: &PendingRequest, response: &Response) {
    pending.record_response();
    let mut accumulator = pending.accumulator.lock();
    match &mut *accumulator {
        Accumulator::Rooms(set) => {
            if let Some(rooms) = &response.rooms {
                set.extend(rooms.iter().cloned());
            }
        }
        Accumulator::Sockets(list) => {
            if let Some(sockets) = &response.sockets {
                list.extend(sockets.iter().cloned());
            }
        }
        Accumulator::ServerSideEmit(list) => {
            if let Some(data) = &response.data {
                list.push(data.clone());
            }
        }
        Accumulator::Unary(slot) => {
            if slot.is_none() {
                *slot = Some(response.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_broker::MemoryBroker;
    use crate::packet::EncodedBroadcastOptions;
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::json;

    struct StubLocal;

    #[async_trait]
    impl LocalAdapter for StubLocal {
        fn nsp(&self) -> &str {
            "/"
        }
        fn broadcast(&self, _packet: &crate::packet::Packet, _opts: &EncodedBroadcastOptions) {}
        fn broadcast_with_ack(
            &self,
            _packet: &crate::packet::Packet,
            _opts: &EncodedBroadcastOptions,
            _on_client_count: crate::local::OnClientCount,
            _on_ack: crate::local::OnAck,
        ) {
        }
        async fn fetch_sockets(&self, _opts: &EncodedBroadcastOptions) -> Vec<crate::local::SocketDetails> {
            Vec::new()
        }
        fn add_sockets(&self, _opts: &EncodedBroadcastOptions, _rooms: &[String]) {}
        fn del_sockets(&self, _opts: &EncodedBroadcastOptions, _rooms: &[String]) {}
        fn disconnect_sockets(&self, _opts: &EncodedBroadcastOptions, _close: bool) {}
        fn rooms(&self) -> Vec<String> {
            vec!["local-room".to_string()]
        }
        fn holds_room(&self, _room: &str) -> bool {
            false
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

    fn make_client(broker: Arc<MemoryBroker>) -> RequestClient {
        RequestClient::new(
            "AAAAAA".to_string(),
            ChannelNamer::new("socket.io", "/"),
            broker,
            Arc::new(CorrelationTables::new()),
            Duration::from_millis(50),
            Arc::new(StubLocal),
        )
    }

    #[tokio::test]
    async fn all_rooms_resolves_immediately_when_alone() {
        let broker = Arc::new(MemoryBroker::new());
        let client = make_client(broker);
        let result = client.all_rooms().await.unwrap();
        assert_eq!(result.data, vec!["local-room".to_string()]);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn fan_in_times_out_when_no_peers_respond() {
        let broker = Arc::new(MemoryBroker::new());
        let client = make_client(Arc::clone(&broker));
        // Force numSub > 1 by pre-subscribing two fake peers to the request channel.
        let _subscriber_a = broker
            .subscribe(vec!["socket.io-request#/#".to_string()])
            .await
            .unwrap();
        let _subscriber_b = broker
            .subscribe(vec!["socket.io-request#/#".to_string()])
            .await
            .unwrap();
        let result = client.all_rooms().await.unwrap();
        assert!(result.error.is_some());
        assert!(matches!(result.error, Some(AdapterError::Timeout { .. })));
    }

    #[tokio::test]
    async fn handle_response_resolves_on_quorum() {
        let broker = Arc::new(MemoryBroker::new());
        let client = Arc::new(make_client(Arc::clone(&broker)));
        let _subscriber_a = broker
            .subscribe(vec!["socket.io-request#/#".to_string()])
            .await
            .unwrap();
        let _subscriber_b = broker
            .subscribe(vec!["socket.io-request#/#".to_string()])
            .await
            .unwrap();

        let client_for_task = Arc::clone(&client);
        let handle = tokio::spawn(async move { client_for_task.all_rooms().await.unwrap() });

        // Give the spawned fan-in time to register its correlation entry.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let request_id = client
            .tables
            .requests
            .iter()
            .next()
            .map(|entry| entry.key().clone())
            .expect("pending request registered");

        let mut response = Response::new(request_id);
        response.rooms = Some(vec!["peer-room".to_string()]);
        assert!(client.handle_response(response));

        let result = handle.await.unwrap();
        assert!(result.error.is_none());
        let mut rooms = result.data;
        rooms.sort();
        assert_eq!(rooms, vec!["local-room".to_string(), "peer-room".to_string()]);
    }

    #[test]
    fn server_side_emit_ack_data_round_trips_through_json_value() {
        let value = json!({"ok": true});
        assert_eq!(value["ok"], json!(true));
    }

    #[tokio::test]
    async fn remote_fetch_publishes_opts_on_the_wire_and_merges_peer_sockets() {
        let broker = Arc::new(MemoryBroker::new());
        let client = Arc::new(make_client(Arc::clone(&broker)));
        let mut requests = broker
            .subscribe(vec!["socket.io-request#/#".to_string()])
            .await
            .unwrap();
        let _subscriber_b = broker
            .subscribe(vec!["socket.io-request#/#".to_string()])
            .await
            .unwrap();

        let opts = EncodedBroadcastOptions {
            rooms: vec!["r1".to_string()],
            ..Default::default()
        };
        let local_sockets = vec![SocketResponse {
            id: "local-sid".to_string(),
            handshake: None,
            rooms: Vec::new(),
            data: None,
        }];

        let client_for_task = Arc::clone(&client);
        let expected_opts = opts.clone();
        let handle = tokio::spawn(async move { client_for_task.remote_fetch(expected_opts, local_sockets).await });

        // The published request must carry the filter in `opts`, not `data`,
        // so a peer's handle_remote_fetch actually sees the room filter.
        let message = requests.next().await.unwrap();
        let published: Request = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(published.opts, Some(opts));
        assert!(published.data.is_none());

        let request_id = published.request_id.clone().unwrap();
        let mut response = Response::new(request_id);
        response.sockets = Some(vec![SocketResponse {
            id: "peer-sid".to_string(),
            handshake: None,
            rooms: Vec::new(),
            data: None,
        }]);
        assert!(client.handle_response(response));

        let result = handle.await.unwrap().unwrap();
        assert!(result.error.is_none());
        let mut ids: Vec<String> = result.data.into_iter().map(|s| s.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["local-sid".to_string(), "peer-sid".to_string()]);
    }

    #[tokio::test]
    async fn unary_remote_op_resolves_on_first_response_without_waiting_for_quorum() {
        let broker = Arc::new(MemoryBroker::new());
        let client = Arc::new(RequestClient::new(
            "AAAAAA".to_string(),
            ChannelNamer::new("socket.io", "/"),
            Arc::clone(&broker),
            Arc::new(CorrelationTables::new()),
            Duration::from_secs(2),
            Arc::new(StubLocal),
        ));
        let _subscriber_a = broker
            .subscribe(vec!["socket.io-request#/#".to_string()])
            .await
            .unwrap();
        let _subscriber_b = broker
            .subscribe(vec!["socket.io-request#/#".to_string()])
            .await
            .unwrap();

        let client_for_task = Arc::clone(&client);
        let start = std::time::Instant::now();
        let handle = tokio::spawn(async move { client_for_task.remote_join("sid-1", "room-1").await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let request_id = client
            .tables
            .requests
            .iter()
            .next()
            .map(|entry| entry.key().clone())
            .expect("pending unary request registered");

        assert!(client.handle_response(Response::new(request_id)));
        handle.await.unwrap().unwrap();

        assert!(
            start.elapsed() < Duration::from_millis(500),
            "a single peer response must resolve a unary remote op immediately, not after the 2s timeout"
        );
    }
}
