//! Adapter Facade (base spec §4.8): fuses local delegation with cross-node
//! fan-out behind the public operations a Socket.IO-style server calls.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::ack::AckAggregator;
use crate::broker::{Broker, ErrorHandler};
use crate::codec::encode_binary;
use crate::config::AdapterConfig;
use crate::correlation::CorrelationTables;
use crate::error::Result;
use crate::id;
use crate::local::{LocalAdapter, OnAck, OnClientCount, SocketDetails};
use crate::namer::ChannelNamer;
use crate::packet::{EncodedBroadcastOptions, Packet};
use crate::protocol::{BroadcastPacket, Request, RequestKind, ServerId, SocketResponse};
use crate::request_client::{FanInResult, RequestClient};
use crate::request_server::RequestServer;
use crate::subscriber::SubscriberLoops;

/// `ServerSideEmit`'s `args` is conceptually the variadic argument list a
/// caller would otherwise spread across a function call; on the wire it
/// travels as a single JSON value, normally an array. An empty array (or a
/// bare `null`, which callers use interchangeably for "no payload") is
/// rejected before any broker I/O happens, matching the original
/// implementation's `packet cannot be empty` guard (base spec §7, §8).
fn validate_server_side_emit_args(data: &Value) -> Result<()> {
    let is_empty = match data {
        Value::Array(items) => items.is_empty(),
        Value::Null => true,
        _ => false,
    };
    if is_empty {
        return Err(crate::error::AdapterError::EmptyPacket);
    }
    Ok(())
}

/// A single cross-node adapter instance for one namespace.
pub struct Adapter {
    uid: ServerId,
    namer: ChannelNamer,
    config: AdapterConfig,
    broker: Arc<dyn Broker>,
    local: Arc<dyn LocalAdapter>,
    request_client: Arc<RequestClient>,
    ack_aggregator: AckAggregator,
    subscriber: Mutex<Option<SubscriberLoops>>,
}

impl Adapter {
    /// Construct an adapter for `local`'s namespace and start its two
    /// subscriber loops (base spec §4.3).
    pub async fn new(
        config: AdapterConfig,
        broker: Arc<dyn Broker>,
        local: Arc<dyn LocalAdapter>,
    ) -> Result<Self> {
        let uid = id::generate();
        let namer = ChannelNamer::new(&config.key, local.nsp());
        let tables = Arc::new(CorrelationTables::new());

        // Install a default error listener (base spec §6, §9): absent one,
        // the broker itself only warns once and then falls silent.
        let default_error_handler: ErrorHandler = Arc::new(|err| {
            tracing::warn!(error = %err, "broker reported an error");
        });
        broker.set_error_handler(Some(default_error_handler));

        let request_client = Arc::new(RequestClient::new(
            uid.clone(),
            namer.clone(),
            Arc::clone(&broker),
            Arc::clone(&tables),
            config.requests_timeout,
            Arc::clone(&local),
        ));
        let request_server = Arc::new(RequestServer::new(
            uid.clone(),
            namer.clone(),
            Arc::clone(&broker),
            Arc::clone(&tables),
            Arc::clone(&local),
            Arc::clone(&config.parser),
            config.publish_on_specific_response_channel,
        ));
        let ack_aggregator = AckAggregator::new(
            uid.clone(),
            namer.clone(),
            Arc::clone(&broker),
            Arc::clone(&tables),
            config.requests_timeout,
        );

        let subscriber = SubscriberLoops::spawn(
            namer.clone(),
            uid.clone(),
            Arc::clone(&broker),
            Arc::clone(&local),
            Arc::clone(&config.parser),
            Arc::clone(&request_server),
            Arc::clone(&request_client),
        )
        .await?;

        Ok(Self {
            uid,
            namer,
            config,
            broker,
            local,
            request_client,
            ack_aggregator,
            subscriber: Mutex::new(Some(subscriber)),
        })
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// `Broadcast(packet, opts)` (base spec §4.8): publish cross-node unless
    /// `.local`, using the single-room channel optimization when exactly one
    /// room is targeted, then always deliver locally.
    pub async fn broadcast(&self, mut packet: Packet, opts: EncodedBroadcastOptions) -> Result<()> {
        packet.nsp = self.local.nsp().to_string();

        if !opts.flags.local {
            let broadcast_packet = BroadcastPacket {
                uid: self.uid.clone(),
                packet: packet.clone(),
                opts: opts.clone(),
            };
            let payload = encode_binary(self.config.parser.as_ref(), &broadcast_packet)?;
            let channel = match opts.single_room() {
                Some(room) => self.namer.room_channel(room),
                None => self.namer.broadcast_channel().to_string(),
            };
            self.broker.publish(&channel, payload).await?;
        }

        self.local.broadcast(&packet, &opts);
        Ok(())
    }

    /// `BroadcastWithAck(...)` (base spec §4.7, §4.8): local delivery always
    /// happens; cross-node acks are layered onto the same caller-supplied
    /// callbacks when not `.local`.
    pub async fn broadcast_with_ack(
        &self,
        mut packet: Packet,
        opts: EncodedBroadcastOptions,
        on_client_count: OnClientCount,
        on_ack: OnAck,
    ) -> Result<()> {
        packet.nsp = self.local.nsp().to_string();

        let shared_count: Arc<Mutex<OnClientCount>> = Arc::new(Mutex::new(on_client_count));
        let shared_ack: Arc<Mutex<OnAck>> = Arc::new(Mutex::new(on_ack));

        let local_count: OnClientCount = {
            let shared = Arc::clone(&shared_count);
            Box::new(move |n| (shared.lock())(n))
        };
        let local_ack: OnAck = {
            let shared = Arc::clone(&shared_ack);
            Box::new(move |v| (shared.lock())(v))
        };
        self.local.broadcast_with_ack(&packet, &opts, local_count, local_ack);

        if !opts.flags.local {
            let cross_count: OnClientCount = {
                let shared = Arc::clone(&shared_count);
                Box::new(move |n| (shared.lock())(n))
            };
            let cross_ack: OnAck = {
                let shared = Arc::clone(&shared_ack);
                Box::new(move |v| (shared.lock())(v))
            };
            self.ack_aggregator
                .start(self.config.parser.as_ref(), &packet, &opts, cross_count, cross_ack)
                .await?;
        }
        Ok(())
    }

    /// `AllRooms()` (base spec §4.6, §4.8).
    pub async fn all_rooms(&self) -> Result<FanInResult<Vec<String>>> {
        self.request_client.all_rooms().await
    }

    /// `FetchSockets(opts)` (base spec §4.8): local fetch always happens and
    /// seeds the accumulator; `.local` returns it immediately, otherwise a
    /// `REMOTE_FETCH` fan-in merges in peer results.
    pub async fn fetch_sockets(&self, opts: EncodedBroadcastOptions) -> Result<FanInResult<Vec<SocketDetails>>> {
        let local_details = self.local.fetch_sockets(&opts).await;
        if opts.flags.local {
            return Ok(FanInResult {
                data: local_details,
                error: None,
            });
        }

        let local_as_response: Vec<SocketResponse> = local_details
            .into_iter()
            .map(|d| SocketResponse {
                id: d.id,
                handshake: d.handshake,
                rooms: d.rooms,
                data: d.data,
            })
            .collect();
        let result = self.request_client.remote_fetch(opts, local_as_response).await?;
        let details = result
            .data
            .into_iter()
            .map(|s| SocketDetails {
                id: s.id,
                handshake: s.handshake,
                rooms: s.rooms,
                data: s.data,
            })
            .collect();
        Ok(FanInResult {
            data: details,
            error: result.error,
        })
    }

    /// `AddSockets(opts, rooms)` (base spec §4.8): local effect always
    /// applies; cross-node propagation is fire-and-forget unless `.local`.
    pub async fn add_sockets(&self, opts: EncodedBroadcastOptions, rooms: Vec<String>) -> Result<()> {
        self.local.add_sockets(&opts, &rooms);
        if !opts.flags.local {
            let mut request = Request::new(self.uid.clone(), RequestKind::RemoteJoin);
            request.opts = Some(opts);
            request.rooms = Some(rooms);
            self.request_client.publish_fire_and_forget(request).await?;
        }
        Ok(())
    }

    /// `DelSockets(opts, rooms)` (base spec §4.8).
    pub async fn del_sockets(&self, opts: EncodedBroadcastOptions, rooms: Vec<String>) -> Result<()> {
        self.local.del_sockets(&opts, &rooms);
        if !opts.flags.local {
            let mut request = Request::new(self.uid.clone(), RequestKind::RemoteLeave);
            request.opts = Some(opts);
            request.rooms = Some(rooms);
            self.request_client.publish_fire_and_forget(request).await?;
        }
        Ok(())
    }

    /// `DisconnectSockets(opts, close)` (base spec §4.8).
    pub async fn disconnect_sockets(&self, opts: EncodedBroadcastOptions, close: bool) -> Result<()> {
        self.local.disconnect_sockets(&opts, close);
        if !opts.flags.local {
            let mut request = Request::new(self.uid.clone(), RequestKind::RemoteDisconnect);
            request.opts = Some(opts);
            request.close = Some(close);
            self.request_client.publish_fire_and_forget(request).await?;
        }
        Ok(())
    }

    /// `ServerSideEmit(args)` fire-and-forget path (base spec §4.8). An empty
    /// `args` array is a validation error, returned directly without any
    /// broker I/O (base spec §7, §8).
    pub async fn server_side_emit(&self, data: Value) -> Result<()> {
        validate_server_side_emit_args(&data)?;
        let mut request = Request::new(self.uid.clone(), RequestKind::ServerSideEmit);
        request.data = Some(data);
        self.request_client.publish_fire_and_forget(request).await
    }

    /// `ServerSideEmit(args, ack)` acking path (base spec §4.6, §4.8).
    pub async fn server_side_emit_with_ack(&self, data: Value) -> Result<FanInResult<Vec<Value>>> {
        validate_server_side_emit_args(&data)?;
        self.request_client.server_side_emit_with_ack(data).await
    }

    /// Single-`sid` remote join, used by remote socket handles.
    pub async fn remote_join(&self, sid: &str, room: &str) -> Result<()> {
        self.request_client.remote_join(sid, room).await
    }

    /// Single-`sid` remote leave, used by remote socket handles.
    pub async fn remote_leave(&self, sid: &str, room: &str) -> Result<()> {
        self.request_client.remote_leave(sid, room).await
    }

    /// Single-`sid` remote disconnect, used by remote socket handles.
    pub async fn remote_disconnect(&self, sid: &str, close: bool) -> Result<()> {
        self.request_client.remote_disconnect(sid, close).await
    }

    /// `ServerCount()` (base spec §4.9).
    pub async fn server_count(&self) -> Result<usize> {
        self.request_client.server_count().await
    }

    /// `Close()` (base spec §4.10): unsubscribe both loops, then release
    /// broker resources. Idempotent.
    pub async fn close(&self) -> Result<()> {
        let maybe_subscriber = self.subscriber.lock().take();
        if let Some(mut subscriber) = maybe_subscriber {
            subscriber.shutdown().await;
        }
        self.broker.set_error_handler(None);
        self.broker.close().await
    }
}
