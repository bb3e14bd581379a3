//! Request Server: services requests from peers (base spec §4.5).

use std::sync::Arc;

use crate::broker::{Broker, ExactMessage};
use crate::codec::{decode_payload, encode_binary, encode_json, BinaryPacker};
use crate::correlation::CorrelationTables;
use crate::error::Result;
use crate::local::LocalAdapter;
use crate::namer::ChannelNamer;
use crate::protocol::{Request, RequestKind, Response, ServerId, SocketResponse};
use crate::request_client::RequestClient;

pub struct RequestServer {
    uid: ServerId,
    namer: ChannelNamer,
    broker: Arc<dyn Broker>,
    tables: Arc<CorrelationTables>,
    local: Arc<dyn LocalAdapter>,
    packer: Arc<dyn BinaryPacker>,
    publish_on_specific_response_channel: bool,
}

impl RequestServer {
    pub fn new(
        uid: ServerId,
        namer: ChannelNamer,
        broker: Arc<dyn Broker>,
        tables: Arc<CorrelationTables>,
        local: Arc<dyn LocalAdapter>,
        packer: Arc<dyn BinaryPacker>,
        publish_on_specific_response_channel: bool,
    ) -> Self {
        Self {
            uid,
            namer,
            broker,
            tables,
            local,
            packer,
            publish_on_specific_response_channel,
        }
    }

    fn response_target(&self, origin_uid: &str) -> String {
        if self.publish_on_specific_response_channel {
            self.namer.specific_response_channel(origin_uid)
        } else {
            self.namer.response_channel().to_string()
        }
    }

    async fn publish_response_json(&self, origin_uid: &str, response: Response) -> Result<()> {
        let payload = encode_json(&response)?;
        self.broker.publish(&self.response_target(origin_uid), payload).await
    }

    async fn publish_response_binary(&self, origin_uid: &str, response: Response) -> Result<()> {
        let payload = encode_binary(self.packer.as_ref(), &response)?;
        self.broker.publish(&self.response_target(origin_uid), payload).await
    }

    /// Dispatches one message received on the exact subscription
    /// (`requestChannel` / `responseChannel` / `specificResponseChannel`),
    /// per base spec §4.3/§4.5 routing-by-prefix rule.
    pub async fn handle_exact_message(&self, message: ExactMessage, request_client: &RequestClient) {
        if message.channel.starts_with(self.namer.response_channel()) {
            match decode_payload::<Response>(self.packer.as_ref(), &message.payload) {
                Ok(response) => {
                    request_client.handle_response(response);
                }
                Err(err) => {
                    tracing::debug!(channel = %message.channel, error = %err, "dropping undecodable response");
                }
            }
            return;
        }

        if message.channel == self.namer.request_channel() {
            match decode_payload::<Request>(self.packer.as_ref(), &message.payload) {
                Ok(request) => {
                    if let Err(err) = self.dispatch(request).await {
                        tracing::warn!(error = %err, "request server dispatch failed");
                    }
                }
                Err(err) => {
                    tracing::debug!(channel = %message.channel, error = %err, "dropping undecodable request");
                }
            }
            return;
        }

        tracing::trace!(channel = %message.channel, "dropping message on unrecognized exact channel");
    }

    async fn dispatch(&self, request: Request) -> Result<()> {
        match request.kind {
            RequestKind::Sockets => self.handle_sockets(request).await,
            RequestKind::AllRooms => self.handle_all_rooms(request).await,
            RequestKind::RemoteJoin => self.handle_remote_join(request).await,
            RequestKind::RemoteLeave => self.handle_remote_leave(request).await,
            RequestKind::RemoteDisconnect => self.handle_remote_disconnect(request).await,
            RequestKind::RemoteFetch => self.handle_remote_fetch(request).await,
            RequestKind::ServerSideEmit => self.handle_server_side_emit(request).await,
            RequestKind::Broadcast => self.handle_broadcast(request).await,
            RequestKind::BroadcastClientCount | RequestKind::BroadcastAck => {
                tracing::trace!("broadcast-count/ack kinds are responses, not requests; ignoring");
                Ok(())
            }
        }
    }

    async fn handle_sockets(&self, request: Request) -> Result<()> {
        let Some(request_id) = request.request_id.clone() else {
            return Ok(());
        };
        if self.tables.requests.contains_key(&request_id) {
            return Ok(()); // we are the originator
        }
        let rooms = request.rooms.unwrap_or_default();
        let sockets = self
            .local
            .local_socket_ids(&rooms)
            .into_iter()
            .map(|id| SocketResponse {
                id,
                handshake: None,
                rooms: Vec::new(),
                data: None,
            })
            .collect();
        let mut response = Response::new(request_id);
        response.sockets = Some(sockets);
        self.publish_response_json(&request.uid, response).await
    }

    async fn handle_all_rooms(&self, request: Request) -> Result<()> {
        let Some(request_id) = request.request_id.clone() else {
            return Ok(());
        };
        if self.tables.requests.contains_key(&request_id) {
            return Ok(());
        }
        let mut response = Response::new(request_id);
        response.rooms = Some(self.local.rooms());
        self.publish_response_json(&request.uid, response).await
    }

    async fn handle_remote_join(&self, request: Request) -> Result<()> {
        if let Some(opts) = &request.opts {
            let rooms = request.rooms.clone().unwrap_or_default();
            self.local.add_sockets(opts, &rooms);
            return Ok(());
        }
        let (Some(sid), Some(room)) = (&request.sid, &request.room) else {
            return Ok(());
        };
        if self.local.join(sid, room) {
            if let Some(request_id) = request.request_id.clone() {
                self.publish_response_json(&request.uid, Response::new(request_id)).await?;
            }
        }
        Ok(())
    }

    async fn handle_remote_leave(&self, request: Request) -> Result<()> {
        if let Some(opts) = &request.opts {
            let rooms = request.rooms.clone().unwrap_or_default();
            self.local.del_sockets(opts, &rooms);
            return Ok(());
        }
        let (Some(sid), Some(room)) = (&request.sid, &request.room) else {
            return Ok(());
        };
        if self.local.leave(sid, room) {
            if let Some(request_id) = request.request_id.clone() {
                self.publish_response_json(&request.uid, Response::new(request_id)).await?;
            }
        }
        Ok(())
    }

    async fn handle_remote_disconnect(&self, request: Request) -> Result<()> {
        let close = request.close.unwrap_or(false);
        if let Some(opts) = &request.opts {
            self.local.disconnect_sockets(opts, close);
            return Ok(());
        }
        let Some(sid) = &request.sid else {
            return Ok(());
        };
        if self.local.disconnect(sid, close) {
            if let Some(request_id) = request.request_id.clone() {
                self.publish_response_json(&request.uid, Response::new(request_id)).await?;
            }
        }
        Ok(())
    }

    async fn handle_remote_fetch(&self, request: Request) -> Result<()> {
        let Some(request_id) = request.request_id.clone() else {
            return Ok(());
        };
        if self.tables.requests.contains_key(&request_id) {
            return Ok(()); // we are the originator
        }
        let opts = request.opts.clone().unwrap_or_default();
        let sockets = self
            .local
            .fetch_sockets(&opts)
            .await
            .into_iter()
            .map(|details| SocketResponse {
                id: details.id,
                handshake: details.handshake,
                rooms: details.rooms,
                data: details.data,
            })
            .collect();
        let mut response = Response::new(request_id);
        response.sockets = Some(sockets);
        self.publish_response_json(&request.uid, response).await
    }

    async fn handle_server_side_emit(&self, request: Request) -> Result<()> {
        if request.uid == self.uid {
            return Ok(());
        }
        let Some(data) = request.data.clone() else {
            return Ok(());
        };
        self.local.on_server_side_emit(data.clone());
        let Some(request_id) = request.request_id.clone() else {
            return Ok(());
        };
        let mut response = Response::new(request_id);
        response.kind = Some(RequestKind::ServerSideEmit);
        response.data = Some(data);
        self.publish_response_json(&request.uid, response).await
    }

    async fn handle_broadcast(&self, request: Request) -> Result<()> {
        let Some(request_id) = request.request_id.clone() else {
            return Ok(());
        };
        if self.tables.ack_requests.contains_key(&request_id) {
            return Ok(()); // self: we are the originator
        }
        let Some(packet) = request.packet.clone() else {
            return Ok(());
        };
        let opts = request.opts.clone().unwrap_or_default();

        let count_server = RequestServerHandle::new(self);
        let count_origin = request.uid.clone();
        let count_request_id = request_id.clone();
        let on_client_count: crate::local::OnClientCount = Box::new(move |count| {
            let server = count_server.clone();
            let origin = count_origin.clone();
            let request_id = count_request_id.clone();
            tokio::spawn(async move {
                let mut response = Response::new(request_id);
                response.kind = Some(RequestKind::BroadcastClientCount);
                response.client_count = Some(count);
                if let Err(err) = server.publish_response_json(&origin, response).await {
                    tracing::warn!(error = %err, "failed to publish broadcast client count");
                }
            });
        });

        let ack_server = RequestServerHandle::new(self);
        let ack_origin = request.uid.clone();
        let ack_request_id = request_id.clone();
        let on_ack: crate::local::OnAck = Box::new(move |args| {
            let server = ack_server.clone();
            let origin = ack_origin.clone();
            let request_id = ack_request_id.clone();
            tokio::spawn(async move {
                let mut response = Response::new(request_id);
                response.kind = Some(RequestKind::BroadcastAck);
                response.packet = Some(args);
                if let Err(err) = server.publish_response_binary(&origin, response).await {
                    tracing::warn!(error = %err, "failed to publish broadcast ack");
                }
            });
        });

        self.local.broadcast_with_ack(&packet, &opts, on_client_count, on_ack);
        Ok(())
    }
}

/// A cheap clone of the state `handle_broadcast`'s callbacks need to publish
/// responses after the request itself has returned.
#[derive(Clone)]
struct RequestServerHandle {
    namer: ChannelNamer,
    broker: Arc<dyn Broker>,
    packer: Arc<dyn BinaryPacker>,
    publish_on_specific_response_channel: bool,
}

impl RequestServerHandle {
    fn new(server: &RequestServer) -> Self {
        Self {
            namer: server.namer.clone(),
            broker: Arc::clone(&server.broker),
            packer: Arc::clone(&server.packer),
            publish_on_specific_response_channel: server.publish_on_specific_response_channel,
        }
    }

    fn response_target(&self, origin_uid: &str) -> String {
        if self.publish_on_specific_response_channel {
            self.namer.specific_response_channel(origin_uid)
        } else {
            self.namer.response_channel().to_string()
        }
    }

    async fn publish_response_json(&self, origin_uid: &str, response: Response) -> Result<()> {
        let payload = encode_json(&response)?;
        self.broker.publish(&self.response_target(origin_uid), payload).await
    }

    async fn publish_response_binary(&self, origin_uid: &str, response: Response) -> Result<()> {
        let payload = encode_binary(self.packer.as_ref(), &response)?;
        self.broker.publish(&self.response_target(origin_uid), payload).await
    }
}
