//! Ack Aggregator: collects peer-reported client counts and acks for a
//! broadcast-with-ack, bounded by a deadline (base spec §4.7).

use std::sync::Arc;
use std::time::Duration;

use crate::broker::Broker;
use crate::codec::{encode_binary, BinaryPacker};
use crate::correlation::{CorrelationTables, PendingAck};
use crate::error::Result;
use crate::id;
use crate::local::{OnAck, OnClientCount};
use crate::namer::ChannelNamer;
use crate::packet::{EncodedBroadcastOptions, Packet};
use crate::protocol::{Request, RequestKind, ServerId};

pub struct AckAggregator {
    uid: ServerId,
    namer: ChannelNamer,
    broker: Arc<dyn Broker>,
    tables: Arc<CorrelationTables>,
    /// Fallback deadline when `opts.flags.timeout_ms` is absent.
    ///
    /// Base spec §9 Open Question: the reference behavior schedules a
    /// zero-delay deletion in that case, making cross-node acks
    /// unobservable. This implementation instead defaults the missing
    /// timeout to the adapter's `requestsTimeout`, per the spec's own
    /// resolution guidance ("require a timeout or default to
    /// requestsTimeout; pick one and document" — see DESIGN.md).
    default_timeout: Duration,
}

impl AckAggregator {
    pub fn new(
        uid: ServerId,
        namer: ChannelNamer,
        broker: Arc<dyn Broker>,
        tables: Arc<CorrelationTables>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            uid,
            namer,
            broker,
            tables,
            default_timeout,
        }
    }

    /// Publish a `BROADCAST` request and arm the ack deadline (base spec
    /// §4.7). Only called when the broadcast is not `.local`.
    pub async fn start(
        &self,
        packer: &dyn BinaryPacker,
        packet: &Packet,
        opts: &EncodedBroadcastOptions,
        on_client_count: OnClientCount,
        on_ack: OnAck,
    ) -> Result<()> {
        let request_id = id::generate();
        let mut request = Request::new(self.uid.clone(), RequestKind::Broadcast);
        request.request_id = Some(request_id.clone());
        request.packet = Some(packet.clone());
        request.opts = Some(opts.clone());

        let pending = PendingAck::new(on_client_count, on_ack);
        self.tables.ack_requests.insert(request_id.clone(), pending);

        let timeout = opts
            .flags
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);
        let tables = Arc::clone(&self.tables);
        let timer_id = request_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if tables.ack_requests.remove(&timer_id).is_some() {
                tracing::trace!(request_id = %timer_id, "ack aggregator deadline reached");
            }
        });

        let payload = encode_binary(packer, &request)?;
        self.broker.publish(self.namer.request_channel(), payload).await
    }
}
