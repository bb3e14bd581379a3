//! Subscriber Loop: the two long-lived receive loops (base spec §4.3).

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::broker::Broker;
use crate::codec::BinaryPacker;
use crate::error::Result;
use crate::inbound;
use crate::local::LocalAdapter;
use crate::namer::ChannelNamer;
use crate::protocol::ServerId;
use crate::request_client::RequestClient;
use crate::request_server::RequestServer;

/// Owns the pattern loop and the exact loop for one adapter instance.
/// `shutdown` triggers both to unsubscribe and exit (base spec §4.10).
pub struct SubscriberLoops {
    shutdown_tx: watch::Sender<bool>,
    pattern_task: Option<JoinHandle<()>>,
    exact_task: Option<JoinHandle<()>>,
}

impl SubscriberLoops {
    pub async fn spawn(
        namer: ChannelNamer,
        uid: ServerId,
        broker: Arc<dyn Broker>,
        local: Arc<dyn LocalAdapter>,
        packer: Arc<dyn BinaryPacker>,
        request_server: Arc<RequestServer>,
        request_client: Arc<RequestClient>,
    ) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let pattern_stream = broker.psubscribe(&namer.broadcast_pattern()).await?;
        let pattern_namer = namer.clone();
        let pattern_uid = uid.clone();
        let pattern_local = Arc::clone(&local);
        let pattern_packer = Arc::clone(&packer);
        let mut pattern_shutdown = shutdown_rx.clone();
        let pattern_task = tokio::spawn(async move {
            let mut stream = pattern_stream;
            loop {
                tokio::select! {
                    _ = pattern_shutdown.changed() => {
                        if *pattern_shutdown.borrow() {
                            break;
                        }
                    }
                    maybe_msg = stream.next() => {
                        match maybe_msg {
                            Some(message) => inbound::handle_broadcast_message(
                                &pattern_namer,
                                &pattern_uid,
                                pattern_local.as_ref(),
                                pattern_packer.as_ref(),
                                message,
                            ),
                            None => break,
                        }
                    }
                }
            }
        });

        let exact_channels = vec![
            namer.request_channel().to_string(),
            namer.response_channel().to_string(),
            namer.specific_response_channel(&uid),
        ];
        let exact_stream = broker.subscribe(exact_channels).await?;
        let mut exact_shutdown = shutdown_rx.clone();
        let exact_task = tokio::spawn(async move {
            let mut stream = exact_stream;
            loop {
                tokio::select! {
                    _ = exact_shutdown.changed() => {
                        if *exact_shutdown.borrow() {
                            break;
                        }
                    }
                    maybe_msg = stream.next() => {
                        match maybe_msg {
                            Some(message) => {
                                request_server.handle_exact_message(message, &request_client).await;
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        Ok(Self {
            shutdown_tx,
            pattern_task: Some(pattern_task),
            exact_task: Some(exact_task),
        })
    }

    /// Unsubscribe both loops and wait for them to exit (base spec §4.10).
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.pattern_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.exact_task.take() {
            let _ = task.await;
        }
    }
}
