//! In-process [`Broker`] for tests and single-process operation.
//!
//! Grounded on the teacher's `data/topics/memory.rs` `MemoryTopicBackend`:
//! `tokio::sync::broadcast` channels per topic, created lazily and shared
//! across subscribers. Pattern subscriptions are restricted to the
//! `prefix*` glob form this protocol actually emits (base spec's
//! `{broadcastChannel}*`), not general Redis glob syntax.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use crate::broker::{Broker, ErrorHandler, ExactMessage, PatternMessage};
use crate::error::Result;

const CHANNEL_CAPACITY: usize = 1024;

fn pattern_matches(pattern: &str, channel: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => channel.starts_with(prefix),
        None => pattern == channel,
    }
}

struct Inner {
    exact: DashMap<String, broadcast::Sender<Vec<u8>>>,
    patterns: DashMap<String, broadcast::Sender<(String, Vec<u8>)>>,
    error_handler: Mutex<Option<ErrorHandler>>,
}

/// An in-memory stand-in for a Redis-like pub/sub broker. Several
/// `MemoryBroker` handles sharing the same `Arc<Inner>` (via [`MemoryBroker::clone`])
/// behave like several adapter instances on the same bus; a fresh
/// `MemoryBroker::new()` is an isolated bus.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                exact: DashMap::new(),
                patterns: DashMap::new(),
                error_handler: Mutex::new(None),
            }),
        }
    }

    fn exact_sender(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        self.inner
            .exact
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    fn pattern_sender(&self, pattern: &str) -> broadcast::Sender<(String, Vec<u8>)> {
        self.inner
            .patterns
            .entry(pattern.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<()> {
        if let Some(sender) = self.inner.exact.get(channel) {
            let _ = sender.send(payload.clone());
        }
        for entry in self.inner.patterns.iter() {
            if pattern_matches(entry.key(), channel) {
                let _ = entry.value().send((channel.to_string(), payload.clone()));
            }
        }
        Ok(())
    }

    async fn subscribe(&self, channels: Vec<String>) -> Result<BoxStream<'static, ExactMessage>> {
        let (tx, rx) = mpsc::unbounded_channel();
        for channel in channels {
            let mut receiver = self.exact_sender(&channel).subscribe();
            let tx = tx.clone();
            let channel = channel.clone();
            tokio::spawn(async move {
                loop {
                    match receiver.recv().await {
                        Ok(payload) => {
                            if tx
                                .send(ExactMessage {
                                    channel: channel.clone(),
                                    payload,
                                })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
        }
        drop(tx);
        Ok(Box::pin(async_stream::stream! {
            let mut rx = rx;
            while let Some(msg) = rx.recv().await {
                yield msg;
            }
        }))
    }

    async fn psubscribe(&self, pattern: &str) -> Result<BoxStream<'static, PatternMessage>> {
        let mut receiver = self.pattern_sender(pattern).subscribe();
        let pattern = pattern.to_string();
        Ok(Box::pin(async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok((channel, payload)) => {
                        yield PatternMessage { pattern: pattern.clone(), channel, payload };
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }

    async fn server_count(&self, channel: &str) -> Result<usize> {
        Ok(self
            .inner
            .exact
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0))
    }

    fn set_error_handler(&self, handler: Option<ErrorHandler>) {
        *self.inner.error_handler.lock() = handler;
    }

    async fn close(&self) -> Result<()> {
        self.inner.exact.clear();
        self.inner.patterns.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn exact_subscribers_receive_published_payloads() {
        let broker = MemoryBroker::new();
        let mut stream = broker
            .subscribe(vec!["chan-a".into(), "chan-b".into()])
            .await
            .unwrap();
        broker.publish("chan-a", b"hello".to_vec()).await.unwrap();
        let msg = stream.next().await.unwrap();
        assert_eq!(msg.channel, "chan-a");
        assert_eq!(msg.payload, b"hello");
    }

    #[tokio::test]
    async fn pattern_subscribers_receive_matching_channels_only() {
        let broker = MemoryBroker::new();
        let mut stream = broker.psubscribe("socket.io#/#*").await.unwrap();
        broker
            .publish("socket.io#/#room1#", b"payload".to_vec())
            .await
            .unwrap();
        broker
            .publish("unrelated-channel", b"payload".to_vec())
            .await
            .unwrap();
        let msg = stream.next().await.unwrap();
        assert_eq!(msg.channel, "socket.io#/#room1#");
        assert_eq!(msg.pattern, "socket.io#/#*");
    }

    #[tokio::test]
    async fn server_count_reflects_active_subscribers() {
        let broker = MemoryBroker::new();
        assert_eq!(broker.server_count("requests").await.unwrap(), 0);
        let _stream = broker.subscribe(vec!["requests".into()]).await.unwrap();
        assert_eq!(broker.server_count("requests").await.unwrap(), 1);
    }
}
