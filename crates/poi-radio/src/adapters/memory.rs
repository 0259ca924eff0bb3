//! # In-Memory Gossip Transport
//!
//! Topic-filtered broadcast over `tokio::sync::broadcast`. Every radio sharing
//! one instance sees every other radio's messages on the topics it subscribed
//! to, including its own. Used for tests and for standalone nodes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::ports::{GossipTransport, InboundMessage, PortError};

/// Default broadcast buffer, in messages.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// In-memory publish/subscribe transport.
pub struct InMemoryTransport {
    sender: broadcast::Sender<InboundMessage>,
    messages_published: AtomicU64,
    capacity: usize,
}

impl InMemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            messages_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Total messages published, delivered or not.
    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GossipTransport for InMemoryTransport {
    async fn subscribe(
        &self,
        topics: &[String],
    ) -> Result<mpsc::Receiver<InboundMessage>, PortError> {
        let mut receiver = self.sender.subscribe();
        let topics: HashSet<String> = topics.iter().cloned().collect();
        let (tx, rx) = mpsc::channel(self.capacity);

        debug!(topics = topics.len(), "New transport subscription");

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => {
                        if !topics.contains(&message.topic) {
                            continue;
                        }
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Subscriber lagged, messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PortError> {
        self.messages_published.fetch_add(1, Ordering::Relaxed);

        let message = InboundMessage {
            topic: topic.to_string(),
            payload,
        };
        match self.sender.send(message) {
            Ok(receivers) => {
                debug!(topic = %topic, receivers, "Message published");
            }
            Err(_) => {
                // Gossip is fire-and-forget; an empty mesh is not an error
                debug!(topic = %topic, "Message published with no subscribers");
            }
        }
        Ok(())
    }
}
