//! In-process topic hub.
//!
//! Tracks subscribers per topic and fans published payloads out to them.
//! Subscribers whose receiving side has gone away are pruned on publish.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;

/// Sender half held by the hub for one subscriber.
pub type PayloadSender = mpsc::UnboundedSender<Value>;

#[derive(Debug)]
struct Subscriber {
    id: String,
    sender: PayloadSender,
}

/// Topic-keyed pub/sub shared across tasks via `Arc`.
#[derive(Debug, Default)]
pub struct Hub {
    topics: DashMap<String, Vec<Subscriber>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    /// Create a new hub wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Subscribe to a topic. Dropping the returned handle unsubscribes.
    pub fn subscribe(self: &Arc<Self>, topic: impl Into<String>) -> Subscription {
        let topic = topic.into();
        let id = uuid::Uuid::new_v4().to_string();
        let (sender, receiver) = mpsc::unbounded_channel();

        self.topics.entry(topic.clone()).or_default().push(Subscriber {
            id: id.clone(),
            sender,
        });

        tracing::debug!(topic = %topic, sub_id = %id, "Subscribed to topic");

        Subscription {
            id,
            topic,
            receiver,
            hub: Arc::downgrade(self),
        }
    }

    pub fn unsubscribe(&self, topic: &str, sub_id: &str) {
        if let Some(mut subscribers) = self.topics.get_mut(topic) {
            subscribers.retain(|s| s.id != sub_id);
            if subscribers.is_empty() {
                drop(subscribers);
                self.topics.remove_if(topic, |_, subs| subs.is_empty());
            }
            tracing::debug!(topic = %topic, sub_id = %sub_id, "Unsubscribed from topic");
        }
    }

    /// Deliver a payload to every subscriber of `topic`.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, topic: &str, payload: Value) -> usize {
        let Some(mut subscribers) = self.topics.get_mut(topic) else {
            tracing::trace!(topic = %topic, "Publish to topic without subscribers");
            return 0;
        };

        subscribers.retain(|s| s.sender.send(payload.clone()).is_ok());
        let sent_count = subscribers.len();

        tracing::trace!(topic = %topic, recipients = sent_count, "Published payload");

        sent_count
    }

    /// Number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |subs| subs.len())
    }
}

/// A live subscription to one hub topic.
#[derive(Debug)]
pub struct Subscription {
    id: String,
    topic: String,
    receiver: mpsc::UnboundedReceiver<Value>,
    hub: Weak<Hub>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next payload. `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(&self.topic, &self.id);
        }
    }
}
