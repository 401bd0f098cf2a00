//! Producer-side queue collaborator.
//!
//! The engine is a producer-side client to an external broker; nothing from a
//! queue publish ever flows back into the synchronous chain. The broker
//! itself is reached through the [`QueueProducer`] trait, injected into the
//! queue transport handler at construction.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

use crate::error::{EngineError, Result};

/// External queue producer contract: publish a payload to a topic, optionally
/// keyed for partitioning, and return the broker's message id.
#[async_trait]
pub trait QueueProducer: Send + Sync {
    async fn send(
        &self,
        topic: &str,
        partition_key: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<i64>;
}

/// A message captured by [`InMemoryQueueProducer`].
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub message_id: i64,
    pub partition_key: Option<String>,
    pub payload: serde_json::Value,
}

/// In-process producer keeping published messages per topic.
///
/// Used by embedded deployments without a broker and by the test suites to
/// observe fan-out publishes.
#[derive(Debug, Default)]
pub struct InMemoryQueueProducer {
    topics: Mutex<HashMap<String, Vec<PublishedMessage>>>,
    next_id: AtomicI64,
}

impl InMemoryQueueProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages published to `topic`, in publish order.
    pub fn messages(&self, topic: &str) -> Vec<PublishedMessage> {
        self.topics
            .lock()
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    pub fn message_count(&self, topic: &str) -> usize {
        self.topics.lock().get(topic).map_or(0, Vec::len)
    }
}

#[async_trait]
impl QueueProducer for InMemoryQueueProducer {
    async fn send(
        &self,
        topic: &str,
        partition_key: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<i64> {
        if topic.trim().is_empty() {
            return Err(EngineError::Validation(
                "queue topic must not be blank".to_string(),
            ));
        }

        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(PublishedMessage {
                message_id,
                partition_key: partition_key.map(str::to_string),
                payload: payload.clone(),
            });

        debug!(topic = topic, message_id = message_id, "message published");
        Ok(message_id)
    }
}
