//! Fire-and-forget queue transport.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::messaging::message::{WorkerRequest, WorkerResponse};
use crate::messaging::queue::QueueProducer;
use crate::models::pipeline::{OutputTarget, StepConfig, TransportConfig, TransportKind};
use crate::transport::{RoutingResult, TransportHandler};

/// Publishes fan-out requests to an external broker.
///
/// Nothing published here ever flows back into the synchronous chain, so
/// this handler refuses `route_request` outright instead of fabricating a
/// response.
pub struct QueueTransportHandler {
    producer: Arc<dyn QueueProducer>,
}

impl QueueTransportHandler {
    pub fn new(producer: Arc<dyn QueueProducer>) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl TransportHandler for QueueTransportHandler {
    fn kind(&self) -> TransportKind {
        TransportKind::AsyncQueue
    }

    fn name(&self) -> &str {
        "async-queue"
    }

    fn can_handle(&self, _step: &StepConfig) -> bool {
        // No step's processor is queue-backed on the synchronous chain.
        false
    }

    async fn route_request(
        &self,
        _request: &WorkerRequest,
        step: &StepConfig,
    ) -> Result<WorkerResponse> {
        Err(EngineError::Configuration(format!(
            "async queue transport cannot serve the synchronous chain (step '{}')",
            step.name()
        )))
    }

    async fn route_stream(
        &self,
        request: &WorkerRequest,
        _step: &StepConfig,
        target: &OutputTarget,
    ) -> RoutingResult {
        let (topic, partition_key) = match target.transport() {
            TransportConfig::AsyncQueue {
                topic,
                partition_key,
            } => (topic.as_str(), partition_key.as_deref()),
            TransportConfig::SynchronousRpc { .. } => {
                return RoutingResult::failed(
                    target.target_step(),
                    self.kind(),
                    "output is not an async queue edge",
                )
            }
        };

        // Keyed by the configured partition key, else by document so one
        // document's messages stay ordered within a topic.
        let partition_key = partition_key.unwrap_or(request.document.id.as_str());

        let payload = match serde_json::to_value(request) {
            Ok(payload) => payload,
            Err(e) => {
                return RoutingResult::failed(
                    target.target_step(),
                    self.kind(),
                    format!("encode: {e}"),
                )
            }
        };

        match self
            .producer
            .send(topic, Some(partition_key), &payload)
            .await
        {
            Ok(message_id) => {
                debug!(
                    topic = topic,
                    message_id = message_id,
                    target = target.target_step(),
                    "fan-out message published"
                );
                RoutingResult::delivered(
                    target.target_step(),
                    self.kind(),
                    format!("published to '{topic}' as message {message_id}"),
                )
            }
            Err(e) => RoutingResult::failed(target.target_step(), self.kind(), e.to_string()),
        }
    }
}
