//! Synchronous request/response transport over pooled worker connections.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::connection::manager::ConnectionManager;
use crate::error::{EngineError, Result};
use crate::messaging::message::{WorkerRequest, WorkerResponse};
use crate::models::pipeline::{OutputTarget, StepConfig, TransportConfig, TransportKind};
use crate::transport::{RoutingResult, TransportHandler};

/// Sends worker requests over the synchronous RPC transport.
///
/// Main-chain calls resolve the service freshly on every call so each hop
/// gets fresh load balancing; fan-out calls go through the TTL-cached
/// resolution path, where a short-lived instance pin is an acceptable trade
/// for skipping a discovery round-trip.
pub struct RpcTransportHandler {
    connections: Arc<ConnectionManager>,
}

impl RpcTransportHandler {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }
}

#[async_trait]
impl TransportHandler for RpcTransportHandler {
    fn kind(&self) -> TransportKind {
        TransportKind::SynchronousRpc
    }

    fn name(&self) -> &str {
        "synchronous-rpc"
    }

    fn can_handle(&self, step: &StepConfig) -> bool {
        step.remote_service().is_some()
    }

    async fn route_request(
        &self,
        request: &WorkerRequest,
        step: &StepConfig,
    ) -> Result<WorkerResponse> {
        let service = step.remote_service().ok_or_else(|| {
            EngineError::Configuration(format!(
                "step '{}' is not backed by a remote service",
                step.name()
            ))
        })?;

        let connection = self.connections.client_for_service(service).await?;
        debug!(
            step = step.name(),
            service = service,
            endpoint = connection.endpoint(),
            "dispatching worker call"
        );
        connection.process(request).await
    }

    async fn route_stream(
        &self,
        request: &WorkerRequest,
        step: &StepConfig,
        target: &OutputTarget,
    ) -> RoutingResult {
        let service = match step.remote_service() {
            Some(service) => service,
            None => {
                return RoutingResult::failed(
                    target.target_step(),
                    self.kind(),
                    format!("step '{}' is not backed by a remote service", step.name()),
                )
            }
        };

        let call_timeout = match target.transport() {
            TransportConfig::SynchronousRpc { call_timeout_ms } => {
                call_timeout_ms.map(Duration::from_millis)
            }
            TransportConfig::AsyncQueue { .. } => {
                return RoutingResult::failed(
                    target.target_step(),
                    self.kind(),
                    "output is not a synchronous RPC edge",
                )
            }
        };

        let call = async {
            let connection = self.connections.client_for_service_cached(service).await?;
            connection.process(request).await
        };

        let outcome = match call_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(EngineError::Timeout {
                    step: target.target_step().to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }),
            },
            None => call.await,
        };

        match outcome {
            Ok(response) if response.success => RoutingResult::delivered(
                target.target_step(),
                self.kind(),
                format!("worker '{service}' accepted"),
            ),
            Ok(response) => RoutingResult::failed(
                target.target_step(),
                self.kind(),
                response
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "worker reported failure".to_string()),
            ),
            Err(e) => RoutingResult::failed(target.target_step(), self.kind(), e.to_string()),
        }
    }
}
