//! Central transport registry and dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::messaging::message::{WorkerRequest, WorkerResponse};
use crate::models::pipeline::{OutputTarget, StepConfig, TransportKind};
use crate::transport::{RoutingResult, TransportHandler};

/// Registry of transport handlers keyed by transport kind.
///
/// The synchronous chain goes through [`route_request`](Self::route_request);
/// fan-out edges go through [`route_stream`](Self::route_stream). A step
/// whose transport has no registered handler is a configuration error, never
/// a silent no-op.
pub struct TransportRouter {
    handlers: RwLock<HashMap<TransportKind, Arc<dyn TransportHandler>>>,
}

impl TransportRouter {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler under its own transport kind, replacing any
    /// previous handler for that kind.
    pub async fn register_handler(&self, handler: Arc<dyn TransportHandler>) {
        let kind = handler.kind();
        let mut handlers = self.handlers.write().await;

        if handlers.contains_key(&kind) {
            warn!(transport = %kind, "replacing existing transport handler");
        }

        info!(transport = %kind, handler = handler.name(), "transport handler registered");
        handlers.insert(kind, handler);
    }

    pub async fn has_handler(&self, kind: TransportKind) -> bool {
        self.handlers.read().await.contains_key(&kind)
    }

    pub async fn registered_kinds(&self) -> Vec<TransportKind> {
        self.handlers.read().await.keys().copied().collect()
    }

    /// Execute a synchronous-chain call for `step`.
    pub async fn route_request(
        &self,
        request: &WorkerRequest,
        step: &StepConfig,
    ) -> Result<WorkerResponse> {
        let kind = step.processor().transport_kind();
        let handler = self.handler_for(kind).await.ok_or_else(|| {
            EngineError::Configuration(format!(
                "no transport handler registered for {kind} (step '{}')",
                step.name()
            ))
        })?;

        if !handler.can_handle(step) {
            return Err(EngineError::Configuration(format!(
                "handler '{}' cannot serve step '{}' ({})",
                handler.name(),
                step.name(),
                step.processor().name()
            )));
        }

        debug!(
            step = step.name(),
            transport = %kind,
            handler = handler.name(),
            "routing request"
        );
        handler.route_request(request, step).await
    }

    /// Dispatch one fan-out edge. Failures land in the returned
    /// [`RoutingResult`]; fan-out never propagates errors.
    pub async fn route_stream(
        &self,
        request: &WorkerRequest,
        step: &StepConfig,
        target: &OutputTarget,
    ) -> RoutingResult {
        let kind = target.transport().kind();
        match self.handler_for(kind).await {
            Some(handler) => handler.route_stream(request, step, target).await,
            None => RoutingResult::failed(
                target.target_step(),
                kind,
                format!("no transport handler registered for {kind}"),
            ),
        }
    }

    async fn handler_for(&self, kind: TransportKind) -> Option<Arc<dyn TransportHandler>> {
        self.handlers.read().await.get(&kind).cloned()
    }
}

impl Default for TransportRouter {
    fn default() -> Self {
        Self::new()
    }
}
