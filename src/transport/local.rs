//! In-process handler transport.
//!
//! A typed registry of named handlers: steps referencing a local handler are
//! served without any network, and a step naming an unregistered handler is a
//! configuration error. This replaces any notion of runtime stub discovery —
//! handlers are concrete values registered explicitly.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::error::{EngineError, Result};
use crate::messaging::message::{WorkerRequest, WorkerResponse};
use crate::models::pipeline::{OutputTarget, StepConfig, TransportKind};
use crate::transport::{RoutingResult, TransportHandler};

/// An in-process step processor.
#[async_trait]
pub trait LocalHandler: Send + Sync {
    async fn process(&self, request: &WorkerRequest) -> Result<WorkerResponse>;

    /// Name steps use to reference this handler.
    fn name(&self) -> &str;
}

/// Transport handler serving steps backed by registered local handlers.
pub struct LocalTransportHandler {
    handlers: RwLock<HashMap<String, Arc<dyn LocalHandler>>>,
}

impl LocalTransportHandler {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler under its own name, replacing any previous one.
    pub fn register(&self, handler: Arc<dyn LocalHandler>) {
        let name = handler.name().to_string();
        info!(handler = %name, "local handler registered");
        self.handlers.write().insert(name, handler);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }
}

impl Default for LocalTransportHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportHandler for LocalTransportHandler {
    fn kind(&self) -> TransportKind {
        TransportKind::LocalHandler
    }

    fn name(&self) -> &str {
        "local-handler"
    }

    fn can_handle(&self, step: &StepConfig) -> bool {
        step.local_handler()
            .map(|name| self.is_registered(name))
            .unwrap_or(false)
    }

    async fn route_request(
        &self,
        request: &WorkerRequest,
        step: &StepConfig,
    ) -> Result<WorkerResponse> {
        let name = step.local_handler().ok_or_else(|| {
            EngineError::Configuration(format!(
                "step '{}' is not backed by a local handler",
                step.name()
            ))
        })?;

        let handler = self
            .handlers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| {
                EngineError::Configuration(format!("no local handler registered under '{name}'"))
            })?;

        handler.process(request).await
    }

    async fn route_stream(
        &self,
        _request: &WorkerRequest,
        _step: &StepConfig,
        target: &OutputTarget,
    ) -> RoutingResult {
        // Output edges carry only remote transports; a local edge cannot be
        // configured, so reaching this is a wiring bug worth reporting.
        RoutingResult::failed(
            target.target_step(),
            self.kind(),
            "local transport does not serve fan-out edges",
        )
    }
}
