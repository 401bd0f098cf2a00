//! Transport routing: one handler per delivery mechanism, dispatched by a
//! typed registry.

pub mod local;
pub mod queue;
pub mod router;
pub mod rpc;

use async_trait::async_trait;

use crate::error::Result;
use crate::messaging::message::{WorkerRequest, WorkerResponse};
use crate::models::pipeline::{OutputTarget, StepConfig, TransportKind};

/// Outcome of one fan-out dispatch, observed only for logging.
///
/// Fan-out never feeds back into the synchronous chain, so failures here are
/// reported, not returned.
#[derive(Debug, Clone)]
pub struct RoutingResult {
    pub target_step: String,
    pub transport: TransportKind,
    pub success: bool,
    pub detail: String,
}

impl RoutingResult {
    pub fn delivered(
        target_step: impl Into<String>,
        transport: TransportKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            target_step: target_step.into(),
            transport,
            success: true,
            detail: detail.into(),
        }
    }

    pub fn failed(
        target_step: impl Into<String>,
        transport: TransportKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            target_step: target_step.into(),
            transport,
            success: false,
            detail: detail.into(),
        }
    }
}

/// A transport-specific sender.
///
/// Each handler validates that a step's configuration matches its own
/// transport before doing any work and fails fast on a mismatch; a handler
/// never silently no-ops.
#[async_trait]
pub trait TransportHandler: Send + Sync {
    /// Transport kind this handler serves; the router keys its registry on it.
    fn kind(&self) -> TransportKind;

    /// Handler name for diagnostics.
    fn name(&self) -> &str;

    /// Whether this handler can execute the given step on the synchronous chain.
    fn can_handle(&self, step: &StepConfig) -> bool;

    /// Execute a synchronous-chain call for `step`.
    async fn route_request(
        &self,
        request: &WorkerRequest,
        step: &StepConfig,
    ) -> Result<WorkerResponse>;

    /// Dispatch one fan-out edge: `target` is the output edge, `step` the
    /// configuration of the step it points at.
    async fn route_stream(
        &self,
        request: &WorkerRequest,
        step: &StepConfig,
        target: &OutputTarget,
    ) -> RoutingResult;
}

pub use local::{LocalHandler, LocalTransportHandler};
pub use queue::QueueTransportHandler;
pub use router::TransportRouter;
pub use rpc::RpcTransportHandler;
