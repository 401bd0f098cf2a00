//! Execution lifecycle observation.
//!
//! Persistence of finished runs is an external concern; the engine hands the
//! final context to an injected observer just before unregistering it, and
//! whatever the observer does with it is none of the engine's business.

use crate::models::context::ExecutionContext;

/// Receives the final state of each execution, on both outcome paths.
///
/// Called synchronously on the execution's task after the last hop resolves
/// and before the context leaves the active-execution index; implementations
/// should hand heavy work off rather than block the engine.
pub trait ExecutionObserver: Send + Sync {
    fn stream_completed(&self, _context: &ExecutionContext) {}

    fn stream_failed(&self, _context: &ExecutionContext) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {}
