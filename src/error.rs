//! Structured error handling for the execution engine.
//!
//! Every failure the engine can observe maps onto one variant here, and the
//! retry decision lives with the error itself: discovery, transport, and
//! timeout failures are retryable under a step's policy, while configuration
//! problems and explicit worker failures are surfaced immediately.

use serde_json::Value;

/// Engine-wide error taxonomy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// Invalid or missing step/transport wiring. Fatal, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A construction-time invariant was violated. Fatal, never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// The requested pipeline definition does not exist.
    #[error("pipeline definition not found: {0}")]
    DefinitionNotFound(String),

    /// The registry returned no healthy instance for a named worker service.
    #[error("no healthy instances available for service '{service}'")]
    ServiceUnavailable { service: String },

    /// Network or RPC failure against a resolved instance.
    #[error("transport failure for {endpoint}: {detail}")]
    Transport { endpoint: String, detail: String },

    /// The worker responded, but reported a processing failure.
    #[error("worker failure in step '{step}': {message}")]
    Worker {
        step: String,
        message: String,
        detail: Option<Value>,
    },

    /// A single attempt exceeded the step's configured timeout.
    #[error("step '{step}' timed out after {timeout_ms}ms")]
    Timeout { step: String, timeout_ms: u64 },
}

impl EngineError {
    /// Whether a step's retry policy applies to this failure.
    ///
    /// Worker-reported failures are not retried by default: the worker made a
    /// decision, and replaying the same document is unlikely to change it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::ServiceUnavailable { .. }
                | EngineError::Transport { .. }
                | EngineError::Timeout { .. }
        )
    }

    /// Short machine-readable code attached to terminal error records.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Configuration(_) => "CONFIGURATION",
            EngineError::Validation(_) => "VALIDATION",
            EngineError::DefinitionNotFound(_) => "DEFINITION_NOT_FOUND",
            EngineError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            EngineError::Transport { .. } => "TRANSPORT",
            EngineError::Worker { .. } => "WORKER",
            EngineError::Timeout { .. } => "TIMEOUT",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
