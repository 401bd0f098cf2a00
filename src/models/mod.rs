//! Shared data model: pipelines, documents, per-run state, and discovered
//! worker instances.

pub mod context;
pub mod document;
pub mod instance;
pub mod pipeline;

pub use context::{
    ErrorData, ExecutionContext, PipelineResponse, ResponseStatus, StepExecutionRecord, StepStatus,
};
pub use document::{ActionType, Document};
pub use instance::ServiceInstance;
pub use pipeline::{
    OutputTarget, PipelineDefinition, ProcessorRef, RetryPolicy, StepConfig, StepConfigBuilder,
    StepKind, TransportConfig, TransportKind,
};
