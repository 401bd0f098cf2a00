//! Per-run execution state.
//!
//! An [`ExecutionContext`] is created when a pipeline run starts, threaded
//! through every hop, and dropped from the engine's active-execution index
//! when the run finishes on either path. History is append-only: records are
//! never removed or reordered, and a failed run keeps every record that was
//! appended before the failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::document::{ActionType, Document};
use crate::models::pipeline::PipelineDefinition;

/// Outcome of one step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Success,
    Failure,
}

/// Immutable record of one executed hop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepExecutionRecord {
    pub hop: u32,
    pub step_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: StepStatus,
    pub logs: Vec<String>,
    pub error: Option<ErrorData>,
}

/// Terminal diagnostic detail attached to a failed run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorData {
    pub code: String,
    pub message: String,
    pub technical_detail: Option<String>,
    pub step_name: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Mutable per-run state threaded through all hops of one execution.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    stream_id: Uuid,
    pipeline_name: String,
    definition: Arc<PipelineDefinition>,
    action: ActionType,
    current_document: Document,
    current_hop: u32,
    history: Vec<StepExecutionRecord>,
    context_params: HashMap<String, String>,
    error: Option<ErrorData>,
}

impl ExecutionContext {
    pub fn new(
        definition: Arc<PipelineDefinition>,
        document: Document,
        action: ActionType,
        context_params: HashMap<String, String>,
    ) -> Self {
        Self {
            stream_id: Uuid::new_v4(),
            pipeline_name: definition.name().to_string(),
            definition,
            action,
            current_document: document,
            current_hop: 0,
            history: Vec::new(),
            context_params,
            error: None,
        }
    }

    pub fn stream_id(&self) -> Uuid {
        self.stream_id
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    pub fn definition(&self) -> &Arc<PipelineDefinition> {
        &self.definition
    }

    pub fn action(&self) -> ActionType {
        self.action
    }

    pub fn current_document(&self) -> &Document {
        &self.current_document
    }

    pub fn current_hop(&self) -> u32 {
        self.current_hop
    }

    pub fn history(&self) -> &[StepExecutionRecord] {
        &self.history
    }

    pub fn context_params(&self) -> &HashMap<String, String> {
        &self.context_params
    }

    pub fn error(&self) -> Option<&ErrorData> {
        self.error.as_ref()
    }

    /// Advance the hop counter before dispatching a worker-calling step.
    pub fn next_hop(&mut self) -> u32 {
        self.current_hop += 1;
        self.current_hop
    }

    /// Append a record for an executed hop. Records are never removed.
    pub fn append_record(&mut self, record: StepExecutionRecord) {
        self.history.push(record);
    }

    /// Replace the current document after a successful hop.
    pub fn replace_document(&mut self, document: Document) {
        self.current_document = document;
    }

    /// Attach the terminal error; the run resolves as failed after this.
    pub fn set_error(&mut self, error: ErrorData) {
        self.error = Some(error);
    }
}

/// Run status reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Accepted,
    Error,
}

/// Result handed back from `execute_pipeline`.
///
/// Callers get a stream id and a human-readable message; the full diagnostic
/// detail stays on the execution context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub status: ResponseStatus,
    pub stream_id: Uuid,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl PipelineResponse {
    pub fn accepted(stream_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Accepted,
            stream_id,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn error(stream_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            stream_id,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
