//! Wire messages exchanged with workers.
//!
//! One request shape serves both transports: the synchronous RPC channel
//! sends it and waits for a [`WorkerResponse`]; the queue transport publishes
//! the same payload and expects nothing back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::context::StepExecutionRecord;
use crate::models::document::{ActionType, Document};

/// Request sent to a worker for one step execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub document: Document,
    pub metadata: RequestMetadata,
    /// Step-specific key-value configuration.
    pub step_params: HashMap<String, String>,
    /// Step-specific structured configuration, when declared.
    pub structured_params: Option<serde_json::Value>,
}

/// Execution metadata accompanying every worker request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub pipeline_name: String,
    pub step_name: String,
    pub stream_id: Uuid,
    pub hop: u32,
    pub action: ActionType,
    /// History of every hop executed so far in this run.
    pub history: Vec<StepExecutionRecord>,
    /// Caller-supplied parameters threaded unchanged through all hops.
    pub context_params: HashMap<String, String>,
    pub issued_at: DateTime<Utc>,
}

/// Response returned by a worker over the synchronous transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub success: bool,
    /// Replacement document; `None` leaves the current document unchanged.
    pub document: Option<Document>,
    #[serde(default)]
    pub logs: Vec<String>,
    pub error: Option<WorkerErrorDetail>,
}

impl WorkerResponse {
    pub fn ok(document: Option<Document>) -> Self {
        Self {
            success: true,
            document,
            logs: Vec::new(),
            error: None,
        }
    }

    pub fn failed(error: WorkerErrorDetail) -> Self {
        Self {
            success: false,
            document: None,
            logs: Vec::new(),
            error: Some(error),
        }
    }

    pub fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = logs;
        self
    }
}

/// Structured failure detail reported by a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerErrorDetail {
    pub code: String,
    pub message: String,
    pub technical_detail: Option<serde_json::Value>,
}
