//! Document payload carried through a pipeline run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The unit of work flowing through a pipeline.
///
/// A document is never mutated in place: a worker that transforms content
/// returns a replacement, and the execution context swaps the whole value
/// after the hop succeeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Stable identifier assigned by the caller.
    pub id: String,
    /// Raw document content.
    pub body: String,
    /// Declared content type, when the caller knows it.
    pub mime_type: Option<String>,
    /// Free-form attributes accumulated by upstream systems.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            mime_type: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// The caller's intent for a pipeline run, threaded through request metadata.
///
/// The engine treats this as opaque routing metadata; workers use it to
/// distinguish ingest from removal flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Create,
    Update,
    Delete,
}

impl Default for ActionType {
    fn default() -> Self {
        ActionType::Create
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "CREATE"),
            ActionType::Update => write!(f, "UPDATE"),
            ActionType::Delete => write!(f, "DELETE"),
        }
    }
}
