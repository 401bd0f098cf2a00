//! External pipeline-configuration collaborator.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::models::pipeline::PipelineDefinition;

/// Source of pipeline definitions, supplied externally.
///
/// Storage and CRUD of definitions live outside the engine; the executor only
/// ever fetches one definition per run and holds it immutable. Absence is a
/// fatal, non-retried error for that execution.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    async fn pipeline_definition(
        &self,
        cluster_id: &str,
        pipeline_name: &str,
    ) -> Result<Option<Arc<PipelineDefinition>>>;
}

/// In-memory definition table for embedded deployments and tests.
#[derive(Default)]
pub struct InMemoryDefinitionSource {
    table: RwLock<HashMap<(String, String), Arc<PipelineDefinition>>>,
}

impl InMemoryDefinitionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, cluster_id: impl Into<String>, definition: PipelineDefinition) {
        let key = (cluster_id.into(), definition.name().to_string());
        self.table.write().insert(key, Arc::new(definition));
    }
}

#[async_trait]
impl DefinitionSource for InMemoryDefinitionSource {
    async fn pipeline_definition(
        &self,
        cluster_id: &str,
        pipeline_name: &str,
    ) -> Result<Option<Arc<PipelineDefinition>>> {
        Ok(self
            .table
            .read()
            .get(&(cluster_id.to_string(), pipeline_name.to_string()))
            .cloned())
    }
}
