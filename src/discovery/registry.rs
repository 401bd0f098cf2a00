//! External service-registry collaborator.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::Result;
use crate::models::instance::ServiceInstance;

/// Client for the external service registry.
///
/// Queried fresh on every discovery call; implementations must not cache
/// results internally — caching is an explicit, bounded concern of the
/// connection layer. Connectivity failures propagate untouched; retry is the
/// executor's responsibility.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// All currently healthy instances of `service`. An unknown or fully
    /// unhealthy service yields an empty list, not an error.
    async fn query_healthy_instances(&self, service: &str) -> Result<Vec<ServiceInstance>>;
}

/// Fixed in-memory registry for embedded deployments and tests.
#[derive(Debug, Default)]
pub struct StaticRegistryClient {
    table: RwLock<HashMap<String, Vec<ServiceInstance>>>,
}

impl StaticRegistryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance under a logical service name.
    pub fn register(&self, service: impl Into<String>, instance: ServiceInstance) {
        self.table
            .write()
            .entry(service.into())
            .or_default()
            .push(instance);
    }

    /// Remove every instance of a service.
    pub fn deregister_all(&self, service: &str) {
        self.table.write().remove(service);
    }
}

#[async_trait]
impl RegistryClient for StaticRegistryClient {
    async fn query_healthy_instances(&self, service: &str) -> Result<Vec<ServiceInstance>> {
        Ok(self
            .table
            .read()
            .get(service)
            .cloned()
            .unwrap_or_default())
    }
}
