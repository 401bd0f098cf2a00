//! Logical-name resolution against the external registry.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::discovery::load_balancer::LoadBalancer;
use crate::discovery::registry::RegistryClient;
use crate::error::{EngineError, Result};
use crate::models::instance::ServiceInstance;

/// Resolves a logical worker name to healthy instances and, composed with the
/// load balancer, to a single instance per call.
///
/// This component performs no retries: registry connectivity failures
/// propagate to the executor, which owns the step's retry policy.
pub struct ServiceDiscovery {
    registry: Arc<dyn RegistryClient>,
    balancer: LoadBalancer,
}

impl ServiceDiscovery {
    pub fn new(registry: Arc<dyn RegistryClient>, balancer: LoadBalancer) -> Self {
        Self { registry, balancer }
    }

    /// Every healthy instance of `service`; empty when none exist.
    pub async fn discover_all_instances(&self, service: &str) -> Result<Vec<ServiceInstance>> {
        let instances = self.registry.query_healthy_instances(service).await?;
        debug!(
            service = service,
            instances = instances.len(),
            "discovery query completed"
        );
        Ok(instances)
    }

    /// One healthy instance of `service`, chosen by the load balancer.
    pub async fn discover_service(&self, service: &str) -> Result<ServiceInstance> {
        let instances = self.discover_all_instances(service).await?;

        if instances.is_empty() {
            warn!(service = service, "no healthy instances available");
            return Err(EngineError::ServiceUnavailable {
                service: service.to_string(),
            });
        }

        let selected = self.balancer.select_instance(&instances)?;
        debug!(
            service = service,
            instance = %selected.id,
            endpoint = %selected.endpoint(),
            "instance selected"
        );
        Ok(selected.clone())
    }
}
