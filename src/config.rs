//! Engine configuration.
//!
//! Environment-driven with clamped defaults: a misconfigured value falls back
//! to the default rather than aborting engine construction.

use std::time::Duration;

use crate::constants;
use crate::error::{EngineError, Result};

/// Top-level configuration for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cluster the engine resolves pipeline definitions against.
    pub cluster_id: String,
    /// TTL for cached service-discovery resolutions.
    pub discovery_cache_ttl: Duration,
    /// Budget for a graceful connection close during shutdown.
    pub connection_close_timeout: Duration,
    /// Budget for establishing a new worker channel.
    pub connect_timeout: Duration,
    /// Fallback per-attempt timeout applied when a step declares none.
    pub default_step_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cluster_id: constants::DEFAULT_CLUSTER_ID.to_string(),
            discovery_cache_ttl: Duration::from_millis(
                constants::connection::DEFAULT_DISCOVERY_CACHE_TTL_MS,
            ),
            connection_close_timeout: Duration::from_millis(
                constants::connection::DEFAULT_CLOSE_TIMEOUT_MS,
            ),
            connect_timeout: Duration::from_millis(
                constants::connection::DEFAULT_CONNECT_TIMEOUT_MS,
            ),
            default_step_timeout: None,
        }
    }
}

impl EngineConfig {
    /// Build configuration from `DOCFLOW_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(cluster) = std::env::var("DOCFLOW_CLUSTER_ID") {
            if !cluster.trim().is_empty() {
                config.cluster_id = cluster;
            }
        }

        if let Ok(ttl) = std::env::var("DOCFLOW_DISCOVERY_CACHE_TTL_MS") {
            let ttl: u64 = ttl.parse().map_err(|e| {
                EngineError::Configuration(format!("invalid DOCFLOW_DISCOVERY_CACHE_TTL_MS: {e}"))
            })?;
            config.discovery_cache_ttl = Duration::from_millis(ttl);
        }

        if let Ok(timeout) = std::env::var("DOCFLOW_CONNECTION_CLOSE_TIMEOUT_MS") {
            let timeout: u64 = timeout.parse().map_err(|e| {
                EngineError::Configuration(format!(
                    "invalid DOCFLOW_CONNECTION_CLOSE_TIMEOUT_MS: {e}"
                ))
            })?;
            config.connection_close_timeout = Duration::from_millis(timeout);
        }

        if let Ok(timeout) = std::env::var("DOCFLOW_CONNECT_TIMEOUT_MS") {
            let timeout: u64 = timeout.parse().map_err(|e| {
                EngineError::Configuration(format!("invalid DOCFLOW_CONNECT_TIMEOUT_MS: {e}"))
            })?;
            config.connect_timeout = Duration::from_millis(timeout);
        }

        if let Ok(timeout) = std::env::var("DOCFLOW_DEFAULT_STEP_TIMEOUT_MS") {
            let timeout: u64 = timeout.parse().map_err(|e| {
                EngineError::Configuration(format!("invalid DOCFLOW_DEFAULT_STEP_TIMEOUT_MS: {e}"))
            })?;
            config.default_step_timeout = Some(Duration::from_millis(timeout));
        }

        Ok(config)
    }
}
