//! Discovered worker instances.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One healthy instance of a named worker service.
///
/// Produced fresh by every discovery call and never persisted; holding on to
/// an instance across calls defeats the registry's health filtering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceInstance {
    /// Registry-assigned instance identifier.
    pub id: String,
    pub host: String,
    pub port: u16,
    /// Whether the instance expects a TLS transport.
    pub secure: bool,
    /// Registry tags (version, zone, capabilities).
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            secure: false,
            metadata: HashMap::new(),
        }
    }

    /// `host:port` key used by the connection pool.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
