//! Pooled worker connections.
//!
//! Connections are created lazily, shared across every in-flight execution,
//! and closed only during engine shutdown — the pool never evicts silently.
//! The pool map is sharded (`DashMap`), so unrelated executions do not
//! serialize on a global lock.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::connection::channel::{ChannelFactory, WorkerChannel};
use crate::discovery::service_discovery::ServiceDiscovery;
use crate::error::{EngineError, Result};
use crate::messaging::message::{WorkerRequest, WorkerResponse};
use crate::models::instance::ServiceInstance;

/// Lifecycle of a pooled connection.
///
/// `Absent` is implicit (no pool entry). Only `Open` is observable through
/// `get_connection`; `Closing` and `Closed` exist during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Creating = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl From<u8> for ConnectionState {
    fn from(value: u8) -> Self {
        match value {
            0 => ConnectionState::Creating,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// One pooled connection, keyed by `host:port`.
///
/// The channel body is established at most once per entry: concurrent callers
/// race on a `OnceCell`, and every winner and waiter observes the same
/// underlying channel.
pub struct PooledConnection {
    endpoint: String,
    state: AtomicU8,
    channel: OnceCell<Arc<dyn WorkerChannel>>,
}

impl PooledConnection {
    fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: AtomicU8::new(ConnectionState::Creating as u8),
            channel: OnceCell::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::Acquire))
    }

    async fn open(&self, factory: &dyn ChannelFactory, host: &str, port: u16) -> Result<()> {
        self.channel
            .get_or_try_init(|| factory.connect(host, port))
            .await?;
        self.state
            .store(ConnectionState::Open as u8, Ordering::Release);
        Ok(())
    }

    /// Execute one worker call over this connection.
    pub async fn process(&self, request: &WorkerRequest) -> Result<WorkerResponse> {
        match (self.state(), self.channel.get()) {
            (ConnectionState::Open, Some(channel)) => channel.process(request).await,
            _ => Err(EngineError::Transport {
                endpoint: self.endpoint.clone(),
                detail: "connection is not open".to_string(),
            }),
        }
    }

    /// Close gracefully within `timeout`; force the state over on expiry.
    /// Returns whether the close completed in time.
    async fn close(&self, timeout: Duration) -> bool {
        self.state
            .store(ConnectionState::Closing as u8, Ordering::Release);

        let graceful = match self.channel.get() {
            Some(channel) => tokio::time::timeout(timeout, channel.close())
                .await
                .map(|r| r.is_ok())
                .unwrap_or(false),
            None => true,
        };

        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
        graceful
    }
}

#[derive(Clone)]
struct CachedResolution {
    instance: ServiceInstance,
    resolved_at: Instant,
}

/// Configuration for the connection pool.
#[derive(Debug, Clone)]
pub struct ConnectionManagerConfig {
    /// TTL for cached discovery resolutions.
    pub discovery_cache_ttl: Duration,
    /// Budget for each graceful connection close during shutdown.
    pub close_timeout: Duration,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        Self {
            discovery_cache_ttl: Duration::from_millis(
                crate::constants::connection::DEFAULT_DISCOVERY_CACHE_TTL_MS,
            ),
            close_timeout: Duration::from_millis(
                crate::constants::connection::DEFAULT_CLOSE_TIMEOUT_MS,
            ),
        }
    }
}

/// Thread-safe pool of worker connections with by-name resolution.
pub struct ConnectionManager {
    discovery: Arc<ServiceDiscovery>,
    factory: Arc<dyn ChannelFactory>,
    pool: DashMap<String, Arc<PooledConnection>>,
    resolution_cache: DashMap<String, CachedResolution>,
    config: ConnectionManagerConfig,
}

impl ConnectionManager {
    pub fn new(
        discovery: Arc<ServiceDiscovery>,
        factory: Arc<dyn ChannelFactory>,
        config: ConnectionManagerConfig,
    ) -> Self {
        Self {
            discovery,
            factory,
            pool: DashMap::new(),
            resolution_cache: DashMap::new(),
            config,
        }
    }

    /// Get-or-create the connection for `host:port`.
    ///
    /// Concurrent calls for one key yield the identical connection; the
    /// channel body is established exactly once. A failed establishment
    /// removes the placeholder entry so later calls start fresh.
    pub async fn get_connection(&self, host: &str, port: u16) -> Result<Arc<PooledConnection>> {
        let key = format!("{host}:{port}");

        let connection = {
            let entry = self
                .pool
                .entry(key.clone())
                .or_insert_with(|| Arc::new(PooledConnection::new(&key)));
            entry.value().clone()
        };

        match connection.open(self.factory.as_ref(), host, port).await {
            Ok(()) => Ok(connection),
            Err(e) => {
                self.pool
                    .remove_if(&key, |_, c| c.state() != ConnectionState::Open);
                Err(e)
            }
        }
    }

    /// Resolve `service` freshly through discovery and return its pooled
    /// connection. Every call re-resolves, so each call gets fresh load
    /// balancing across healthy instances.
    pub async fn client_for_service(&self, service: &str) -> Result<Arc<PooledConnection>> {
        let instance = self.discovery.discover_service(service).await?;
        self.get_connection(&instance.host, instance.port).await
    }

    /// Like [`client_for_service`](Self::client_for_service), but reuses a
    /// cached resolution within the configured TTL to skip the discovery
    /// round-trip.
    pub async fn client_for_service_cached(&self, service: &str) -> Result<Arc<PooledConnection>> {
        if let Some(cached) = self.resolution_cache.get(service) {
            if cached.resolved_at.elapsed() <= self.config.discovery_cache_ttl {
                let instance = cached.instance.clone();
                drop(cached);
                debug!(service = service, endpoint = %instance.endpoint(), "using cached resolution");
                return self.get_connection(&instance.host, instance.port).await;
            }
            drop(cached);
            self.resolution_cache.remove(service);
        }

        let instance = self.discovery.discover_service(service).await?;
        self.resolution_cache.insert(
            service.to_string(),
            CachedResolution {
                instance: instance.clone(),
                resolved_at: Instant::now(),
            },
        );
        self.get_connection(&instance.host, instance.port).await
    }

    /// Number of currently open connections.
    pub fn active_connections(&self) -> usize {
        self.pool
            .iter()
            .filter(|e| e.value().state() == ConnectionState::Open)
            .count()
    }

    /// Whether an open connection exists for `host:port`.
    pub fn has_connection(&self, host: &str, port: u16) -> bool {
        self.pool
            .get(&format!("{host}:{port}"))
            .map(|e| e.value().state() == ConnectionState::Open)
            .unwrap_or(false)
    }

    /// Close every pooled connection and clear the pool.
    ///
    /// Graceful closes run concurrently within the configured budget; any
    /// connection that does not complete in time is force-closed. Idempotent:
    /// a second call sees an empty pool and does nothing.
    pub async fn shutdown(&self) {
        let connections: Vec<Arc<PooledConnection>> = self
            .pool
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.pool.clear();
        self.resolution_cache.clear();

        if connections.is_empty() {
            return;
        }

        info!(connections = connections.len(), "closing pooled connections");

        let close_timeout = self.config.close_timeout;
        let results = futures::future::join_all(
            connections
                .iter()
                .map(|connection| connection.close(close_timeout)),
        )
        .await;

        let forced = results.iter().filter(|graceful| !**graceful).count();
        if forced > 0 {
            warn!(forced = forced, "connections force-closed after timeout");
        }
        info!("connection pool shut down");
    }
}
