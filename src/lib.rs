#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Docflow Core
//!
//! Execution engine that moves a document through a configured chain of
//! processing steps, each backed by a remotely discovered worker, across
//! heterogeneous transports.
//!
//! ## Architecture
//!
//! The engine composes, leaves first:
//!
//! - [`discovery`] — registry collaborator, uniform-random load balancing,
//!   and by-name service resolution
//! - [`connection`] — pooled worker connections keyed by endpoint, with
//!   TTL-cached and always-fresh resolution paths
//! - [`transport`] — one handler per delivery mechanism (synchronous RPC,
//!   async queue publish, in-process handlers) behind a typed router
//! - [`engine`] — the top-level state machine: walks a pipeline step by
//!   step, applies per-step retry with exponential backoff, records history,
//!   and fans out to secondary outputs concurrently
//! - [`models`] / [`messaging`] — the shared data model and wire messages
//!
//! Everything the engine talks to externally — the pipeline-definition
//! store, the service registry, the queue broker, the worker channel
//! protocol — is a trait injected at construction. Content transformation
//! lives entirely inside workers; the engine only moves documents between
//! them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docflow_core::config::EngineConfig;
//! use docflow_core::connection::{ConnectionManager, ConnectionManagerConfig, TcpChannelFactory};
//! use docflow_core::discovery::{LoadBalancer, ServiceDiscovery, StaticRegistryClient};
//! use docflow_core::engine::{InMemoryDefinitionSource, PipelineExecutor};
//! use docflow_core::messaging::InMemoryQueueProducer;
//! use docflow_core::models::{ActionType, Document};
//! use docflow_core::transport::{QueueTransportHandler, RpcTransportHandler, TransportRouter};
//!
//! # async fn example() {
//! let config = EngineConfig::default();
//!
//! let registry = Arc::new(StaticRegistryClient::new());
//! let discovery = Arc::new(ServiceDiscovery::new(registry, LoadBalancer::new()));
//! let connections = Arc::new(ConnectionManager::new(
//!     discovery,
//!     Arc::new(TcpChannelFactory::new(config.connect_timeout)),
//!     ConnectionManagerConfig::default(),
//! ));
//!
//! let router = Arc::new(TransportRouter::new());
//! router
//!     .register_handler(Arc::new(RpcTransportHandler::new(connections.clone())))
//!     .await;
//! router
//!     .register_handler(Arc::new(QueueTransportHandler::new(Arc::new(
//!         InMemoryQueueProducer::new(),
//!     ))))
//!     .await;
//!
//! let executor = PipelineExecutor::new(
//!     Arc::new(InMemoryDefinitionSource::new()),
//!     router,
//!     connections,
//!     config,
//! );
//!
//! let response = executor
//!     .execute_pipeline("ingest", Document::new("doc-1", "Hello"), ActionType::Create)
//!     .await;
//! println!("{:?} stream {}", response.status, response.stream_id);
//!
//! executor.shutdown().await;
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod constants;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod transport;

pub use config::EngineConfig;
pub use engine::{DefinitionSource, InMemoryDefinitionSource, PipelineExecutor};
pub use error::{EngineError, Result};
pub use models::{
    ActionType, Document, PipelineDefinition, PipelineResponse, ResponseStatus, StepConfig,
    StepKind, TransportConfig, TransportKind,
};
