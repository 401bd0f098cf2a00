//! Shared fixtures for the integration suites: scripted worker channels, a
//! capturing observer, and a fully wired engine harness that never touches
//! the network.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use docflow_core::config::EngineConfig;
use docflow_core::connection::{
    ChannelFactory, ConnectionManager, ConnectionManagerConfig, WorkerChannel,
};
use docflow_core::discovery::{LoadBalancer, ServiceDiscovery, StaticRegistryClient};
use docflow_core::engine::{
    ExecutionObserver, InMemoryDefinitionSource, PipelineExecutor,
};
use docflow_core::error::{EngineError, Result};
use docflow_core::messaging::{InMemoryQueueProducer, WorkerRequest, WorkerResponse};
use docflow_core::models::context::ExecutionContext;
use docflow_core::models::{
    Document, OutputTarget, ServiceInstance, StepConfig, StepKind, TransportConfig,
};
use docflow_core::transport::{
    LocalTransportHandler, QueueTransportHandler, RpcTransportHandler, TransportRouter,
};

/// Behavior of every scripted worker channel in a harness.
pub type WorkerScript = Arc<dyn Fn(&WorkerRequest) -> Result<WorkerResponse> + Send + Sync>;

/// Channel factory fabricating in-process channels that run a shared script.
pub struct ScriptedChannelFactory {
    script: WorkerScript,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedChannelFactory {
    pub fn new(script: WorkerScript) -> Self {
        Self {
            script,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Delay every worker call, for timeout scenarios.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

struct ScriptedChannel {
    endpoint: String,
    script: WorkerScript,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl WorkerChannel for ScriptedChannel {
    async fn process(&self, request: &WorkerRequest) -> Result<WorkerResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.script)(request)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChannelFactory for ScriptedChannelFactory {
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn WorkerChannel>> {
        Ok(Arc::new(ScriptedChannel {
            endpoint: format!("{host}:{port}"),
            script: self.script.clone(),
            delay: self.delay,
            calls: self.calls.clone(),
        }))
    }
}

/// Observer capturing the final context of every run.
#[derive(Default)]
pub struct CapturingObserver {
    completed: Mutex<Vec<ExecutionContext>>,
    failed: Mutex<Vec<ExecutionContext>>,
}

impl CapturingObserver {
    pub fn completed(&self) -> Vec<ExecutionContext> {
        self.completed.lock().clone()
    }

    pub fn failed(&self) -> Vec<ExecutionContext> {
        self.failed.lock().clone()
    }
}

impl ExecutionObserver for CapturingObserver {
    fn stream_completed(&self, context: &ExecutionContext) {
        self.completed.lock().push(context.clone());
    }

    fn stream_failed(&self, context: &ExecutionContext) {
        self.failed.lock().push(context.clone());
    }
}

/// A fully wired engine over scripted channels and in-memory collaborators.
pub struct TestHarness {
    pub executor: Arc<PipelineExecutor>,
    pub registry: Arc<StaticRegistryClient>,
    pub definitions: Arc<InMemoryDefinitionSource>,
    pub producer: Arc<InMemoryQueueProducer>,
    pub local_transport: Arc<LocalTransportHandler>,
    pub observer: Arc<CapturingObserver>,
    pub worker_calls: Arc<AtomicUsize>,
}

impl TestHarness {
    pub async fn new(script: WorkerScript) -> Self {
        Self::with_factory(ScriptedChannelFactory::new(script)).await
    }

    pub async fn with_factory(factory: ScriptedChannelFactory) -> Self {
        let worker_calls = factory.calls();

        let registry = Arc::new(StaticRegistryClient::new());
        let discovery = Arc::new(ServiceDiscovery::new(registry.clone(), LoadBalancer::new()));
        let connections = Arc::new(ConnectionManager::new(
            discovery,
            Arc::new(factory),
            ConnectionManagerConfig::default(),
        ));

        let producer = Arc::new(InMemoryQueueProducer::new());
        let local_transport = Arc::new(LocalTransportHandler::new());

        let router = Arc::new(TransportRouter::new());
        router
            .register_handler(Arc::new(RpcTransportHandler::new(connections.clone())))
            .await;
        router
            .register_handler(Arc::new(QueueTransportHandler::new(producer.clone())))
            .await;
        router.register_handler(local_transport.clone()).await;

        let definitions = Arc::new(InMemoryDefinitionSource::new());
        let observer = Arc::new(CapturingObserver::default());

        let executor = Arc::new(PipelineExecutor::with_observer(
            definitions.clone(),
            router,
            connections,
            EngineConfig::default(),
            observer.clone(),
        ));

        Self {
            executor,
            registry,
            definitions,
            producer,
            local_transport,
            observer,
            worker_calls,
        }
    }

    /// Register `count` healthy instances under a logical service name.
    pub fn register_instances(&self, service: &str, count: usize) {
        for i in 0..count {
            self.registry.register(
                service,
                ServiceInstance::new(format!("{service}-{i}"), format!("10.0.0.{}", i + 1), 9090),
            );
        }
    }

    pub fn worker_call_count(&self) -> usize {
        self.worker_calls.load(Ordering::SeqCst)
    }
}

/// Script echoing the document body back with a prefix.
pub fn echo_script(prefix: &str) -> WorkerScript {
    let prefix = prefix.to_string();
    Arc::new(move |request| {
        let document = Document::new(
            request.document.id.clone(),
            format!("{prefix}{}", request.document.body),
        );
        Ok(WorkerResponse::ok(Some(document)))
    })
}

/// Script failing every call at the transport level.
pub fn transport_failure_script(detail: &str) -> WorkerScript {
    let detail = detail.to_string();
    Arc::new(move |request| {
        Err(EngineError::Transport {
            endpoint: format!("scripted:{}", request.metadata.step_name),
            detail: detail.clone(),
        })
    })
}

/// Script where the worker answers but reports a processing failure.
pub fn worker_failure_script(message: &str) -> WorkerScript {
    let message = message.to_string();
    Arc::new(move |_request| {
        Ok(WorkerResponse::failed(
            docflow_core::messaging::WorkerErrorDetail {
                code: "UNSUPPORTED".to_string(),
                message: message.clone(),
                technical_detail: None,
            },
        ))
    })
}

pub fn sync_output(name: &str, target: &str) -> OutputTarget {
    OutputTarget::new(name, target, TransportConfig::synchronous_rpc()).unwrap()
}

pub fn queue_output(name: &str, target: &str, topic: &str) -> OutputTarget {
    OutputTarget::new(name, target, TransportConfig::async_queue(topic, None)).unwrap()
}

/// Entry step dispatching to `next` over the synchronous transport.
pub fn entry_step(name: &str, next: &str) -> StepConfig {
    StepConfig::builder(name, StepKind::Entry)
        .remote_service("ingest-gateway")
        .output(sync_output("main", next))
        .build()
        .unwrap()
}

pub fn work_step(name: &str, service: &str) -> StepConfig {
    StepConfig::builder(name, StepKind::Work)
        .remote_service(service)
        .build()
        .unwrap()
}

/// Poll until `predicate` holds or the budget elapses.
pub async fn wait_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within budget");
}

pub fn params(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
