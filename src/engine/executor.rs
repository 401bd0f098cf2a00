//! The pipeline executor: the engine's top-level state machine.
//!
//! One `execute_pipeline` call runs one document through one pipeline:
//!
//! 1. fetch the definition, build the execution context, register it in the
//!    active-execution index,
//! 2. walk the synchronous chain hop by hop — build a request, route it,
//!    apply the step's retry policy, record history, pick the next step,
//! 3. after every successful worker hop, fan out to the step's secondary
//!    outputs concurrently with the rest of the chain,
//! 4. unregister the context on both success and failure.
//!
//! Hops within one context are strictly sequential; retries of one hop are
//! sequential; fan-out tasks are spawned and never awaited into the main
//! result.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::connection::manager::ConnectionManager;
use crate::engine::definition_source::DefinitionSource;
use crate::engine::observer::{ExecutionObserver, NoopObserver};
use crate::error::{EngineError, Result};
use crate::messaging::message::{RequestMetadata, WorkerRequest, WorkerResponse};
use crate::models::context::{
    ErrorData, ExecutionContext, PipelineResponse, StepExecutionRecord, StepStatus,
};
use crate::models::document::{ActionType, Document};
use crate::models::pipeline::{PipelineDefinition, StepConfig, StepKind};
use crate::transport::router::TransportRouter;
use std::collections::HashMap;

/// Top-level execution engine.
///
/// All collaborators are explicit constructor parameters, and all mutable
/// state (the active-execution index, and the pool behind the connection
/// manager) belongs to the instance — two executors share nothing.
pub struct PipelineExecutor {
    definitions: Arc<dyn DefinitionSource>,
    router: Arc<TransportRouter>,
    connections: Arc<ConnectionManager>,
    active: DashMap<Uuid, Arc<RwLock<ExecutionContext>>>,
    observer: Arc<dyn ExecutionObserver>,
    config: EngineConfig,
}

impl PipelineExecutor {
    pub fn new(
        definitions: Arc<dyn DefinitionSource>,
        router: Arc<TransportRouter>,
        connections: Arc<ConnectionManager>,
        config: EngineConfig,
    ) -> Self {
        Self::with_observer(definitions, router, connections, config, Arc::new(NoopObserver))
    }

    /// Construct an executor that reports every finished run to `observer`.
    pub fn with_observer(
        definitions: Arc<dyn DefinitionSource>,
        router: Arc<TransportRouter>,
        connections: Arc<ConnectionManager>,
        config: EngineConfig,
        observer: Arc<dyn ExecutionObserver>,
    ) -> Self {
        Self {
            definitions,
            router,
            connections,
            active: DashMap::new(),
            observer,
            config,
        }
    }

    /// Run `document` through the named pipeline.
    ///
    /// Resolves to `Accepted` with the run's stream id, or `Error` with a
    /// human-readable message; full diagnostic detail stays on the execution
    /// context until the run is unregistered.
    pub async fn execute_pipeline(
        &self,
        pipeline_name: &str,
        document: Document,
        action: ActionType,
    ) -> PipelineResponse {
        self.execute_pipeline_with_params(pipeline_name, document, action, HashMap::new())
            .await
    }

    /// Like [`execute_pipeline`](Self::execute_pipeline) with caller-supplied
    /// context parameters threaded unchanged through every hop.
    pub async fn execute_pipeline_with_params(
        &self,
        pipeline_name: &str,
        document: Document,
        action: ActionType,
        context_params: HashMap<String, String>,
    ) -> PipelineResponse {
        let definition = match self
            .definitions
            .pipeline_definition(&self.config.cluster_id, pipeline_name)
            .await
        {
            Ok(Some(definition)) => definition,
            Ok(None) => {
                let err = EngineError::DefinitionNotFound(pipeline_name.to_string());
                error!(pipeline = pipeline_name, error = %err, "definition lookup failed");
                return PipelineResponse::error(Uuid::new_v4(), err.to_string());
            }
            Err(e) => {
                error!(pipeline = pipeline_name, error = %e, "definition lookup failed");
                return PipelineResponse::error(Uuid::new_v4(), e.to_string());
            }
        };

        let context = ExecutionContext::new(definition.clone(), document, action, context_params);
        let stream_id = context.stream_id();
        let shared = Arc::new(RwLock::new(context));
        self.active.insert(stream_id, shared.clone());

        info!(
            pipeline = pipeline_name,
            stream_id = %stream_id,
            action = %action,
            "pipeline execution started"
        );

        let outcome = self.execute_stream(&definition, &shared).await;

        {
            let ctx = shared.read();
            match &outcome {
                Ok(()) => self.observer.stream_completed(&ctx),
                Err(_) => self.observer.stream_failed(&ctx),
            }
        }

        // Guaranteed cleanup on both paths.
        self.active.remove(&stream_id);

        match outcome {
            Ok(()) => {
                let hops = shared.read().current_hop();
                info!(
                    pipeline = pipeline_name,
                    stream_id = %stream_id,
                    hops = hops,
                    "pipeline execution completed"
                );
                PipelineResponse::accepted(
                    stream_id,
                    format!("pipeline '{pipeline_name}' completed after {hops} hops"),
                )
            }
            Err(e) => {
                error!(
                    pipeline = pipeline_name,
                    stream_id = %stream_id,
                    error = %e,
                    "pipeline execution failed"
                );
                PipelineResponse::error(stream_id, e.to_string())
            }
        }
    }

    /// Number of executions currently in flight.
    pub fn active_stream_count(&self) -> usize {
        self.active.len()
    }

    /// Snapshot of an in-flight execution's context, if still registered.
    pub fn stream_snapshot(&self, stream_id: Uuid) -> Option<ExecutionContext> {
        self.active.get(&stream_id).map(|e| e.value().read().clone())
    }

    /// Tear down the engine: close every pooled worker connection.
    pub async fn shutdown(&self) {
        self.connections.shutdown().await;
    }

    /// Walk the synchronous chain for one execution.
    async fn execute_stream(
        &self,
        definition: &Arc<PipelineDefinition>,
        shared: &Arc<RwLock<ExecutionContext>>,
    ) -> Result<()> {
        let mut current = match definition.declared_entry() {
            Some(step) => step,
            None => {
                // Documented fallback: without a declared entry the first
                // declared step starts the chain. Fragile when definitions
                // are reordered, so it is loud.
                warn!(
                    pipeline = definition.name(),
                    fallback_step = definition.first_step().name(),
                    "no entry step declared; falling back to first declared step"
                );
                definition.first_step()
            }
        };

        loop {
            match current.kind() {
                StepKind::Entry => {
                    debug!(step = current.name(), "entry step, no worker call");
                    match self.next_step(definition, current)? {
                        Some(next) => current = next,
                        None => return Ok(()),
                    }
                }
                StepKind::Work | StepKind::Terminal => {
                    let hop = shared.write().next_hop();
                    let request = self.build_request(shared, current, hop);
                    let started_at = Utc::now();

                    match self.execute_with_retry(&request, current).await {
                        Ok(response) => {
                            {
                                let mut ctx = shared.write();
                                ctx.append_record(StepExecutionRecord {
                                    hop,
                                    step_name: current.name().to_string(),
                                    started_at,
                                    finished_at: Utc::now(),
                                    status: StepStatus::Success,
                                    logs: response.logs,
                                    error: None,
                                });
                                if let Some(document) = response.document {
                                    ctx.replace_document(document);
                                }
                            }

                            self.fan_out(definition, current, shared);

                            if current.kind() == StepKind::Terminal {
                                return Ok(());
                            }
                            match self.next_step(definition, current)? {
                                Some(next) => current = next,
                                None => return Ok(()),
                            }
                        }
                        Err(e) => {
                            let error_data = ErrorData {
                                code: e.code().to_string(),
                                message: e.to_string(),
                                technical_detail: match &e {
                                    EngineError::Worker { detail, .. } => {
                                        detail.as_ref().map(|v| v.to_string())
                                    }
                                    _ => None,
                                },
                                step_name: Some(current.name().to_string()),
                                occurred_at: Utc::now(),
                            };
                            let mut ctx = shared.write();
                            ctx.append_record(StepExecutionRecord {
                                hop,
                                step_name: current.name().to_string(),
                                started_at,
                                finished_at: Utc::now(),
                                status: StepStatus::Failure,
                                logs: Vec::new(),
                                error: Some(error_data.clone()),
                            });
                            ctx.set_error(error_data);
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// First synchronous output of `step`, resolved against the definition.
    fn next_step<'a>(
        &self,
        definition: &'a PipelineDefinition,
        step: &StepConfig,
    ) -> Result<Option<&'a StepConfig>> {
        match step.first_synchronous_output() {
            Some(output) => {
                let next = definition.step(output.target_step()).ok_or_else(|| {
                    EngineError::Configuration(format!(
                        "step '{}' output '{}' targets unknown step '{}'",
                        step.name(),
                        output.name(),
                        output.target_step()
                    ))
                })?;
                Ok(Some(next))
            }
            None => Ok(None),
        }
    }

    /// Execute one hop's worker call under the step's retry policy.
    ///
    /// `max_retries = N` yields at most `N + 1` attempts, with sequential
    /// exponentially backed-off delays between them. A worker-reported
    /// failure stops retrying immediately; so does any non-retryable error.
    async fn execute_with_retry(
        &self,
        request: &WorkerRequest,
        step: &StepConfig,
    ) -> Result<WorkerResponse> {
        let policy = step.retry_policy();
        let max_attempts = policy.max_retries() + 1;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match self.attempt(request, step).await {
                Ok(response) if response.success => {
                    if attempt > 1 {
                        info!(
                            step = step.name(),
                            attempt = attempt,
                            "step succeeded after retry"
                        );
                    }
                    return Ok(response);
                }
                Ok(response) => {
                    // The worker made a decision; replaying the same document
                    // is not retried by default.
                    let (message, detail) = match response.error {
                        Some(e) => (e.message, e.technical_detail),
                        None => ("worker reported failure".to_string(), None),
                    };
                    return Err(EngineError::Worker {
                        step: step.name().to_string(),
                        message,
                        detail,
                    });
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        step = step.name(),
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One attempt: route the request, bounded by the step's timeout.
    async fn attempt(&self, request: &WorkerRequest, step: &StepConfig) -> Result<WorkerResponse> {
        let attempt_timeout: Option<Duration> =
            step.step_timeout().or(self.config.default_step_timeout);

        match attempt_timeout {
            Some(t) => match timeout(t, self.router.route_request(request, step)).await {
                Ok(result) => result,
                Err(_) => Err(EngineError::Timeout {
                    step: step.name().to_string(),
                    timeout_ms: t.as_millis() as u64,
                }),
            },
            None => self.router.route_request(request, step).await,
        }
    }

    /// Spawn one dispatch task per secondary output of a just-succeeded step.
    ///
    /// Tasks run concurrently with each other and with the continuation of
    /// the main chain; their results are observed only for logging.
    fn fan_out(
        &self,
        definition: &Arc<PipelineDefinition>,
        step: &StepConfig,
        shared: &Arc<RwLock<ExecutionContext>>,
    ) {
        let outputs = step.fan_out_outputs();
        if outputs.is_empty() {
            return;
        }

        let stream_id = shared.read().stream_id();
        let hop = shared.read().current_hop();

        for output in outputs {
            let Some(target_step) = definition.step(output.target_step()) else {
                warn!(
                    stream_id = %stream_id,
                    step = step.name(),
                    output = output.name(),
                    target = output.target_step(),
                    "fan-out output targets unknown step, skipping"
                );
                continue;
            };

            let request = self.build_request(shared, target_step, hop);
            let router = self.router.clone();
            let target_config = target_step.clone();
            let output = output.clone();

            tokio::spawn(async move {
                let result = router.route_stream(&request, &target_config, &output).await;
                if result.success {
                    debug!(
                        stream_id = %stream_id,
                        target = %result.target_step,
                        transport = %result.transport,
                        detail = %result.detail,
                        "fan-out delivered"
                    );
                } else {
                    warn!(
                        stream_id = %stream_id,
                        target = %result.target_step,
                        transport = %result.transport,
                        detail = %result.detail,
                        "fan-out dispatch failed"
                    );
                }
            });
        }
    }

    /// Build the worker request for `step` from the current context state.
    fn build_request(
        &self,
        shared: &Arc<RwLock<ExecutionContext>>,
        step: &StepConfig,
        hop: u32,
    ) -> WorkerRequest {
        let ctx = shared.read();
        WorkerRequest {
            document: ctx.current_document().clone(),
            metadata: RequestMetadata {
                pipeline_name: ctx.pipeline_name().to_string(),
                step_name: step.name().to_string(),
                stream_id: ctx.stream_id(),
                hop,
                action: ctx.action(),
                history: ctx.history().to_vec(),
                context_params: ctx.context_params().clone(),
                issued_at: Utc::now(),
            },
            step_params: step.params().clone(),
            structured_params: step.structured_params().cloned(),
        }
    }
}
