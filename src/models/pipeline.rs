//! Pipeline definitions: steps, processors, transports, retry policy.
//!
//! A [`PipelineDefinition`] is loaded once per execution from the external
//! configuration collaborator and held immutable behind an `Arc` for the
//! duration of the run. All structural invariants are enforced at
//! construction time so the executor never has to re-validate wiring
//! mid-flight:
//!
//! - step names and output names are unique,
//! - every step references exactly one processor (remote service or local
//!   handler),
//! - transport-specific output configuration exists exactly when the matching
//!   transport kind is selected.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::constants::retry;
use crate::error::{EngineError, Result};

/// Role of a step within its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    /// Chain entry point; dispatches to its synchronous output without a worker call.
    Entry,
    /// Regular processing step; continues the chain after success.
    Work,
    /// Final processing step; the chain stops after it succeeds.
    Terminal,
}

/// Delivery mechanism used to reach a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportKind {
    /// Request/response RPC against a discovered worker instance.
    SynchronousRpc,
    /// Fire-and-forget publish to a message queue.
    AsyncQueue,
    /// In-process handler resolved from a typed registry.
    LocalHandler,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::SynchronousRpc => write!(f, "SYNCHRONOUS_RPC"),
            TransportKind::AsyncQueue => write!(f, "ASYNC_QUEUE"),
            TransportKind::LocalHandler => write!(f, "LOCAL_HANDLER"),
        }
    }
}

/// Reference to the processor backing a step.
///
/// Exactly one variant exists per step; [`StepConfigBuilder`] rejects
/// configurations that set both or neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorRef {
    /// Logical service name resolved through the registry at call time.
    RemoteService(String),
    /// Name of an in-process handler registered with the local transport.
    LocalHandler(String),
}

impl ProcessorRef {
    /// Transport kind the synchronous chain uses to reach this processor.
    pub fn transport_kind(&self) -> TransportKind {
        match self {
            ProcessorRef::RemoteService(_) => TransportKind::SynchronousRpc,
            ProcessorRef::LocalHandler(_) => TransportKind::LocalHandler,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ProcessorRef::RemoteService(name) | ProcessorRef::LocalHandler(name) => name,
        }
    }
}

/// Bounded exponential backoff applied when a step's worker call fails.
///
/// Invalid inputs are clamped to defaults rather than rejected; a pipeline
/// with a nonsensical policy still runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    retry_backoff: Duration,
    max_retry_backoff: Duration,
    backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: retry::DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_millis(retry::DEFAULT_RETRY_BACKOFF_MS),
            max_retry_backoff: Duration::from_millis(retry::DEFAULT_MAX_RETRY_BACKOFF_MS),
            backoff_multiplier: retry::DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Build a policy from raw configuration values, clamping anything
    /// negative, zero-where-zero-is-meaningless, or non-finite back to the
    /// defaults.
    pub fn new(
        max_retries: i64,
        retry_backoff_ms: i64,
        max_retry_backoff_ms: i64,
        backoff_multiplier: f64,
    ) -> Self {
        let defaults = Self::default();

        let max_retries = if max_retries >= 0 {
            max_retries.min(u32::MAX as i64) as u32
        } else {
            defaults.max_retries
        };
        let retry_backoff = if retry_backoff_ms > 0 {
            Duration::from_millis(retry_backoff_ms as u64)
        } else {
            defaults.retry_backoff
        };
        let max_retry_backoff = if max_retry_backoff_ms > 0 {
            Duration::from_millis(max_retry_backoff_ms as u64)
        } else {
            defaults.max_retry_backoff
        };
        let backoff_multiplier = if backoff_multiplier.is_finite() && backoff_multiplier >= 1.0 {
            backoff_multiplier
        } else {
            defaults.backoff_multiplier
        };

        Self {
            max_retries,
            retry_backoff,
            max_retry_backoff,
            backoff_multiplier,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (1-based):
    /// `min(max_backoff, base * multiplier^(attempt - 1))`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.backoff_multiplier.powi(exponent.min(i32::MAX as u32) as i32);
        let delay_ms = self.retry_backoff.as_millis() as f64 * factor;
        let capped_ms = delay_ms.min(self.max_retry_backoff.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }
}

/// Transport-specific configuration for one output edge.
///
/// Modeled as an enum so the transport-specific fields exist exactly when the
/// matching transport kind is selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportConfig {
    SynchronousRpc {
        /// Optional per-call timeout override for fan-out calls on this edge.
        call_timeout_ms: Option<u64>,
    },
    AsyncQueue {
        topic: String,
        partition_key: Option<String>,
    },
}

impl TransportConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportConfig::SynchronousRpc { .. } => TransportKind::SynchronousRpc,
            TransportConfig::AsyncQueue { .. } => TransportKind::AsyncQueue,
        }
    }

    /// RPC config with no timeout override.
    pub fn synchronous_rpc() -> Self {
        TransportConfig::SynchronousRpc {
            call_timeout_ms: None,
        }
    }

    pub fn async_queue(topic: impl Into<String>, partition_key: Option<String>) -> Self {
        TransportConfig::AsyncQueue {
            topic: topic.into(),
            partition_key,
        }
    }
}

/// One output edge of a step.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTarget {
    name: String,
    target_step: String,
    transport: TransportConfig,
}

impl OutputTarget {
    pub fn new(
        name: impl Into<String>,
        target_step: impl Into<String>,
        transport: TransportConfig,
    ) -> Result<Self> {
        let name = name.into();
        let target_step = target_step.into();

        if name.trim().is_empty() {
            return Err(EngineError::Validation(
                "output name must not be blank".to_string(),
            ));
        }
        if target_step.trim().is_empty() {
            return Err(EngineError::Validation(format!(
                "output '{name}' has a blank target step"
            )));
        }
        if let TransportConfig::AsyncQueue { topic, .. } = &transport {
            if topic.trim().is_empty() {
                return Err(EngineError::Validation(format!(
                    "output '{name}' declares an async queue transport with a blank topic"
                )));
            }
        }

        Ok(Self {
            name,
            target_step,
            transport,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_step(&self) -> &str {
        &self.target_step
    }

    pub fn transport(&self) -> &TransportConfig {
        &self.transport
    }
}

/// Configuration of one pipeline step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepConfig {
    name: String,
    kind: StepKind,
    processor: ProcessorRef,
    retry_policy: RetryPolicy,
    step_timeout: Option<Duration>,
    outputs: Vec<OutputTarget>,
    params: HashMap<String, String>,
    structured_params: Option<serde_json::Value>,
}

impl StepConfig {
    pub fn builder(name: impl Into<String>, kind: StepKind) -> StepConfigBuilder {
        StepConfigBuilder::new(name, kind)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn processor(&self) -> &ProcessorRef {
        &self.processor
    }

    /// Logical service name when the step is backed by a remote worker.
    pub fn remote_service(&self) -> Option<&str> {
        match &self.processor {
            ProcessorRef::RemoteService(name) => Some(name),
            ProcessorRef::LocalHandler(_) => None,
        }
    }

    /// Registered handler name when the step runs in-process.
    pub fn local_handler(&self) -> Option<&str> {
        match &self.processor {
            ProcessorRef::LocalHandler(name) => Some(name),
            ProcessorRef::RemoteService(_) => None,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout
    }

    pub fn outputs(&self) -> &[OutputTarget] {
        &self.outputs
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn structured_params(&self) -> Option<&serde_json::Value> {
        self.structured_params.as_ref()
    }

    /// The output that continues the synchronous chain: the first declared
    /// output using the synchronous RPC transport. Remaining outputs are
    /// fan-out only.
    pub fn first_synchronous_output(&self) -> Option<&OutputTarget> {
        self.outputs
            .iter()
            .find(|o| o.transport().kind() == TransportKind::SynchronousRpc)
    }

    /// Every output except the one continuing the synchronous chain.
    pub fn fan_out_outputs(&self) -> Vec<&OutputTarget> {
        let primary = self.first_synchronous_output().map(|o| o.name().to_string());
        self.outputs
            .iter()
            .filter(|o| primary.as_deref() != Some(o.name()))
            .collect()
    }
}

/// Builder enforcing the exactly-one-processor invariant.
#[derive(Debug)]
pub struct StepConfigBuilder {
    name: String,
    kind: StepKind,
    remote_service: Option<String>,
    local_handler: Option<String>,
    retry_policy: RetryPolicy,
    step_timeout: Option<Duration>,
    outputs: Vec<OutputTarget>,
    params: HashMap<String, String>,
    structured_params: Option<serde_json::Value>,
}

impl StepConfigBuilder {
    fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            kind,
            remote_service: None,
            local_handler: None,
            retry_policy: RetryPolicy::default(),
            step_timeout: None,
            outputs: Vec::new(),
            params: HashMap::new(),
            structured_params: None,
        }
    }

    pub fn remote_service(mut self, service: impl Into<String>) -> Self {
        self.remote_service = Some(service.into());
        self
    }

    pub fn local_handler(mut self, handler: impl Into<String>) -> Self {
        self.local_handler = Some(handler.into());
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn output(mut self, output: OutputTarget) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn structured_params(mut self, params: serde_json::Value) -> Self {
        self.structured_params = Some(params);
        self
    }

    pub fn build(self) -> Result<StepConfig> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation(
                "step name must not be blank".to_string(),
            ));
        }

        let processor = match (self.remote_service, self.local_handler) {
            (Some(service), None) => ProcessorRef::RemoteService(service),
            (None, Some(handler)) => ProcessorRef::LocalHandler(handler),
            (Some(_), Some(_)) => {
                return Err(EngineError::Validation(format!(
                    "step '{}' references both a remote service and a local handler",
                    self.name
                )))
            }
            (None, None) => {
                return Err(EngineError::Validation(format!(
                    "step '{}' references neither a remote service nor a local handler",
                    self.name
                )))
            }
        };

        let mut seen = std::collections::HashSet::new();
        for output in &self.outputs {
            if !seen.insert(output.name().to_string()) {
                return Err(EngineError::Validation(format!(
                    "step '{}' declares duplicate output '{}'",
                    self.name,
                    output.name()
                )));
            }
        }

        Ok(StepConfig {
            name: self.name,
            kind: self.kind,
            processor,
            retry_policy: self.retry_policy,
            step_timeout: self.step_timeout,
            outputs: self.outputs,
            params: self.params,
            structured_params: self.structured_params,
        })
    }
}

/// An immutable, validated pipeline: ordered steps with unique names.
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    name: String,
    steps: Vec<StepConfig>,
    index: HashMap<String, usize>,
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>, steps: Vec<StepConfig>) -> Result<Self> {
        let name = name.into();

        if steps.is_empty() {
            return Err(EngineError::Validation(format!(
                "pipeline '{name}' declares no steps"
            )));
        }

        let mut index = HashMap::with_capacity(steps.len());
        for (position, step) in steps.iter().enumerate() {
            if index.insert(step.name().to_string(), position).is_some() {
                return Err(EngineError::Validation(format!(
                    "pipeline '{name}' declares duplicate step '{}'",
                    step.name()
                )));
            }
        }

        Ok(Self { name, steps, index })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[StepConfig] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<&StepConfig> {
        self.index.get(name).map(|&i| &self.steps[i])
    }

    /// The step declared with [`StepKind::Entry`], if any.
    pub fn declared_entry(&self) -> Option<&StepConfig> {
        self.steps.iter().find(|s| s.kind() == StepKind::Entry)
    }

    /// Fallback entry point used when no step declares itself the entry.
    /// Callers are expected to log that the fallback was taken.
    pub fn first_step(&self) -> &StepConfig {
        &self.steps[0]
    }
}
