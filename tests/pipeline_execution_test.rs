//! End-to-end pipeline execution over scripted worker channels.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use docflow_core::messaging::{WorkerRequest, WorkerResponse};
use docflow_core::models::{
    ActionType, Document, PipelineDefinition, ResponseStatus, RetryPolicy, StepConfig, StepKind,
    StepStatus,
};

use common::*;

fn document(body: &str) -> Document {
    Document::new("doc-1", body)
}

#[tokio::test]
async fn entry_work_pipeline_processes_document() {
    let harness = TestHarness::new(echo_script("Processed: ")).await;
    harness.register_instances("processor-service", 1);

    let definition = PipelineDefinition::new(
        "ingest",
        vec![
            entry_step("start", "process"),
            work_step("process", "processor-service"),
        ],
    )
    .unwrap();
    harness.definitions.insert("default", definition);

    let response = harness
        .executor
        .execute_pipeline("ingest", document("Hello"), ActionType::Create)
        .await;

    assert_eq!(response.status, ResponseStatus::Accepted);
    assert_eq!(harness.executor.active_stream_count(), 0);

    let completed = harness.observer.completed();
    assert_eq!(completed.len(), 1);
    let context = &completed[0];
    assert_eq!(context.current_document().body, "Processed: Hello");
    assert_eq!(context.history().len(), 1);
    assert_eq!(context.history()[0].hop, 1);
    assert_eq!(context.history()[0].step_name, "process");
    assert_eq!(context.history()[0].status, StepStatus::Success);
    assert_eq!(context.current_hop(), 1);
}

#[tokio::test]
async fn unknown_pipeline_is_an_error() {
    let harness = TestHarness::new(echo_script("x")).await;

    let response = harness
        .executor
        .execute_pipeline("ghost", document("Hello"), ActionType::Create)
        .await;

    assert_eq!(response.status, ResponseStatus::Error);
    assert!(response.message.contains("ghost"));
    assert_eq!(harness.executor.active_stream_count(), 0);
    assert_eq!(harness.worker_call_count(), 0);
}

#[tokio::test]
async fn unresolvable_service_surfaces_after_retries() {
    let harness = TestHarness::new(echo_script("x")).await;
    // "missing-service" is never registered.

    let step = StepConfig::builder("resolve", StepKind::Work)
        .remote_service("missing-service")
        .retry_policy(RetryPolicy::new(2, 5, 20, 2.0))
        .build()
        .unwrap();
    let definition = PipelineDefinition::new("ingest", vec![step]).unwrap();
    harness.definitions.insert("default", definition);

    let response = harness
        .executor
        .execute_pipeline("ingest", document("Hello"), ActionType::Create)
        .await;

    assert_eq!(response.status, ResponseStatus::Error);
    assert!(response.message.contains("missing-service"));

    let failed = harness.observer.failed();
    assert_eq!(failed.len(), 1);
    let error = failed[0].error().unwrap();
    assert_eq!(error.code, "SERVICE_UNAVAILABLE");
    assert_eq!(error.step_name.as_deref(), Some("resolve"));
    assert_eq!(failed[0].history().len(), 1);
    assert_eq!(failed[0].history()[0].status, StepStatus::Failure);
}

#[tokio::test]
async fn retry_policy_bounds_attempts_with_backoff() {
    let harness = TestHarness::new(transport_failure_script("connection reset")).await;
    harness.register_instances("flaky-service", 1);

    let step = StepConfig::builder("flaky", StepKind::Work)
        .remote_service("flaky-service")
        .retry_policy(RetryPolicy::new(3, 10, 40, 2.0))
        .build()
        .unwrap();
    let definition = PipelineDefinition::new("ingest", vec![step]).unwrap();
    harness.definitions.insert("default", definition);

    let started = Instant::now();
    let response = harness
        .executor
        .execute_pipeline("ingest", document("Hello"), ActionType::Create)
        .await;
    let elapsed = started.elapsed();

    assert_eq!(response.status, ResponseStatus::Error);
    // max_retries = 3 means exactly 4 attempts.
    assert_eq!(harness.worker_call_count(), 4);
    // Delays of 10, 20 and 40ms separate the attempts.
    assert!(elapsed >= Duration::from_millis(70), "elapsed {elapsed:?}");

    let failed = harness.observer.failed();
    assert_eq!(failed[0].error().unwrap().code, "TRANSPORT");
}

#[tokio::test]
async fn worker_reported_failure_is_not_retried() {
    let harness = TestHarness::new(worker_failure_script("unsupported format")).await;
    harness.register_instances("parser-service", 1);

    let step = StepConfig::builder("parse", StepKind::Work)
        .remote_service("parser-service")
        .retry_policy(RetryPolicy::new(5, 5, 20, 2.0))
        .build()
        .unwrap();
    let definition = PipelineDefinition::new("ingest", vec![step]).unwrap();
    harness.definitions.insert("default", definition);

    let response = harness
        .executor
        .execute_pipeline("ingest", document("Hello"), ActionType::Create)
        .await;

    assert_eq!(response.status, ResponseStatus::Error);
    assert_eq!(harness.worker_call_count(), 1);
    assert!(response.message.contains("unsupported format"));

    let failed = harness.observer.failed();
    assert_eq!(failed[0].error().unwrap().code, "WORKER");
}

#[tokio::test]
async fn slow_attempts_time_out_and_feed_the_retry_policy() {
    let factory =
        ScriptedChannelFactory::new(echo_script("late: ")).with_delay(Duration::from_millis(150));
    let harness = TestHarness::with_factory(factory).await;
    harness.register_instances("slow-service", 1);

    let step = StepConfig::builder("slow", StepKind::Work)
        .remote_service("slow-service")
        .step_timeout(Duration::from_millis(30))
        .retry_policy(RetryPolicy::new(1, 5, 10, 2.0))
        .build()
        .unwrap();
    let definition = PipelineDefinition::new("ingest", vec![step]).unwrap();
    harness.definitions.insert("default", definition);

    let response = harness
        .executor
        .execute_pipeline("ingest", document("Hello"), ActionType::Create)
        .await;

    assert_eq!(response.status, ResponseStatus::Error);
    assert!(response.message.contains("timed out"));
    // One original attempt plus one retry, both cut off by the timeout.
    assert_eq!(harness.worker_call_count(), 2);

    let failed = harness.observer.failed();
    assert_eq!(failed[0].error().unwrap().code, "TIMEOUT");
}

#[tokio::test]
async fn terminal_step_stops_the_chain() {
    let harness = TestHarness::new(echo_script("+")).await;
    harness.register_instances("stage-service", 1);

    let terminal = StepConfig::builder("finish", StepKind::Terminal)
        .remote_service("stage-service")
        // A synchronous output past a terminal step is never followed.
        .output(sync_output("overflow", "after"))
        .build()
        .unwrap();
    let stage = StepConfig::builder("stage", StepKind::Work)
        .remote_service("stage-service")
        .output(sync_output("main", "finish"))
        .build()
        .unwrap();
    let definition = PipelineDefinition::new(
        "ingest",
        vec![
            entry_step("start", "stage"),
            stage,
            terminal,
            work_step("after", "stage-service"),
        ],
    )
    .unwrap();
    harness.definitions.insert("default", definition);

    let response = harness
        .executor
        .execute_pipeline("ingest", document("x"), ActionType::Create)
        .await;

    assert_eq!(response.status, ResponseStatus::Accepted);
    // stage and finish ran; after did not.
    assert_eq!(harness.worker_call_count(), 2);

    let completed = harness.observer.completed();
    let names: Vec<&str> = completed[0]
        .history()
        .iter()
        .map(|r| r.step_name.as_str())
        .collect();
    assert_eq!(names, vec!["stage", "finish"]);
    assert_eq!(completed[0].current_document().body, "++x");
}

#[tokio::test]
async fn hops_increase_strictly_by_one() {
    let harness = TestHarness::new(echo_script("+")).await;
    harness.register_instances("stage-service", 1);

    let chain_step = |name: &str, next: Option<&str>| {
        let mut builder =
            StepConfig::builder(name, StepKind::Work).remote_service("stage-service");
        if let Some(next) = next {
            builder = builder.output(sync_output("main", next));
        }
        builder.build().unwrap()
    };

    let definition = PipelineDefinition::new(
        "ingest",
        vec![
            entry_step("start", "a"),
            chain_step("a", Some("b")),
            chain_step("b", Some("c")),
            chain_step("c", None),
        ],
    )
    .unwrap();
    harness.definitions.insert("default", definition);

    let response = harness
        .executor
        .execute_pipeline("ingest", document("x"), ActionType::Create)
        .await;
    assert_eq!(response.status, ResponseStatus::Accepted);

    let completed = harness.observer.completed();
    let hops: Vec<u32> = completed[0].history().iter().map(|r| r.hop).collect();
    assert_eq!(hops, vec![1, 2, 3]);
    assert_eq!(completed[0].history().len() as u32, completed[0].current_hop());
}

#[tokio::test]
async fn missing_entry_step_falls_back_to_first_declared() {
    let harness = TestHarness::new(echo_script("Processed: ")).await;
    harness.register_instances("processor-service", 1);

    // No Entry step anywhere; the first declared step starts the chain.
    let definition =
        PipelineDefinition::new("ingest", vec![work_step("process", "processor-service")])
            .unwrap();
    harness.definitions.insert("default", definition);

    let response = harness
        .executor
        .execute_pipeline("ingest", document("Hello"), ActionType::Create)
        .await;

    assert_eq!(response.status, ResponseStatus::Accepted);
    let completed = harness.observer.completed();
    assert_eq!(completed[0].current_document().body, "Processed: Hello");
    assert_eq!(completed[0].history().len(), 1);
}

#[tokio::test]
async fn fan_out_publishes_to_queue_without_blocking_the_chain() {
    let harness = TestHarness::new(echo_script("Processed: ")).await;
    harness.register_instances("processor-service", 1);
    harness.register_instances("audit-service", 1);

    let parse = StepConfig::builder("process", StepKind::Work)
        .remote_service("processor-service")
        .output(queue_output("audit", "audit-sink", "audit-topic"))
        .build()
        .unwrap();
    let definition = PipelineDefinition::new(
        "ingest",
        vec![
            entry_step("start", "process"),
            parse,
            work_step("audit-sink", "audit-service"),
        ],
    )
    .unwrap();
    harness.definitions.insert("default", definition);

    let response = harness
        .executor
        .execute_pipeline("ingest", document("Hello"), ActionType::Create)
        .await;

    assert_eq!(response.status, ResponseStatus::Accepted);

    // The publish happens on a spawned task; wait for it to land.
    let producer = harness.producer.clone();
    wait_until(|| producer.message_count("audit-topic") == 1).await;

    let messages = harness.producer.messages("audit-topic");
    // The fan-out request carries the post-hop document and targets the sink step.
    assert_eq!(messages[0].payload["document"]["body"], "Processed: Hello");
    assert_eq!(messages[0].payload["metadata"]["step_name"], "audit-sink");
    assert_eq!(messages[0].partition_key.as_deref(), Some("doc-1"));
}

#[tokio::test]
async fn failed_fan_out_never_affects_the_main_result() {
    let harness = TestHarness::new(echo_script("+")).await;
    harness.register_instances("stage-service", 1);
    // "unreachable-service" has no instances; its fan-out dispatch fails.

    let stage = StepConfig::builder("stage", StepKind::Work)
        .remote_service("stage-service")
        .output(sync_output("main", "finish"))
        .output(sync_output("shadow", "shadow-sink"))
        .build()
        .unwrap();
    let definition = PipelineDefinition::new(
        "ingest",
        vec![
            entry_step("start", "stage"),
            stage,
            work_step("finish", "stage-service"),
            work_step("shadow-sink", "unreachable-service"),
        ],
    )
    .unwrap();
    harness.definitions.insert("default", definition);

    let response = harness
        .executor
        .execute_pipeline("ingest", document("x"), ActionType::Create)
        .await;

    assert_eq!(response.status, ResponseStatus::Accepted);
    let completed = harness.observer.completed();
    let names: Vec<&str> = completed[0]
        .history()
        .iter()
        .map(|r| r.step_name.as_str())
        .collect();
    assert_eq!(names, vec!["stage", "finish"]);
}

#[tokio::test]
async fn local_handler_steps_run_without_the_network() {
    use async_trait::async_trait;
    use docflow_core::error::Result;
    use docflow_core::transport::LocalHandler;

    struct Uppercase;

    #[async_trait]
    impl LocalHandler for Uppercase {
        async fn process(&self, request: &WorkerRequest) -> Result<WorkerResponse> {
            let document = Document::new(
                request.document.id.clone(),
                request.document.body.to_uppercase(),
            );
            Ok(WorkerResponse::ok(Some(document)))
        }

        fn name(&self) -> &str {
            "uppercase"
        }
    }

    let harness = TestHarness::new(echo_script("x")).await;
    harness.local_transport.register(Arc::new(Uppercase));

    let step = StepConfig::builder("upper", StepKind::Work)
        .local_handler("uppercase")
        .build()
        .unwrap();
    let definition = PipelineDefinition::new("ingest", vec![step]).unwrap();
    harness.definitions.insert("default", definition);

    let response = harness
        .executor
        .execute_pipeline("ingest", document("hello"), ActionType::Create)
        .await;

    assert_eq!(response.status, ResponseStatus::Accepted);
    assert_eq!(harness.worker_call_count(), 0);
    let completed = harness.observer.completed();
    assert_eq!(completed[0].current_document().body, "HELLO");
}

#[tokio::test]
async fn unregistered_local_handler_is_a_configuration_error() {
    let harness = TestHarness::new(echo_script("x")).await;

    let step = StepConfig::builder("upper", StepKind::Work)
        .local_handler("nonexistent")
        .retry_policy(RetryPolicy::new(3, 5, 20, 2.0))
        .build()
        .unwrap();
    let definition = PipelineDefinition::new("ingest", vec![step]).unwrap();
    harness.definitions.insert("default", definition);

    let response = harness
        .executor
        .execute_pipeline("ingest", document("hello"), ActionType::Create)
        .await;

    assert_eq!(response.status, ResponseStatus::Error);
    // Configuration errors are fatal; the retry policy never applies.
    assert_eq!(harness.worker_call_count(), 0);
    let failed = harness.observer.failed();
    assert_eq!(failed[0].error().unwrap().code, "CONFIGURATION");
}

#[tokio::test]
async fn context_and_step_params_reach_the_worker() {
    let captured: Arc<Mutex<Vec<WorkerRequest>>> = Arc::new(Mutex::new(Vec::new()));
    let captured_in_script = captured.clone();
    let script: WorkerScript = Arc::new(move |request| {
        captured_in_script.lock().push(request.clone());
        Ok(WorkerResponse::ok(None))
    });

    let harness = TestHarness::new(script).await;
    harness.register_instances("processor-service", 1);

    let step = StepConfig::builder("process", StepKind::Work)
        .remote_service("processor-service")
        .param("mode", "strict")
        .structured_params(serde_json::json!({"max_depth": 3}))
        .build()
        .unwrap();
    let definition = PipelineDefinition::new("ingest", vec![step]).unwrap();
    harness.definitions.insert("default", definition);

    let response = harness
        .executor
        .execute_pipeline_with_params(
            "ingest",
            document("Hello"),
            ActionType::Update,
            params(&[("tenant", "acme")]),
        )
        .await;
    assert_eq!(response.status, ResponseStatus::Accepted);

    let requests = captured.lock();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.metadata.pipeline_name, "ingest");
    assert_eq!(request.metadata.step_name, "process");
    assert_eq!(request.metadata.hop, 1);
    assert_eq!(request.metadata.action, ActionType::Update);
    assert_eq!(request.metadata.context_params["tenant"], "acme");
    assert!(request.metadata.history.is_empty());
    assert_eq!(request.step_params["mode"], "strict");
    assert_eq!(request.structured_params.as_ref().unwrap()["max_depth"], 3);
    assert_eq!(request.metadata.stream_id, response.stream_id);
}

#[tokio::test]
async fn concurrent_executions_share_the_engine() {
    let harness = TestHarness::new(echo_script("Processed: ")).await;
    harness.register_instances("processor-service", 1);

    let definition = PipelineDefinition::new(
        "ingest",
        vec![
            entry_step("start", "process"),
            work_step("process", "processor-service"),
        ],
    )
    .unwrap();
    harness.definitions.insert("default", definition);

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let executor = harness.executor.clone();
            tokio::spawn(async move {
                executor
                    .execute_pipeline(
                        "ingest",
                        Document::new(format!("doc-{i}"), "Hello"),
                        ActionType::Create,
                    )
                    .await
            })
        })
        .collect();

    let mut stream_ids = std::collections::HashSet::new();
    for task in tasks {
        let response = task.await.unwrap();
        assert_eq!(response.status, ResponseStatus::Accepted);
        stream_ids.insert(response.stream_id);
    }

    assert_eq!(stream_ids.len(), 16);
    assert_eq!(harness.worker_call_count(), 16);
    assert_eq!(harness.executor.active_stream_count(), 0);
    assert_eq!(harness.observer.completed().len(), 16);
}
