//! End-to-end execution scenarios over mock tools and a scripted model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use smith_core::traits::{LlmClient, LlmError, LlmRequest, LlmResponse};
use smith_core::types::{Dag, DagNode, NodeOutcome, OnFail, RunStatus, Value};
use smith_core::SmithConfig;
use smith_runtime::{
    AutoApprove, CancelToken, Engine, EngineEvent, EventSink, InvokeCtx, Invoker, Orchestrator,
    RateLimiter, ResourceLockManager, SubAgentTool,
};
use smith_tools::{FnTool, Tool, ToolDescriptor, ToolError, ToolRegistry};

/// Builds an orchestrator over the given descriptors/bindings.
fn harness(
    descriptors: Vec<ToolDescriptor>,
    bindings: Vec<(&str, Arc<dyn Tool>)>,
    config: SmithConfig,
) -> (Orchestrator, InvokeCtx) {
    let registry = Arc::new(ToolRegistry::from_descriptors(descriptors).expect("registry"));
    for (function_id, tool) in bindings {
        registry.bind(function_id, tool);
    }
    let limiter = Arc::new(RateLimiter::new(&config, &registry));
    let locks = Arc::new(ResourceLockManager::new(Duration::from_secs(5)));
    let invoker = Arc::new(Invoker::new(
        registry,
        limiter,
        locks,
        Arc::new(AutoApprove),
        config.clone(),
    ));
    let orchestrator = Orchestrator::new(invoker, config, EventSink::none());
    let ctx = InvokeCtx {
        agent_id: "test-root".to_string(),
        cancel: CancelToken::new(),
    };
    (orchestrator, ctx)
}

fn config(workers: usize) -> SmithConfig {
    SmithConfig::default()
        .with_max_concurrent_tools(workers)
        .with_retry_backoff(1, 10)
        .with_require_approval(false)
}

fn const_tool(value: Value) -> Arc<dyn Tool> {
    Arc::new(FnTool::from_sync(move |_| Ok(value.clone())))
}

fn failing_tool(message: &str) -> Arc<dyn Tool> {
    let message = message.to_string();
    Arc::new(FnTool::from_sync(move |_| {
        Err(ToolError::retryable(message.clone()))
    }))
}

fn simple_descriptor(name: &str, function: &str) -> ToolDescriptor {
    ToolDescriptor::new(name, function)
}

fn status_of(report: &smith_core::types::RunReport, id: u64) -> NodeOutcome {
    report
        .trace
        .record_for(id)
        .unwrap_or_else(|| panic!("no record for node {id}"))
        .status
}

// --- Linear success -------------------------------------------------------

#[tokio::test]
async fn linear_chain_succeeds_and_surfaces_final_output() {
    let (orchestrator, ctx) = harness(
        vec![
            simple_descriptor("tool_a", "fa"),
            simple_descriptor("tool_b", "fb"),
        ],
        vec![
            ("fa", const_tool(Value::from("x"))),
            ("fb", const_tool(Value::from("y"))),
        ],
        config(2),
    );
    let dag = Dag {
        nodes: vec![
            DagNode::new(0, "tool_a", "fa").with_timeout(5.0).with_on_fail(OnFail::Halt),
            DagNode::new(1, "tool_b", "fb").with_depends_on(vec![0]).with_timeout(5.0),
        ],
        final_output_node: 1,
    };

    let report = orchestrator.execute(&dag, &ctx).await.expect("execute");
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.trace.len(), 2);
    assert_eq!(status_of(&report, 0), NodeOutcome::Success);
    assert_eq!(status_of(&report, 1), NodeOutcome::Success);
    assert_eq!(report.final_output, Some(Value::from("y")));
    assert_eq!(report.stats.executed, 2);
    assert_eq!(report.stats.failed, 0);
}

// --- Fan-out / fan-in -----------------------------------------------------

#[tokio::test]
async fn fan_out_runs_sources_in_parallel() {
    let sleepy = |output: &str| -> Arc<dyn Tool> {
        let output = output.to_string();
        Arc::new(FnTool::new(move |_| {
            let output = output.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                Ok(Value::from(output))
            })
        }))
    };
    let gathered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&gathered);
    let join_tool: Arc<dyn Tool> = Arc::new(FnTool::from_sync(move |args| {
        sink.lock().push(args);
        Ok(Value::from("joined"))
    }));

    let (orchestrator, ctx) = harness(
        vec![
            simple_descriptor("src_a", "fa"),
            simple_descriptor("src_b", "fb"),
            simple_descriptor("src_c", "fc"),
            simple_descriptor("join", "fj").with_param("summary", "string", false),
        ],
        vec![
            ("fa", sleepy("a")),
            ("fb", sleepy("b")),
            ("fc", sleepy("c")),
            ("fj", join_tool),
        ],
        config(3),
    );
    let dag = Dag {
        nodes: vec![
            DagNode::new(0, "src_a", "fa").with_timeout(5.0),
            DagNode::new(1, "src_b", "fb").with_timeout(5.0),
            DagNode::new(2, "src_c", "fc").with_timeout(5.0),
            DagNode::new(3, "join", "fj")
                .with_depends_on(vec![0, 1, 2])
                .with_timeout(5.0),
        ],
        final_output_node: 3,
    };

    let start = Instant::now();
    let report = orchestrator.execute(&dag, &ctx).await.expect("execute");
    let elapsed = start.elapsed();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.trace.len(), 4);
    for id in 0..4 {
        assert_eq!(status_of(&report, id), NodeOutcome::Success);
    }
    // Three 150ms sources with three workers must beat the sequential sum.
    assert!(
        elapsed < Duration::from_millis(400),
        "fan-out took {elapsed:?}"
    );
}

// --- Halt on failure ------------------------------------------------------

#[tokio::test]
async fn halt_policy_skips_downstream_nodes() {
    let (orchestrator, ctx) = harness(
        vec![
            simple_descriptor("ok", "f_ok"),
            simple_descriptor("bad", "f_bad"),
            simple_descriptor("never", "f_never"),
        ],
        vec![
            ("f_ok", const_tool(Value::from("fine"))),
            ("f_bad", failing_tool("exploded")),
            ("f_never", const_tool(Value::from("unreachable"))),
        ],
        config(2),
    );
    let dag = Dag {
        nodes: vec![
            DagNode::new(0, "ok", "f_ok").with_timeout(5.0),
            DagNode::new(1, "bad", "f_bad")
                .with_depends_on(vec![0])
                .with_retry(0)
                .with_timeout(5.0)
                .with_on_fail(OnFail::Halt),
            DagNode::new(2, "never", "f_never")
                .with_depends_on(vec![1])
                .with_timeout(5.0),
        ],
        final_output_node: 2,
    };

    let report = orchestrator.execute(&dag, &ctx).await.expect("execute");
    assert_eq!(report.status, RunStatus::Halted);
    assert_eq!(status_of(&report, 0), NodeOutcome::Success);
    assert_eq!(status_of(&report, 1), NodeOutcome::Error);
    assert_eq!(status_of(&report, 2), NodeOutcome::Skipped);
    // Trace totality: every node left pending has exactly one record.
    assert_eq!(report.trace.len(), 3);
    assert!(report.final_output.is_none());
}

// --- Continue on failure --------------------------------------------------

#[tokio::test]
async fn continue_policy_substitutes_null_downstream() {
    let seen_prompt = Arc::new(Mutex::new(String::new()));
    let capture = Arc::clone(&seen_prompt);
    let collect_tool: Arc<dyn Tool> = Arc::new(FnTool::from_sync(move |args| {
        let prompt = args
            .get("prompt")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        *capture.lock() = prompt;
        Ok(Value::from("summary"))
    }));

    let (orchestrator, ctx) = harness(
        vec![
            simple_descriptor("ok", "f_ok"),
            simple_descriptor("bad", "f_bad"),
            simple_descriptor("collect", "f_collect").with_param("prompt", "string", true),
        ],
        vec![
            ("f_ok", const_tool(Value::from("alpha"))),
            ("f_bad", failing_tool("exploded")),
            ("f_collect", collect_tool),
        ],
        config(2),
    );
    let dag = Dag {
        nodes: vec![
            DagNode::new(0, "ok", "f_ok").with_timeout(5.0),
            DagNode::new(1, "bad", "f_bad")
                .with_depends_on(vec![0])
                .with_retry(0)
                .with_timeout(5.0)
                .with_on_fail(OnFail::Continue),
            DagNode::new(2, "collect", "f_collect")
                .with_input("prompt", "a={{steps.0}} b={{steps.1}}")
                .with_depends_on(vec![0, 1])
                .with_timeout(5.0),
        ],
        final_output_node: 2,
    };

    let report = orchestrator.execute(&dag, &ctx).await.expect("execute");
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(status_of(&report, 0), NodeOutcome::Success);
    assert_eq!(status_of(&report, 1), NodeOutcome::Error);
    assert_eq!(status_of(&report, 2), NodeOutcome::Success);
    // The failed dependency's slot resolved to null (empty in text).
    assert_eq!(seen_prompt.lock().as_str(), "a=alpha b=");
}

// --- Timeout --------------------------------------------------------------

#[tokio::test]
async fn deadline_expiry_records_timeout_without_retry() {
    let sleeper: Arc<dyn Tool> = Arc::new(FnTool::new(|_| {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::from("too late"))
        })
    }));
    let (orchestrator, ctx) = harness(
        vec![simple_descriptor("slow", "f_slow")],
        vec![("f_slow", sleeper)],
        config(1),
    );
    let dag = Dag {
        nodes: vec![DagNode::new(0, "slow", "f_slow")
            .with_retry(3)
            .with_timeout(0.3)],
        final_output_node: 0,
    };

    let start = Instant::now();
    let report = orchestrator.execute(&dag, &ctx).await.expect("execute");
    let record = report.trace.record_for(0).expect("record");
    assert_eq!(record.status, NodeOutcome::Timeout);
    assert_eq!(record.attempts, 1);
    assert!(start.elapsed() < Duration::from_secs(2));
}

// --- Cycle rejected before execution -------------------------------------

#[tokio::test]
async fn cyclic_plan_is_rejected_without_executing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let counting: Arc<dyn Tool> = Arc::new(FnTool::from_sync(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Null)
    }));

    let registry = Arc::new(
        ToolRegistry::from_descriptors(vec![simple_descriptor("echo", "f_echo")])
            .expect("registry"),
    );
    registry.bind("f_echo", counting);
    let engine = Engine::new(registry, config(2));

    let dag = Dag {
        nodes: vec![
            DagNode::new(0, "echo", "f_echo").with_depends_on(vec![1]),
            DagNode::new(1, "echo", "f_echo").with_depends_on(vec![0]),
        ],
        final_output_node: 1,
    };

    let err = engine.execute(&dag).await.unwrap_err();
    assert!(err.to_string().contains("cycle"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// --- Rate limit floor -----------------------------------------------------

#[tokio::test]
async fn rate_limited_tool_calls_are_spaced() {
    let stamps: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&stamps);
    let stamped: Arc<dyn Tool> = Arc::new(FnTool::from_sync(move |_| {
        recorder.lock().push(Instant::now());
        Ok(Value::from("ok"))
    }));

    let (orchestrator, ctx) = harness(
        vec![simple_descriptor("gated", "f_gated").with_rate_interval(0.3)],
        vec![("f_gated", stamped)],
        config(2),
    );
    let dag = Dag {
        nodes: vec![
            DagNode::new(0, "gated", "f_gated").with_timeout(5.0),
            DagNode::new(1, "gated", "f_gated").with_timeout(5.0),
        ],
        final_output_node: 1,
    };

    let report = orchestrator.execute(&dag, &ctx).await.expect("execute");
    assert_eq!(report.status, RunStatus::Completed);

    let stamps = stamps.lock();
    assert_eq!(stamps.len(), 2);
    // The stamps trail the grant instants by scheduling noise; leave slack
    // under the 300ms floor.
    let gap = stamps[1].duration_since(stamps[0]);
    assert!(gap >= Duration::from_millis(250), "gap was {gap:?}");
}

// --- Resource safety ------------------------------------------------------

#[tokio::test]
async fn overlapping_resources_never_run_concurrently() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (active_c, peak_c) = (Arc::clone(&active), Arc::clone(&peak));
    let locked_tool: Arc<dyn Tool> = Arc::new(FnTool::new(move |_| {
        let active = Arc::clone(&active_c);
        let peak = Arc::clone(&peak_c);
        Box::pin(async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(Value::from("done"))
        })
    }));

    let descriptor = |name: &str, function: &str| {
        simple_descriptor(name, function).with_resources(vec!["db".to_string()])
    };
    let (orchestrator, _) = harness(
        vec![descriptor("writer_a", "f_a"), descriptor("writer_b", "f_b")],
        vec![("f_a", Arc::clone(&locked_tool)), ("f_b", locked_tool)],
        config(2),
    );
    let dag = Dag {
        nodes: vec![
            DagNode::new(0, "writer_a", "f_a").with_timeout(5.0),
            DagNode::new(1, "writer_b", "f_b").with_timeout(5.0),
        ],
        final_output_node: 1,
    };

    let ctx = InvokeCtx {
        agent_id: "agent-one".to_string(),
        cancel: CancelToken::new(),
    };
    let report = orchestrator.execute(&dag, &ctx).await.expect("execute");
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(peak.load(Ordering::SeqCst), 1, "resource overlap detected");
}

// --- Blocked detection ----------------------------------------------------

#[tokio::test]
async fn unmeetable_dependency_reports_blocked() {
    let (orchestrator, ctx) = harness(
        vec![simple_descriptor("ok", "f_ok")],
        vec![("f_ok", const_tool(Value::from("fine")))],
        config(2),
    );
    // Node 1 waits on an id that never resolves. The validation gate would
    // reject this plan; the scheduler still refuses to spin.
    let dag = Dag {
        nodes: vec![
            DagNode::new(0, "ok", "f_ok").with_timeout(5.0),
            DagNode::new(1, "ok", "f_ok")
                .with_depends_on(vec![99])
                .with_timeout(5.0),
        ],
        final_output_node: 1,
    };

    let report = orchestrator.execute(&dag, &ctx).await.expect("execute");
    assert_eq!(report.status, RunStatus::Blocked);
    assert_eq!(report.trace.len(), 1);
    assert_eq!(status_of(&report, 0), NodeOutcome::Success);
}

// --- Determinism across worker counts ------------------------------------

#[tokio::test]
async fn terminal_state_is_identical_across_worker_counts() {
    let build = |workers: usize| {
        harness(
            vec![
                simple_descriptor("ok", "f_ok"),
                simple_descriptor("bad", "f_bad"),
                simple_descriptor("join", "f_join"),
            ],
            vec![
                ("f_ok", const_tool(Value::from("v"))),
                ("f_bad", failing_tool("always")),
                ("f_join", const_tool(Value::from("end"))),
            ],
            config(workers),
        )
    };
    let dag = Dag {
        nodes: vec![
            DagNode::new(0, "ok", "f_ok").with_timeout(5.0),
            DagNode::new(1, "bad", "f_bad")
                .with_retry(0)
                .with_timeout(5.0)
                .with_on_fail(OnFail::Continue),
            DagNode::new(2, "ok", "f_ok").with_timeout(5.0),
            DagNode::new(3, "join", "f_join")
                .with_depends_on(vec![0, 1, 2])
                .with_timeout(5.0),
        ],
        final_output_node: 3,
    };

    let mut snapshots = Vec::new();
    for workers in [1, 4] {
        let (orchestrator, ctx) = build(workers);
        let report = orchestrator.execute(&dag, &ctx).await.expect("execute");
        let mut statuses: Vec<(u64, NodeOutcome)> = report
            .trace
            .records()
            .iter()
            .map(|r| (r.node_id, r.status))
            .collect();
        statuses.sort_by_key(|(id, _)| *id);
        snapshots.push((report.status, statuses, report.final_output.clone()));
    }
    assert_eq!(snapshots[0], snapshots[1]);

    // Sequential mode commits in id order for simultaneously eligible nodes.
    let (orchestrator, ctx) = build(1);
    let report = orchestrator.execute(&dag, &ctx).await.expect("execute");
    let commit_order: Vec<u64> = report.trace.records().iter().map(|r| r.node_id).collect();
    assert_eq!(commit_order, vec![0, 1, 2, 3]);
}

// --- Scripted model for engine-level scenarios ----------------------------

/// Routes on prompt shape: planning prompts get a plan, synthesis prompts
/// get a fixed answer.
struct RoutedClient {
    plan: String,
}

#[async_trait]
impl LlmClient for RoutedClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let text = if request.prompt.contains("Execution Trace") {
            "Final synthesized answer.".to_string()
        } else {
            self.plan.clone()
        };
        Ok(LlmResponse::new(text, "routed"))
    }

    fn model_name(&self) -> &str {
        "routed"
    }
}

#[tokio::test]
async fn engine_runs_utterance_end_to_end_with_events() {
    let registry = Arc::new(
        ToolRegistry::from_descriptors(vec![
            simple_descriptor("echo", "run_echo").with_param("message", "string", true)
        ])
        .expect("registry"),
    );
    registry.bind(
        "run_echo",
        Arc::new(FnTool::from_sync(|args| {
            let msg = args.get("message").and_then(Value::as_str).unwrap_or("");
            Ok(Value::from(format!("Echo: {msg}")))
        })),
    );

    let plan = r#"{"status":"success","nodes":[{"id":0,"tool":"echo","function":"run_echo","inputs":{"message":"hi"},"retry":0,"timeout":5}],"final_output_node":0}"#;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = Engine::new(registry, config(2))
        .with_llm(Arc::new(RoutedClient {
            plan: plan.to_string(),
        }))
        .with_events(EventSink::new(tx));

    let outcome = engine.run("please say hi").await.expect("run");
    assert_eq!(outcome.report.status, RunStatus::Completed);
    assert_eq!(
        outcome.final_answer.as_deref(),
        Some("Final synthesized answer.")
    );

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(match event {
            EngineEvent::Planning => "planning",
            EngineEvent::PlanComplete { .. } => "plan_complete",
            EngineEvent::ToolStart { .. } => "tool_start",
            EngineEvent::ToolComplete { .. } => "tool_complete",
            EngineEvent::FinalAnswer { .. } => "final_answer",
            EngineEvent::Error { .. } => "error",
        });
    }
    assert_eq!(
        kinds,
        vec![
            "planning",
            "plan_complete",
            "tool_start",
            "tool_complete",
            "final_answer"
        ]
    );
}

// --- Sub-agent depth bound ------------------------------------------------

#[tokio::test]
async fn sub_agent_spawn_is_refused_at_depth_bound() {
    let registry = Arc::new(
        ToolRegistry::from_descriptors(vec![
            simple_descriptor("echo", "run_echo").with_param("message", "string", true),
            SubAgentTool::descriptor(),
        ])
        .expect("registry"),
    );
    registry.bind(
        "run_echo",
        Arc::new(FnTool::from_sync(|_| Ok(Value::from("Echo")))),
    );

    let plan = r#"{"status":"success","nodes":[{"id":0,"tool":"echo","function":"run_echo","inputs":{"message":"leaf"},"retry":0,"timeout":5}],"final_output_node":0}"#;
    let engine = Engine::new(Arc::clone(&registry), config(2)).with_llm(Arc::new(RoutedClient {
        plan: plan.to_string(),
    }));
    let tool = SubAgentTool::new(&engine);

    // Build a parent chain at depths 0, 1, 2 (bound is 3).
    let agents = engine.agents();
    let root = agents.create("root", None);
    let d1 = agents.create("d1", Some(&root));
    let d2 = agents.create("d2", Some(&d1));

    // Spawning under the depth-2 parent would create depth 3: refused.
    let mut args = HashMap::new();
    args.insert("task".to_string(), Value::from("go deeper"));
    args.insert("parent_agent_id".to_string(), Value::from(d2.clone()));
    let err = tool.call(args).await.unwrap_err();
    assert!(err.message.contains("depth 3 exceeds maximum 3"));

    // Under the depth-1 parent (child depth 2) the spawn proceeds.
    let mut args = HashMap::new();
    args.insert("task".to_string(), Value::from("shallow task"));
    args.insert("parent_agent_id".to_string(), Value::from(d1.clone()));
    let output = tool.call(args).await.expect("shallow spawn");
    assert_eq!(output.as_str(), Some("Final synthesized answer."));

    // The agent tree recorded the child under its parent.
    let children = agents.children(&d1);
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].depth, 2);
}

// --- Halt cancels queued work promptly ------------------------------------

#[tokio::test]
async fn halt_prevents_unstarted_ready_nodes_from_running() {
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    let counting: Arc<dyn Tool> = Arc::new(FnTool::new(move |_| {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(Value::from("ok"))
        })
    }));

    let (orchestrator, ctx) = harness(
        vec![
            simple_descriptor("bad", "f_bad"),
            simple_descriptor("work", "f_work"),
        ],
        vec![("f_bad", failing_tool("boom")), ("f_work", counting)],
        config(1),
    );
    // Sequential mode: node 0 fails with halt while 1 and 2 are queued.
    let dag = Dag {
        nodes: vec![
            DagNode::new(0, "bad", "f_bad")
                .with_retry(0)
                .with_timeout(5.0)
                .with_on_fail(OnFail::Halt),
            DagNode::new(1, "work", "f_work").with_timeout(5.0),
            DagNode::new(2, "work", "f_work").with_timeout(5.0),
        ],
        final_output_node: 2,
    };

    let report = orchestrator.execute(&dag, &ctx).await.expect("execute");
    assert_eq!(report.status, RunStatus::Halted);
    assert_eq!(ran.load(Ordering::SeqCst), 0, "queued nodes must not start");
    assert_eq!(status_of(&report, 1), NodeOutcome::Skipped);
    assert_eq!(status_of(&report, 2), NodeOutcome::Skipped);
}
