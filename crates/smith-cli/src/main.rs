use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use smith_core::types::{Dag, RunReport, RunStatus};
use smith_core::SmithConfig;
use smith_planner::validate_dag;
use smith_runtime::{AutoApprove, Engine, EngineEvent, EventSink};
use smith_tools::builtin::{EchoTool, SleepTool};
use smith_tools::ToolRegistry;

const EXIT_OK: u8 = 0;
const EXIT_PLANNER_ERROR: u8 = 2;
const EXIT_HALTED: u8 = 3;
const EXIT_BLOCKED: u8 = 4;

/// Initialize the tracing subscriber based on the --trace flag.
/// If no trace level is provided, no subscriber is registered.
fn initialize_tracing(level: &Option<String>) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match level {
        Some(lvl) => EnvFilter::try_new(format!("smith={lvl}"))
            .unwrap_or_else(|_| EnvFilter::new("smith=info")),
        None => return,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[derive(Parser)]
#[command(name = "smith")]
#[command(about = "Smith - deterministic execution runtime for tool workflows", long_about = None)]
struct Cli {
    /// Enable runtime tracing (levels: trace, debug, info, warn, error)
    #[arg(long, global = true)]
    trace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a plan file against a registry without executing anything
    Validate {
        /// Tool registry file (a JSON map keyed by tool name)
        #[arg(long)]
        registry: PathBuf,
        /// Plan file (nodes + final_output_node)
        #[arg(long)]
        plan: PathBuf,
    },
    /// Execute a plan file with the built-in demo tools
    Run {
        /// Tool registry file (a JSON map keyed by tool name)
        #[arg(long)]
        registry: PathBuf,
        /// Plan file (nodes + final_output_node)
        #[arg(long)]
        plan: PathBuf,
        /// Force sequential execution (one node at a time)
        #[arg(long)]
        sequential: bool,
        /// Worker-pool bound (defaults to the number of CPUs)
        #[arg(long)]
        workers: Option<usize>,
        /// Approve dangerous tools without prompting
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    initialize_tracing(&cli.trace);

    let result = match cli.command {
        Commands::Validate { registry, plan } => command_validate(&registry, &plan),
        Commands::Run {
            registry,
            plan,
            sequential,
            workers,
            yes,
        } => command_run(&registry, &plan, sequential, workers, yes).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_PLANNER_ERROR)
        }
    }
}

fn load_registry(path: &PathBuf) -> Result<Arc<ToolRegistry>> {
    let registry = ToolRegistry::from_file(path)
        .with_context(|| format!("loading registry {}", path.display()))?;
    Ok(Arc::new(registry))
}

fn load_plan(path: &PathBuf) -> Result<Dag> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading plan {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing plan {}", path.display()))
}

fn command_validate(registry_path: &PathBuf, plan_path: &PathBuf) -> Result<u8> {
    let registry = load_registry(registry_path)?;
    let dag = load_plan(plan_path)?;

    match validate_dag(&dag, &registry, false) {
        Ok(()) => {
            println!(
                "plan ok: {} node(s), final output node {}",
                dag.len(),
                dag.final_output_node
            );
            Ok(EXIT_OK)
        }
        Err(reason) => {
            eprintln!("plan invalid: {reason}");
            Ok(EXIT_PLANNER_ERROR)
        }
    }
}

/// Attach the built-in demo callables for the function ids they implement.
fn bind_builtins(registry: &ToolRegistry) {
    for descriptor in registry.list_all() {
        match descriptor.function.as_str() {
            "run_echo" => registry.bind("run_echo", Arc::new(EchoTool)),
            "run_sleep" => registry.bind("run_sleep", Arc::new(SleepTool)),
            _ => {}
        }
    }
}

async fn command_run(
    registry_path: &PathBuf,
    plan_path: &PathBuf,
    sequential: bool,
    workers: Option<usize>,
    yes: bool,
) -> Result<u8> {
    let registry = load_registry(registry_path)?;
    let dag = load_plan(plan_path)?;

    bind_builtins(&registry);
    registry
        .verify_bindings()
        .context("registry declares a function with no built-in implementation")?;

    let mut config = SmithConfig::default();
    if let Some(workers) = workers {
        config.max_concurrent_tools = workers;
    }
    if sequential {
        config.max_concurrent_tools = 1;
    }
    if yes {
        config.require_approval = false;
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let mut engine = Engine::new(registry, config).with_events(EventSink::new(tx));
    if yes {
        engine = engine.with_approval(Arc::new(AutoApprove));
    }

    let outcome = engine.execute(&dag).await;
    // Dropping the engine closes the event channel so the printer drains.
    drop(engine);
    let _ = printer.await;

    match outcome {
        Ok(report) => {
            print_report(&report);
            Ok(match report.status {
                RunStatus::Completed => EXIT_OK,
                RunStatus::Halted => EXIT_HALTED,
                RunStatus::Blocked => EXIT_BLOCKED,
            })
        }
        Err(err) => {
            eprintln!("error: {err}");
            Ok(EXIT_PLANNER_ERROR)
        }
    }
}

fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::Planning => println!("planning..."),
        EngineEvent::PlanComplete { num_nodes, tools } => {
            println!("plan ready: {num_nodes} node(s) using [{}]", tools.join(", "));
        }
        EngineEvent::ToolStart { node_id, tool } => {
            println!("node {node_id}: running {tool}...");
        }
        EngineEvent::ToolComplete {
            node_id,
            status,
            duration_ms,
        } => {
            println!("node {node_id}: {status:?} in {duration_ms}ms");
        }
        EngineEvent::FinalAnswer { response } => println!("\n{response}"),
        EngineEvent::Error { message, details } => {
            eprintln!("error: {message}");
            if let Some(details) = details {
                eprintln!("  {details}");
            }
        }
    }
}

fn print_report(report: &RunReport) {
    println!("\nrun {} finished: {:?}", report.run_id, report.status);
    println!(
        "  {} succeeded, {} failed, {} skipped in {}ms",
        report.stats.executed, report.stats.failed, report.stats.skipped, report.stats.duration_ms
    );
    for record in report.trace.records() {
        let detail = match &record.error {
            Some(error) => format!(" ({error})"),
            None => String::new(),
        };
        println!(
            "  node {} [{}] {:?} x{}{}",
            record.node_id, record.tool, record.status, record.attempts, detail
        );
    }
    if let Some(output) = &report.final_output {
        println!("final output: {output}");
    }
}
