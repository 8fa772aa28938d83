// crates/kernel-cli/src/main.rs
// ============================================================================
// Module: Orchestration Kernel CLI Entry Point
// Description: Thin command dispatcher over the kernel-engine orchestrator.
// Purpose: Give operators a driver for starting, resuming, and inspecting
//          runs without writing a host program against the library crates.
// Dependencies: clap, kernel-config, kernel-core, kernel-engine,
//               kernel-forensics, kernel-routing, kernel-storage,
//               kernel-transport, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The library interface (`kernel-engine::Orchestrator`) is primary; this CLI
//! is an optional driver wiring the file-backed [`kernel_storage::FileStore`],
//! an [`kernel_transport::HttpTransport`] backend, and a [`kernel_forensics::DiffScanner`]
//! together behind four commands: `start`, `resume`, `status`, `rebuild`.
//! Exit code 0 means the run completed; 1 means it stopped blocked or
//! escalated; 2 means a fatal error prevented the run from proceeding at all.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;
use kernel_config::KernelConfig;
use kernel_core::core::BackendId;
use kernel_core::core::FlowEdge;
use kernel_core::core::FlowGraph;
use kernel_core::core::FlowId;
use kernel_core::core::FlowNode;
use kernel_core::core::RunConfig;
use kernel_core::core::RunId;
use kernel_core::core::RunStatus;
use kernel_core::core::StepCost;
use kernel_core::core::StepId;
use kernel_core::interfaces::Storage;
use kernel_engine::EngineConfig;
use kernel_engine::EngineMetrics;
use kernel_engine::NullVcsAdapter;
use kernel_engine::Orchestrator;
use kernel_engine::PriceTable;
use kernel_forensics::DiffScanner;
use kernel_routing::FileRoutingLog;
use kernel_routing::RoutingMetrics;
use kernel_routing::RoutingMode;
use kernel_routing::SidequestCatalog;
use kernel_storage::FileStore;
use kernel_storage::FileStoreConfig;
use kernel_transport::CapabilityProfile;
use kernel_transport::HttpBackendConfig;
use kernel_transport::HttpTransport;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Definition
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "kernel", disable_help_subcommand = true)]
struct Cli {
    /// Installation directory holding `kernel.toml`, `prices.toml`, and the
    /// `runs/` store root.
    #[arg(long, default_value = ".")]
    install_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Starts a new run against a flow definition file.
    Start {
        /// Path to a JSON flow graph definition.
        flow: PathBuf,
        /// Run identifier to assign; generated from the flow file name if omitted.
        #[arg(long)]
        run_id: Option<String>,
        /// Model tier to price step attempts against.
        #[arg(long, default_value = "standard")]
        model_tier: String,
    },
    /// Resumes an existing run against the same flow definition.
    Resume {
        /// Run identifier to resume.
        run_id: String,
        /// Path to the JSON flow graph definition the run was started with.
        flow: PathBuf,
        /// Model tier to price step attempts against.
        #[arg(long, default_value = "standard")]
        model_tier: String,
    },
    /// Prints the current state of a run.
    Status {
        /// Run identifier to inspect.
        run_id: String,
    },
    /// Replays a run's event log into a fresh state snapshot.
    Rebuild {
        /// Run identifier to rebuild.
        run_id: String,
    },
}

// ============================================================================
// SECTION: Flow Definition Loading
// ============================================================================

/// On-disk shape of one sidequest catalog entry; [`kernel_routing::SidequestEntry`]
/// carries no `serde` impls of its own since the catalog is normally built by
/// a host program, not read from untrusted JSON.
#[derive(Debug, Deserialize)]
struct SidequestSpec {
    sidequest_id: String,
    target_step: StepId,
    resume_step: StepId,
    #[serde(default)]
    trigger_signatures: Vec<String>,
    #[serde(default)]
    priority: i32,
}

impl From<SidequestSpec> for kernel_routing::SidequestEntry {
    fn from(spec: SidequestSpec) -> Self {
        Self {
            sidequest_id: kernel_core::core::SidequestId::new(spec.sidequest_id),
            target_step: spec.target_step,
            resume_step: spec.resume_step,
            trigger_signatures: spec.trigger_signatures,
            priority: spec.priority,
        }
    }
}

/// On-disk shape of one flow edge; `guard`, when present, is the author's
/// DSL text (e.g. `"tests_passed and not high_churn_low_progress"`) rather
/// than a hand-nested [`kernel_core::core::Requirement`] tree, since authors
/// write flow files by hand far more often than tooling generates them.
#[derive(Debug, Deserialize)]
struct FlowEdgeSpec {
    from: StepId,
    to: StepId,
    #[serde(default)]
    guard: Option<String>,
}

impl FlowEdgeSpec {
    fn into_edge(self) -> Result<FlowEdge, CliError> {
        match self.guard {
            None => Ok(FlowEdge { from: self.from, to: self.to, guard: None }),
            Some(guard) => FlowEdge::with_guard_dsl(self.from.clone(), self.to.clone(), &guard)
                .map_err(|err| CliError::InvalidGuard(self.from.to_string(), self.to.to_string(), err.to_string())),
        }
    }
}

/// On-disk shape of a flow graph definition; validated into a [`FlowGraph`]
/// on load rather than deserialized directly, so malformed graphs are
/// rejected before a run ever starts.
#[derive(Debug, Deserialize)]
struct FlowGraphSpec {
    flow_id: String,
    entry: StepId,
    nodes: Vec<FlowNode>,
    #[serde(default)]
    edges: Vec<FlowEdgeSpec>,
    #[serde(default)]
    sidequests: Vec<SidequestSpec>,
}

fn load_flow(path: &Path) -> Result<(FlowId, FlowGraph, SidequestCatalog), CliError> {
    let raw = fs::read_to_string(path).map_err(|err| CliError::Io(path.display().to_string(), err.to_string()))?;
    let spec: FlowGraphSpec = serde_json::from_str(&raw).map_err(|err| CliError::Parse(path.display().to_string(), err.to_string()))?;
    let edges = spec.edges.into_iter().map(FlowEdgeSpec::into_edge).collect::<Result<Vec<_>, _>>()?;
    let flow = FlowGraph::new(spec.entry, spec.nodes, edges).map_err(|err| CliError::InvalidFlow(err.to_string()))?;
    let sidequests = spec.sidequests.into_iter().map(kernel_routing::SidequestEntry::from).collect();
    Ok((FlowId::new(spec.flow_id), flow, SidequestCatalog::new(sidequests)))
}

// ============================================================================
// SECTION: Wiring
// ============================================================================

fn load_config(install_root: &Path) -> Result<KernelConfig, CliError> {
    let config_path = install_root.join("kernel.toml");
    let mut config = if config_path.exists() {
        kernel_config::load(Some(&config_path)).map_err(|err| CliError::Config(err.to_string()))?
    } else {
        kernel_config::load(None).map_err(|err| CliError::Config(err.to_string()))?
    };
    config.install_root = install_root.to_path_buf();
    config.validate().map_err(|err| CliError::Config(err.to_string()))?;
    Ok(config)
}

fn transport_for(config: &KernelConfig) -> HttpTransport {
    let endpoint = config.install_root.join("backend-endpoint.txt");
    let endpoint_url = fs::read_to_string(endpoint).unwrap_or_else(|_| "http://127.0.0.1:8099".to_string());
    HttpTransport::new().with_backend(
        &BackendId::new("http"),
        HttpBackendConfig::new(endpoint_url.trim().to_string()),
        CapabilityProfile::default(),
    )
}

/// Maps a run's terminal (or not-yet-terminal) status to the process exit
/// code the operator sees: 0 for a clean completion, 1 for a run that
/// stopped blocked awaiting escalation, 2 for anything else.
fn exit_code_value_for(status: &RunStatus) -> u8 {
    match status {
        RunStatus::Completed => 0,
        RunStatus::Blocked(_) => 1,
        RunStatus::Running | RunStatus::Pending | RunStatus::Failed(_) | RunStatus::Aborted(_) => 2,
    }
}

fn exit_code_for(status: &RunStatus) -> ExitCode {
    ExitCode::from(exit_code_value_for(status))
}

#[allow(clippy::too_many_lines, reason = "wires every port the orchestrator needs in one place; splitting would scatter the wiring across files for no clarity gain")]
fn drive(install_root: &Path, run_id: RunId, flow_id: FlowId, flow: FlowGraph, catalog: SidequestCatalog, model_tier: &str) -> Result<RunStatus, CliError> {
    let config = load_config(install_root)?;

    let store = FileStore::open(FileStoreConfig { root: install_root.join("runs"), fsync: true }).map_err(|err| CliError::Storage(err.to_string()))?;
    let transport = transport_for(&config);
    let price_table_path = config.resolve(&config.price_table_path);
    let price_table = if price_table_path.exists() {
        PriceTable::load(&price_table_path).map_err(|err| CliError::Pricing(err.to_string()))?
    } else {
        PriceTable::default()
    };
    let scanner = DiffScanner::new(Vec::new());
    let vcs = NullVcsAdapter;
    let routing_log = FileRoutingLog::open(install_root.join("runs").join(run_id.as_str()).join("routing")).map_err(|err| CliError::Storage(err.to_string()))?;
    let metrics = EngineMetrics::new();
    let routing_metrics = RoutingMetrics::new();

    let run_config = RunConfig {
        hard_budget_cap: StepCost { usd: config.hard_budget_cap_usd, input_tokens: 0, output_tokens: 0 },
        max_microloop_iterations: config.default_microloop_max_iterations,
        stall_window: config.default_stall_window as usize,
        allow_extend_graph: false,
    };

    let orchestrator = Orchestrator::new(
        flow,
        EngineConfig::default(),
        &transport,
        &scanner,
        &store,
        &vcs,
        &routing_log,
        catalog,
        None,
        RoutingMode::DeterministicOnly,
        &metrics,
        &routing_metrics,
        price_table,
        model_tier,
    );

    let ledger_path = install_root.join("runs").join(run_id.as_str()).join("cost.jsonl");
    let summary = orchestrator.run_flow(run_id, flow_id, run_config, ledger_path).map_err(|err| CliError::Engine(err.to_string()))?;
    Ok(summary.status)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors the CLI dispatcher can surface to the operator.
#[derive(Debug, Error)]
enum CliError {
    /// A flow definition file could not be read.
    #[error("could not read {0}: {1}")]
    Io(String, String),
    /// A flow definition file was not valid JSON.
    #[error("could not parse {0}: {1}")]
    Parse(String, String),
    /// A flow definition failed structural validation.
    #[error("invalid flow graph: {0}")]
    InvalidFlow(String),
    /// An edge's guard expression failed to parse.
    #[error("invalid guard on edge {0} -> {1}: {2}")]
    InvalidGuard(String, String, String),
    /// Installation configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),
    /// The run store could not be opened or read.
    #[error("storage error: {0}")]
    Storage(String),
    /// The price table could not be loaded.
    #[error("pricing error: {0}")]
    Pricing(String),
    /// The orchestrator failed to drive the run.
    #[error("engine error: {0}")]
    Engine(String),
    /// No run with the given identifier exists.
    #[error("unknown run: {0}")]
    UnknownRun(String),
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            let _ = write_stderr_line(&err.to_string());
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode, CliError> {
    match &cli.command {
        Commands::Start { flow, run_id, model_tier } => {
            let (flow_id, graph, catalog) = load_flow(flow)?;
            let run_id = run_id.clone().map_or_else(
                || RunId::new(format!("{flow_id}-{}", flow.file_stem().and_then(|name| name.to_str()).unwrap_or("run"))),
                RunId::new,
            );
            write_stdout_line(&run_id.to_string()).map_err(|err| CliError::Io("stdout".to_string(), err.to_string()))?;
            let status = drive(&cli.install_root, run_id, flow_id, graph, catalog, model_tier)?;
            Ok(exit_code_for(&status))
        }
        Commands::Resume { run_id, flow, model_tier } => {
            let (flow_id, graph, catalog) = load_flow(flow)?;
            let status = drive(&cli.install_root, RunId::new(run_id.clone()), flow_id, graph, catalog, model_tier)?;
            Ok(exit_code_for(&status))
        }
        Commands::Status { run_id } => {
            let store = FileStore::open(FileStoreConfig { root: cli.install_root.join("runs"), fsync: true }).map_err(|err| CliError::Storage(err.to_string()))?;
            let state = store.load(&RunId::new(run_id.clone())).map_err(|err| CliError::Storage(err.to_string()))?.ok_or_else(|| CliError::UnknownRun(run_id.clone()))?;
            let body = serde_json::to_string_pretty(&state).unwrap_or_default();
            write_stdout_line(&body).map_err(|err| CliError::Io("stdout".to_string(), err.to_string()))?;
            Ok(exit_code_for(&state.status))
        }
        Commands::Rebuild { run_id } => {
            let store = FileStore::open(FileStoreConfig { root: cli.install_root.join("runs"), fsync: true }).map_err(|err| CliError::Storage(err.to_string()))?;
            let state = store.load(&RunId::new(run_id.clone())).map_err(|err| CliError::Storage(err.to_string()))?.ok_or_else(|| CliError::UnknownRun(run_id.clone()))?;
            let body = serde_json::to_string_pretty(&state).unwrap_or_default();
            write_stdout_line(&body).map_err(|err| CliError::Io("stdout".to_string(), err.to_string()))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
