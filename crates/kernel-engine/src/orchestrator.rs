// crates/kernel-engine/src/orchestrator.rs
// ============================================================================
// Module: Orchestrator
// Description: Drives a run from its entry step to a terminal status, one
//              step attempt at a time.
// Purpose: Own the run-level decision loop: load state, run a step, price
//          it, route it, persist the result, repeat until terminal.
// Dependencies: kernel-core, kernel-routing, kernel-forensics, kernel-logic,
//               kernel-engine::{step_engine, budget, metrics, error, vcs}
// ============================================================================

//! ## Overview
//! [`Orchestrator::run_flow`] is the kernel's main decision loop, grounded in
//! the same shape as a classic load-evaluate-decide-persist control plane:
//! load the run's current state, run one step attempt, evaluate its forensic
//! summary against the flow graph's guards, decide what happens next via the
//! routing cascade, and persist every fact as an event before looping. The
//! loop stops when the run reaches a terminal status, an operator requests a
//! cooperative stop, or a fuse trips: the hard budget cap, or — when enabled
//! — a stall with no sidequest to detour into.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use kernel_core::core::apply_event;
use kernel_core::core::BackendId;
use kernel_core::core::BudgetSnapshot;
use kernel_core::core::ContextPack;
use kernel_core::core::CorrelationId;
use kernel_core::core::EventSeq;
use kernel_core::core::FlowGraph;
use kernel_core::core::FlowId;
use kernel_core::core::ReceiptId;
use kernel_core::core::ReceiptOutcome;
use kernel_core::core::Receipt;
use kernel_core::core::RunConfig;
use kernel_core::core::RunEvent;
use kernel_core::core::RunId;
use kernel_core::core::RunState;
use kernel_core::core::RunStatus;
use kernel_core::core::ScentEntry;
use kernel_core::core::StepCost;
use kernel_core::core::StepId;
use kernel_core::core::StepKind;
use kernel_core::core::Timestamp;
use kernel_core::interfaces::ForensicScanner;
use kernel_core::interfaces::RoutingLog;
use kernel_core::interfaces::Storage;
use kernel_core::interfaces::TransportPort;
use kernel_core::interfaces::VcsAdapter;
use kernel_routing::build_decision_record;
use kernel_routing::classify_decision;
use kernel_routing::route;
use kernel_routing::Decision;
use kernel_routing::IterationCounters;
use kernel_routing::IterationState;
use kernel_routing::Navigator;
use kernel_routing::RouteRequest;
use kernel_routing::RoutingMetrics;
use kernel_routing::RoutingMode;
use kernel_routing::SidequestCatalog;

use crate::budget::BudgetTracker;
use crate::budget::CapStatus;
use crate::budget::PriceTable;
use crate::error::EngineError;
use crate::metrics::EngineMetrics;
use crate::microloop::MicroloopExit;
use crate::step_engine::StepContext;
use crate::step_engine::StepEngine;

/// Configuration for one orchestrator instance, independent of any single run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Whether a shadow fork is created for runs this orchestrator drives.
    pub shadow_fork_enabled: bool,
    /// Maximum depth of the interruption stack before a detour is refused.
    pub interruption_stack_depth: usize,
    /// Whether the stall fuse can abort a run with no matching sidequest.
    pub stall_fuse_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { shadow_fork_enabled: true, interruption_stack_depth: 3, stall_fuse_enabled: true }
    }
}

/// The result of driving a run to a stopping point.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Run driven.
    pub run_id: RunId,
    /// Status the run stopped at; not necessarily terminal (for example, a
    /// cooperative stop leaves the run `Running` to be resumed later).
    pub status: RunStatus,
    /// Number of step attempts completed this call.
    pub steps_attempted: u32,
    /// Cumulative cost spent across the run so far.
    pub spent: StepCost,
}

/// Drives one flow graph's runs from entry to a terminal status.
pub struct Orchestrator<'a, Tp, Fs, St, Vc> {
    flow: FlowGraph,
    config: EngineConfig,
    step_engine: StepEngine<'a, Tp, Fs, St, Vc>,
    storage: &'a St,
    routing_log: &'a dyn RoutingLog,
    catalog: SidequestCatalog,
    navigator: Option<&'a dyn Navigator>,
    routing_mode: RoutingMode,
    metrics: &'a EngineMetrics,
    routing_metrics: &'a RoutingMetrics,
    price_table: PriceTable,
    model_tier: String,
    stop: AtomicBool,
    interruption_stack: Mutex<Vec<StepId>>,
}

impl<'a, Tp, Fs, St, Vc> Orchestrator<'a, Tp, Fs, St, Vc>
where
    Tp: TransportPort,
    Fs: ForensicScanner,
    St: Storage,
    Vc: VcsAdapter,
{
    /// Builds an orchestrator for `flow`.
    #[allow(clippy::too_many_arguments, reason = "each argument is a distinct, independently-configured port or policy")]
    pub fn new(
        flow: FlowGraph,
        config: EngineConfig,
        transport: &'a Tp,
        scanner: &'a Fs,
        storage: &'a St,
        vcs: &'a Vc,
        routing_log: &'a dyn RoutingLog,
        catalog: SidequestCatalog,
        navigator: Option<&'a dyn Navigator>,
        routing_mode: RoutingMode,
        metrics: &'a EngineMetrics,
        routing_metrics: &'a RoutingMetrics,
        price_table: PriceTable,
        model_tier: impl Into<String>,
    ) -> Self {
        Self {
            flow,
            config,
            step_engine: StepEngine::new(transport, scanner, storage, vcs, metrics),
            storage,
            routing_log,
            catalog,
            navigator,
            routing_mode,
            metrics,
            routing_metrics,
            price_table,
            model_tier: model_tier.into(),
            stop: AtomicBool::new(false),
            interruption_stack: Mutex::new(Vec::new()),
        }
    }

    /// Requests a cooperative stop; the run halts at the next step boundary
    /// rather than mid-attempt.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Drives `run_id` against this orchestrator's flow graph, starting it if
    /// it does not yet exist, until it reaches a terminal status, a
    /// cooperative stop is honored, or a fuse trips.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when a port fails or a fuse trips.
    pub fn run_flow(&self, run_id: RunId, flow_id: FlowId, run_config: RunConfig, ledger_path: std::path::PathBuf) -> Result<RunSummary, EngineError> {
        let mut budget = BudgetTracker::open(ledger_path, run_config.hard_budget_cap.usd.max(f64::MIN_POSITIVE))
            .map_err(|err| EngineError::PreflightFailed(err.to_string()))?;

        let mut state = self.load_or_start(&run_id, &flow_id, &run_config)?;
        let mut next_seq = self.tail_seq(&run_id)?;
        let mut steps_attempted = 0u32;
        let mut iteration_at_step = 0u32;

        loop {
            if state.status.is_terminal() {
                break;
            }
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            match budget.check_caps() {
                CapStatus::Abort => {
                    let reason = "hard budget cap reached".to_string();
                    self.persist(&run_id, &mut next_seq, &mut state, RunEvent::RunAborted { reason, at: now() })?;
                    self.metrics.record_run_aborted();
                    break;
                }
                CapStatus::Warn | CapStatus::Ok => {}
            }

            let node = self
                .flow
                .node(&state.current_step)
                .ok_or_else(|| EngineError::PreflightFailed(format!("step {} is not present in the flow graph", state.current_step)))?
                .clone();

            self.persist(&run_id, &mut next_seq, &mut state, RunEvent::StepStarted { step_id: node.step_id.clone(), at: now() })?;

            let correlation_id = CorrelationId::new(format!("{run_id}-{}-{}", node.step_id, next_seq));
            let backend_id = BackendId::new(node.agent_key.clone());
            let context_pack = ContextPack {
                run_id: run_id.clone(),
                flow_id: flow_id.clone(),
                step_id: node.step_id.clone(),
                recent_receipts: recent_receipts(&state, 5),
                budget: BudgetSnapshot { cap: run_config.hard_budget_cap, spent: budget.spent() },
            };
            let max_microloop = node.microloop_max_iterations.unwrap_or(run_config.max_microloop_iterations);
            let ctx = StepContext {
                run_id: &run_id,
                flow_id: &flow_id,
                step_id: &node.step_id,
                backend_id: &backend_id,
                context_pack,
                correlation_id,
                max_microloop_iterations: max_microloop,
            };

            let attempt = self.step_engine.run_step(&ctx, now())?;
            self.persist(
                &run_id,
                &mut next_seq,
                &mut state,
                RunEvent::EnvelopeRecorded { envelope_id: attempt.envelope.envelope_id.clone(), status: attempt.envelope.status, at: attempt.envelope.closed_at },
            )?;
            self.persist(&run_id, &mut next_seq, &mut state, RunEvent::ForensicScanCompleted { summary: attempt.forensic.clone() })?;

            let (input_tokens, output_tokens) = extract_usage(&attempt.measurements);
            let cost = budget
                .record(&self.price_table, &node.step_id, &self.model_tier, input_tokens, output_tokens)
                .map_err(|err| EngineError::PreflightFailed(err.to_string()))?;

            let artifact_hash = attempt.envelope.content_hash;
            let outcome = if attempt.microloop_exit == MicroloopExit::Verified {
                ReceiptOutcome::Success
            } else {
                ReceiptOutcome::Rejected { reason: microloop_exit_reason(attempt.microloop_exit) }
            };
            let receipt = Receipt {
                receipt_id: ReceiptId::new(format!("{}-{}", node.step_id, next_seq)),
                step_id: node.step_id.clone(),
                envelope_id: attempt.envelope.envelope_id.clone(),
                correlation_id: attempt.envelope.correlation_id.clone(),
                scan_id: Some(attempt.forensic.scan_id.clone()),
                outcome,
                cost,
                artifact_hash,
                closed_at: now(),
            };
            self.storage.commit_step_completion(&run_id, next_seq, &receipt)?;
            state = apply_event(state, &RunEvent::ReceiptRecorded { receipt: receipt.clone() }).map_err(|err| EngineError::PreflightFailed(err.to_string()))?;
            next_seq = next_seq.next();

            let (lines_added, lines_removed) = extract_line_totals(&attempt.envelope.file_changes.totals);
            let (tests_failed, coverage_percent) = extract_test_signal(&attempt.measurements);
            let scent = ScentEntry {
                step_id: node.step_id.clone(),
                summary_hash: artifact_hash,
                files_changed: i64::try_from(attempt.envelope.file_changes.files.len()).unwrap_or(i64::MAX),
                lines_added,
                lines_removed,
                tests_failed,
                coverage_percent,
            };
            let stalled_check = kernel_forensics::analyze(&state.scent_trail, &scent);
            self.persist(&run_id, &mut next_seq, &mut state, RunEvent::ScentRecorded { entry: scent.clone() })?;

            steps_attempted += 1;
            iteration_at_step = if attempt.microloop_exit == MicroloopExit::RepeatedFailure || matches!(node.kind, StepKind::Work) && node.is_microloop() {
                iteration_at_step + 1
            } else {
                0
            };
            let iteration = IterationState { current: iteration_at_step, max: max_microloop };

            let routing_start = std::time::Instant::now();
            let error_signature = matches!(receipt.outcome, ReceiptOutcome::Rejected { .. } | ReceiptOutcome::Failed { .. }).then(|| microloop_exit_reason(attempt.microloop_exit));
            let outcome = route(
                &RouteRequest {
                    flow: &self.flow,
                    current_step: &node.step_id,
                    forensic: &attempt.forensic,
                    scent_trail: &state.scent_trail,
                    latest_scent: &scent,
                    iteration,
                    mode: self.routing_mode,
                    catalog: &self.catalog,
                    error_signature: error_signature.as_deref(),
                    allow_extend_graph: run_config.allow_extend_graph,
                    envelope_fallback: attempt.envelope.routing.next_step_suggestion.as_ref(),
                },
                self.navigator,
            );
            let decision = classify_decision(&outcome, &self.flow);
            self.metrics.record_routing(routing_start, decision == Decision::Detour);
            self.routing_metrics.record_decision(
                decision,
                u64::try_from(outcome.candidates.len()).unwrap_or(u64::MAX),
                outcome.chosen.is_some(),
            );
            self.persist(&run_id, &mut next_seq, &mut state, RunEvent::RoutingDecided { outcome: outcome.clone() })?;

            let record = build_decision_record(
                &outcome,
                decision,
                flow_id.as_str(),
                run_id.as_str(),
                artifact_hash,
                IterationCounters { current: iteration.current, max: iteration.max },
                !stalled_check.is_stalled,
                now(),
            );
            self.routing_log.record(&run_id, &record).map_err(|err| EngineError::RoutingLog(err.to_string()))?;

            match decision {
                Decision::Loop => {}
                Decision::Advance => {
                    if let Some(target) = advance_target(&outcome) {
                        self.persist(&run_id, &mut next_seq, &mut state, RunEvent::StepStarted { step_id: target.clone(), at: now() })?;
                    }
                }
                Decision::Terminate => {
                    self.persist(&run_id, &mut next_seq, &mut state, RunEvent::RunCompleted { at: now() })?;
                    self.metrics.record_run_completed();
                    break;
                }
                Decision::Detour => {
                    self.push_detour(&run_id, &mut next_seq, &mut state, &outcome)?;
                }
                Decision::InjectFlow | Decision::InjectNodes | Decision::Escalate => {
                    let summary = kernel_core::core::BlockedSummary::new(format!("{decision:?}"), vec![node.step_id.clone()]);
                    self.persist(&run_id, &mut next_seq, &mut state, RunEvent::RunBlocked { summary })?;
                    break;
                }
            }

            if self.config.stall_fuse_enabled && stalled_check.is_stalled && decision != Decision::Detour {
                let reason = "stall fuse tripped with no matching sidequest".to_string();
                self.persist(&run_id, &mut next_seq, &mut state, RunEvent::RunAborted { reason, at: now() })?;
                self.metrics.record_run_aborted();
                break;
            }
        }

        Ok(RunSummary { run_id, status: state.status, steps_attempted, spent: budget.spent() })
    }

    fn load_or_start(&self, run_id: &RunId, flow_id: &FlowId, run_config: &RunConfig) -> Result<RunState, EngineError> {
        if let Some(existing) = self.storage.load(run_id)? {
            return Ok(existing);
        }
        let mut state = RunState::uninitialized(run_id.clone());
        let event = RunEvent::RunStarted {
            run_id: run_id.clone(),
            flow_id: flow_id.clone(),
            entry_step: self.flow.entry.clone(),
            config: run_config.clone(),
            at: now(),
        };
        self.storage.append_event(run_id, EventSeq::first(), &event)?;
        state = apply_event(state, &event).map_err(|err| EngineError::PreflightFailed(err.to_string()))?;
        Ok(state)
    }

    fn tail_seq(&self, run_id: &RunId) -> Result<EventSeq, EngineError> {
        let page = self.storage.read_events(run_id, None, usize::MAX)?;
        Ok(page.items.last().map_or(EventSeq::first(), |(seq, _)| seq.next()))
    }

    fn persist(&self, run_id: &RunId, seq: &mut EventSeq, state: &mut RunState, event: RunEvent) -> Result<(), EngineError> {
        if matches!(event, RunEvent::RunStarted { .. }) {
            *state = apply_event(std::mem::replace(state, RunState::uninitialized(run_id.clone())), &event)
                .map_err(|err| EngineError::PreflightFailed(err.to_string()))?;
            return Ok(());
        }
        self.storage.append_event(run_id, *seq, &event)?;
        *state = apply_event(std::mem::replace(state, RunState::uninitialized(run_id.clone())), &event)
            .map_err(|err| EngineError::PreflightFailed(err.to_string()))?;
        *seq = seq.next();
        Ok(())
    }

    fn push_detour(&self, run_id: &RunId, seq: &mut EventSeq, state: &mut RunState, outcome: &kernel_core::core::RoutingOutcome) -> Result<(), EngineError> {
        let Some(entry) = self.catalog.entries().iter().find(|entry| {
            outcome.chosen.as_ref().is_some_and(|chosen| {
                outcome
                    .candidates
                    .iter()
                    .any(|candidate| &candidate.candidate_id == chosen && matches!(&candidate.target, kernel_core::core::RoutingTarget::Sidequest { sidequest_id } if sidequest_id == &entry.sidequest_id))
            })
        }) else {
            return Err(EngineError::PreflightFailed("detour decision did not resolve to a catalog entry".to_string()));
        };
        let mut stack = self.interruption_stack.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if stack.len() >= self.config.interruption_stack_depth {
            return Err(EngineError::InterruptionStackOverflow { depth: stack.len() + 1, max: self.config.interruption_stack_depth });
        }
        stack.push(entry.resume_step.clone());
        drop(stack);
        self.persist(run_id, seq, state, RunEvent::StepStarted { step_id: entry.target_step.clone(), at: now() })
    }
}

fn advance_target(outcome: &kernel_core::core::RoutingOutcome) -> Option<&StepId> {
    let chosen = outcome.chosen.as_ref()?;
    outcome.candidates.iter().find(|candidate| &candidate.candidate_id == chosen).and_then(|candidate| match &candidate.target {
        kernel_core::core::RoutingTarget::ExistingStep { step_id } => Some(step_id),
        _ => None,
    })
}

fn recent_receipts(state: &RunState, window: usize) -> Vec<Receipt> {
    let start = state.receipts.len().saturating_sub(window);
    state.receipts[start..].to_vec()
}

fn microloop_exit_reason(exit: MicroloopExit) -> String {
    match exit {
        MicroloopExit::Verified => "verified".to_string(),
        MicroloopExit::BackendDeclined => "backend_declined_further_iteration".to_string(),
        MicroloopExit::IterationLimit => "microloop_iteration_limit".to_string(),
        MicroloopExit::RepeatedFailure => "repeated_failure_signature".to_string(),
    }
}

fn extract_usage(measurements: &serde_json::Value) -> (u64, u64) {
    let input = measurements.get("usage").and_then(|usage| usage.get("input_tokens")).and_then(serde_json::Value::as_u64).unwrap_or(0);
    let output = measurements.get("usage").and_then(|usage| usage.get("output_tokens")).and_then(serde_json::Value::as_u64).unwrap_or(0);
    (input, output)
}

/// Reads the backend-reported line totals off a closed envelope's file-change
/// rollup, defaulting to zero when the backend did not report them.
fn extract_line_totals(totals: &serde_json::Value) -> (i64, i64) {
    let added = totals.get("lines_added").and_then(serde_json::Value::as_i64).unwrap_or(0);
    let removed = totals.get("lines_removed").and_then(serde_json::Value::as_i64).unwrap_or(0);
    (added, removed)
}

/// Reads the backend-reported test-failure count and coverage off an
/// attempt's measurements, defaulting to no known failures when unreported.
fn extract_test_signal(measurements: &serde_json::Value) -> (u64, Option<f64>) {
    let tests = measurements.get("tests");
    let failed = tests.and_then(|tests| tests.get("failed")).and_then(serde_json::Value::as_u64).unwrap_or(0);
    let coverage_percent = tests.and_then(|tests| tests.get("coverage_percent")).and_then(serde_json::Value::as_f64);
    (failed, coverage_percent)
}

#[allow(clippy::cast_possible_truncation, reason = "unix milliseconds fit in i64 until the year 292277026596")]
fn now() -> Timestamp {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).map(|duration| duration.as_millis() as i64).unwrap_or(0);
    Timestamp::UnixMillis(millis)
}
