// crates/kernel-engine/src/step_engine.rs
// ============================================================================
// Module: Step Engine
// Description: Drives one step attempt end to end: dispatch, microloop,
//              finalize, forensic scan, shadow-fork commit.
// Purpose: Isolate the mechanics of a single step attempt from the
//          orchestrator's run-level decisions (budget, routing, persistence).
// Dependencies: kernel-core, kernel-contract, kernel-engine::microloop,
//               kernel-engine::error, kernel-engine::metrics
// ============================================================================

//! ## Overview
//! [`StepEngine::run_step`] opens a transport session, dispatches the work
//! phase, re-enters the backend's own microloop until
//! [`crate::microloop::MicroloopState`] says to stop, then runs the two
//! remaining session phases exactly once: `finalize`, which produces the
//! schema-governed [`HandoffEnvelope`], and the optional `route` phase. It
//! scans the final result, commits the shadow fork, and returns a
//! [`StepAttempt`] for the orchestrator to price, receipt, and route.
//! Everything here is step-local; no run-wide decision (budget enforcement,
//! routing, event persistence) is made in this module.

use std::time::Instant;

use kernel_contract::schemas::envelope_schema;
use kernel_core::core::hash_bytes;
use kernel_core::core::hash_value;
use kernel_core::core::Assumption;
use kernel_core::core::BackendId;
use kernel_core::core::Concern;
use kernel_core::core::ConcernSeverity;
use kernel_core::core::ContextPack;
use kernel_core::core::CorrelationId;
use kernel_core::core::EnvelopeId;
use kernel_core::core::EnvelopeMeta;
use kernel_core::core::EnvelopeStatus;
use kernel_core::core::EnvelopeSummary;
use kernel_core::core::Evidence;
use kernel_core::core::FileChanges;
use kernel_core::core::FlowId;
use kernel_core::core::ForensicSummary;
use kernel_core::core::HandoffEnvelope;
use kernel_core::core::RoutingRecommendation;
use kernel_core::core::RunId;
use kernel_core::core::SessionId;
use kernel_core::core::StepId;
use kernel_core::core::Timestamp;
use kernel_core::interfaces::ForensicScanner;
use kernel_core::interfaces::Storage;
use kernel_core::interfaces::TransportPort;
use kernel_core::interfaces::VcsAdapter;
use kernel_forensics::verdict;
use kernel_forensics::DiffStats;
use kernel_forensics::TestStats;
use kernel_forensics::VerdictRecommendation;

use crate::error::EngineError;
use crate::metrics::EngineMetrics;
use crate::microloop::MicroloopExit;
use crate::microloop::MicroloopSignal;
use crate::microloop::MicroloopState;
use crate::microloop::ResultStatus;

/// Everything the step engine needs to dispatch one step attempt.
pub struct StepContext<'a> {
    /// Run this attempt belongs to.
    pub run_id: &'a RunId,
    /// Flow graph the run is executing.
    pub flow_id: &'a FlowId,
    /// Step being attempted.
    pub step_id: &'a StepId,
    /// Backend this step dispatches to; also the agent key carried in the envelope's meta.
    pub backend_id: &'a BackendId,
    /// Context pack handed to the backend on session open.
    pub context_pack: ContextPack,
    /// Correlation identifier shared across this attempt's envelope and receipt.
    pub correlation_id: CorrelationId,
    /// Maximum microloop iterations allowed for this step.
    pub max_microloop_iterations: u32,
}

/// The outcome of one fully-driven step attempt, ready for the orchestrator
/// to price and receipt.
pub struct StepAttempt {
    /// The envelope the backend produced at finalize time.
    pub envelope: HandoffEnvelope,
    /// The backend's routing-phase payload, if it offered one.
    pub route_signal: Option<serde_json::Value>,
    /// The forensic summary of the final result.
    pub forensic: ForensicSummary,
    /// Why the microloop stopped.
    pub microloop_exit: MicroloopExit,
    /// Number of microloop iterations consumed.
    pub microloop_iterations: u32,
    /// Free-form usage/measurements the backend reported, for cost tracking.
    pub measurements: serde_json::Value,
    /// The commit reference the shadow fork advanced to, if the adapter
    /// reports one for this step.
    pub vcs_commit: String,
}

/// Drives one step attempt: dispatch, microloop, finalize, scan, commit.
pub struct StepEngine<'a, Tp, Fs, St, Vc> {
    transport: &'a Tp,
    scanner: &'a Fs,
    storage: &'a St,
    vcs: &'a Vc,
    metrics: &'a EngineMetrics,
}

impl<'a, Tp, Fs, St, Vc> StepEngine<'a, Tp, Fs, St, Vc>
where
    Tp: TransportPort,
    Fs: ForensicScanner,
    St: Storage,
    Vc: VcsAdapter,
{
    /// Builds a step engine over the given ports.
    pub const fn new(transport: &'a Tp, scanner: &'a Fs, storage: &'a St, vcs: &'a Vc, metrics: &'a EngineMetrics) -> Self {
        Self { transport, scanner, storage, vcs, metrics }
    }

    /// Runs one step attempt to completion.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the session cannot be opened, a phase
    /// fails, the scan fails, or the envelope cannot be durably written.
    pub fn run_step(&self, ctx: &StepContext<'_>, closed_at: Timestamp) -> Result<StepAttempt, EngineError> {
        let start = Instant::now();
        let session_id = self.transport.open_session(ctx.backend_id, ctx.step_id)?;

        let prompt = serde_json::to_value(&ctx.context_pack).unwrap_or(serde_json::Value::Null);
        let mut microloop = MicroloopState::new(ctx.max_microloop_iterations.max(1));
        let exit = loop {
            let result = self.transport.work(&session_id, &prompt)?;
            let artifact = serde_json::to_vec(&result).unwrap_or_default();
            let signal = parse_signal(&result);
            let outcome = microloop.should_exit(&signal, &artifact);
            if outcome.is_none() {
                self.metrics.record_microloop_iteration();
            }
            if let Some(exit) = outcome {
                break exit;
            }
        };

        let finalized = self.transport.finalize(&session_id, &envelope_schema())?;
        let route_signal = self.transport.route(&session_id, &envelope_schema())?;

        self.transport.close(&session_id)?;

        let mut envelope = build_envelope(ctx, &session_id, exit, &finalized, closed_at);
        let ruling = verdict::compare(&envelope, &diff_stats(&envelope.file_changes), &test_stats(&envelope.summary.evidence.measurements), None);
        if ruling.recommendation == VerdictRecommendation::Reject {
            envelope.concerns.push(Concern {
                severity: ConcernSeverity::High,
                description: ruling.summary.clone(),
                location: "forensic verdict".to_string(),
                recommendation: "treat this attempt as unverified and route accordingly".to_string(),
            });
        }
        self.storage.write_envelope(&envelope)?;

        let artifact = serde_json::to_vec(&envelope.file_changes).unwrap_or_default();
        let forensic = self.scanner.scan(ctx.step_id, &artifact)?;

        let vcs_commit = self.vcs.commit_step(ctx.run_id, ctx.step_id)?;

        self.metrics.record_step(start, exit == MicroloopExit::Verified);

        Ok(StepAttempt {
            measurements: envelope.summary.evidence.measurements.clone(),
            envelope,
            route_signal,
            forensic,
            microloop_exit: exit,
            microloop_iterations: microloop.iteration(),
            vcs_commit,
        })
    }
}

/// Builds the finalized envelope from the backend's raw finalize payload,
/// stamping the identifiers and content hash the engine itself owns. A
/// backend that failed to produce a structurally valid result (its fallback
/// retries exhausted) yields an `UNVERIFIED` envelope carrying a concern
/// rather than propagating a parse error up through the run.
fn build_envelope(
    ctx: &StepContext<'_>,
    session_id: &SessionId,
    exit: MicroloopExit,
    finalized: &serde_json::Value,
    closed_at: Timestamp,
) -> HandoffEnvelope {
    let meta = EnvelopeMeta {
        step_id: ctx.step_id.clone(),
        flow_key: ctx.flow_id.to_string(),
        run_id: ctx.run_id.clone(),
        agent_key: ctx.backend_id.to_string(),
    };
    let mut draft: EnvelopeDraft = serde_json::from_value(finalized.clone()).unwrap_or_else(|err| EnvelopeDraft::unparseable(exit, &err.to_string()));
    if exit != MicroloopExit::Verified && draft.status == EnvelopeStatus::Verified {
        draft.status = EnvelopeStatus::Unverified;
    }
    let content_hash = hash_value(finalized).unwrap_or_else(|_| hash_bytes(b""));
    HandoffEnvelope {
        schema_version: "1.0.0".to_string(),
        envelope_id: EnvelopeId::new(ctx.correlation_id.to_string()),
        session_id: session_id.clone(),
        correlation_id: ctx.correlation_id.clone(),
        meta,
        status: draft.status,
        summary: draft.summary,
        concerns: draft.concerns,
        assumptions: draft.assumptions,
        file_changes: draft.file_changes,
        routing: draft.routing,
        content_hash,
        closed_at,
    }
}

/// The schema-governed fields of a [`HandoffEnvelope`] the backend itself
/// supplies; the engine stamps identifiers, `schema_version`, and
/// `content_hash` separately.
#[derive(serde::Deserialize)]
struct EnvelopeDraft {
    status: EnvelopeStatus,
    summary: EnvelopeSummary,
    #[serde(default)]
    concerns: Vec<Concern>,
    #[serde(default)]
    assumptions: Vec<Assumption>,
    file_changes: FileChanges,
    routing: RoutingRecommendation,
}

impl EnvelopeDraft {
    fn unparseable(exit: MicroloopExit, parse_error: &str) -> Self {
        let status = if exit == MicroloopExit::Verified { EnvelopeStatus::Verified } else { EnvelopeStatus::Unverified };
        Self {
            status,
            summary: EnvelopeSummary {
                what_i_did: "backend did not return a structurally valid finalize payload".to_string(),
                what_i_found: String::new(),
                key_decisions: vec![],
                evidence: Evidence { artifacts_produced: vec![], commands_run: vec![], measurements: serde_json::Value::Null },
            },
            concerns: vec![Concern {
                severity: ConcernSeverity::High,
                description: format!("finalize payload failed schema parsing: {parse_error}"),
                location: "finalize".to_string(),
                recommendation: "treat this attempt as unverified and route accordingly".to_string(),
            }],
            assumptions: vec![],
            file_changes: FileChanges { files: vec![], totals: serde_json::Value::Null },
            routing: RoutingRecommendation {
                recommendation: "escalate".to_string(),
                reason: "finalize payload was unparseable".to_string(),
                next_step_suggestion: None,
                can_further_iteration_help: false,
            },
        }
    }
}

/// Reads the backend-reported line totals off an envelope's file-change
/// rollup into the comparator's measured shape, defaulting to zero when the
/// backend did not report them.
fn diff_stats(file_changes: &FileChanges) -> DiffStats {
    let files_changed = i64::try_from(file_changes.files.len()).unwrap_or(i64::MAX);
    let lines_added = file_changes.totals.get("lines_added").and_then(serde_json::Value::as_i64).unwrap_or(0);
    let lines_removed = file_changes.totals.get("lines_removed").and_then(serde_json::Value::as_i64).unwrap_or(0);
    DiffStats { files_changed, lines_added, lines_removed }
}

/// Reads the backend-reported test outcome off an envelope's evidence
/// measurements into the comparator's measured shape.
fn test_stats(measurements: &serde_json::Value) -> TestStats {
    let tests = measurements.get("tests");
    let passed = tests.and_then(|tests| tests.get("passed")).and_then(serde_json::Value::as_u64).unwrap_or(0);
    let failed = tests.and_then(|tests| tests.get("failed")).and_then(serde_json::Value::as_u64).unwrap_or(0);
    let total = tests.and_then(|tests| tests.get("total")).and_then(serde_json::Value::as_u64).unwrap_or(passed + failed);
    let coverage_percent = tests.and_then(|tests| tests.get("coverage_percent")).and_then(serde_json::Value::as_f64);
    TestStats { passed, failed, total, coverage_percent }
}

fn parse_signal(result: &serde_json::Value) -> MicroloopSignal {
    serde_json::from_value(result.clone()).unwrap_or(MicroloopSignal {
        status: ResultStatus::Unverified,
        routing: crate::microloop::RoutingSignal { can_further_iteration_help: None },
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::sync::Mutex;

    use kernel_core::core::BudgetSnapshot;
    use kernel_core::core::RunEvent;
    use kernel_core::core::RunState;
    use kernel_core::core::StepCost;
    use kernel_core::interfaces::Page;
    use kernel_core::interfaces::ScanError;
    use kernel_core::interfaces::SessionError;
    use kernel_core::interfaces::StoreError;
    use kernel_core::interfaces::VcsError;
    use serde_json::json;

    use super::*;

    struct StubTransport {
        rounds: Mutex<Vec<serde_json::Value>>,
        finalize_payload: serde_json::Value,
    }

    impl TransportPort for StubTransport {
        fn open_session(&self, _backend_id: &BackendId, _step_id: &StepId) -> Result<SessionId, SessionError> {
            Ok(SessionId::new("session-1"))
        }

        fn work(&self, _session_id: &SessionId, _prompt: &serde_json::Value) -> Result<serde_json::Value, SessionError> {
            let mut rounds = self.rounds.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            Ok(rounds.pop().unwrap_or(json!({"status": "VERIFIED"})))
        }

        fn finalize(&self, _session_id: &SessionId, _schema: &serde_json::Value) -> Result<serde_json::Value, SessionError> {
            Ok(self.finalize_payload.clone())
        }

        fn route(&self, _session_id: &SessionId, _schema: &serde_json::Value) -> Result<Option<serde_json::Value>, SessionError> {
            Ok(None)
        }

        fn close(&self, _session_id: &SessionId) -> Result<(), SessionError> {
            Ok(())
        }
    }

    fn finalize_payload(status: &str) -> serde_json::Value {
        json!({
            "status": status,
            "summary": {
                "what_i_did": "implemented the step",
                "what_i_found": "no surprises",
                "key_decisions": [],
                "evidence": {"artifacts_produced": [], "commands_run": [], "measurements": {}}
            },
            "concerns": [],
            "assumptions": [],
            "file_changes": {"files": ["src/lib.rs"], "totals": {"added": 3, "removed": 0}},
            "routing": {"recommendation": "advance", "reason": "done"}
        })
    }

    struct StubScanner;

    impl ForensicScanner for StubScanner {
        fn scan(&self, step_id: &StepId, _artifact: &[u8]) -> Result<ForensicSummary, ScanError> {
            Ok(ForensicSummary {
                scan_id: kernel_core::core::ScanId::new("scan-1"),
                step_id: step_id.clone(),
                conditions: std::collections::BTreeMap::new(),
                no_progress: false,
            })
        }
    }

    struct StubStorage {
        writes: Cell<u32>,
    }

    impl Storage for StubStorage {
        fn load(&self, _run_id: &RunId) -> Result<Option<RunState>, StoreError> {
            Ok(None)
        }

        fn append_event(&self, _run_id: &RunId, _seq: kernel_core::core::EventSeq, _event: &RunEvent) -> Result<(), StoreError> {
            Ok(())
        }

        fn read_events(&self, _run_id: &RunId, _after: Option<kernel_core::core::EventSeq>, _limit: usize) -> Result<Page<(kernel_core::core::EventSeq, RunEvent)>, StoreError> {
            Ok(Page { items: vec![], next_cursor: None })
        }

        fn write_envelope(&self, _envelope: &HandoffEnvelope) -> Result<(), StoreError> {
            self.writes.set(self.writes.get() + 1);
            Ok(())
        }

        fn commit_step_completion(&self, _run_id: &RunId, _seq: kernel_core::core::EventSeq, _receipt: &kernel_core::core::Receipt) -> Result<(), StoreError> {
            Ok(())
        }
    }

    struct StubVcs;

    impl VcsAdapter for StubVcs {
        fn shadow_fork(&self, run_id: &RunId) -> Result<String, VcsError> {
            Ok(run_id.to_string())
        }

        fn commit_step(&self, _run_id: &RunId, step_id: &StepId) -> Result<String, VcsError> {
            Ok(format!("commit-{step_id}"))
        }

        fn discard(&self, _run_id: &RunId) -> Result<(), VcsError> {
            Ok(())
        }
    }

    fn context_pack() -> ContextPack {
        ContextPack {
            run_id: RunId::new("run-1"),
            flow_id: FlowId::new("flow-1"),
            step_id: StepId::new("step-a"),
            recent_receipts: vec![],
            budget: BudgetSnapshot { cap: StepCost::zero(), spent: StepCost::zero() },
        }
    }

    #[test]
    fn a_verified_first_round_exits_immediately_and_writes_one_envelope() {
        let transport = StubTransport { rounds: Mutex::new(vec![json!({"status": "VERIFIED"})]), finalize_payload: finalize_payload("VERIFIED") };
        let scanner = StubScanner;
        let storage = StubStorage { writes: Cell::new(0) };
        let vcs = StubVcs;
        let metrics = EngineMetrics::new();
        let engine = StepEngine::new(&transport, &scanner, &storage, &vcs, &metrics);
        let ctx = StepContext {
            run_id: &RunId::new("run-1"),
            flow_id: &FlowId::new("flow-1"),
            step_id: &StepId::new("step-a"),
            backend_id: &BackendId::new("backend-1"),
            context_pack: context_pack(),
            correlation_id: CorrelationId::new("corr-1"),
            max_microloop_iterations: 3,
        };
        let attempt = engine.run_step(&ctx, Timestamp::UnixMillis(1)).expect("run step");
        assert_eq!(attempt.microloop_exit, MicroloopExit::Verified);
        assert_eq!(attempt.microloop_iterations, 1);
        assert_eq!(storage.writes.get(), 1);
        assert_eq!(attempt.envelope.status, EnvelopeStatus::Verified);
        assert_eq!(attempt.envelope.file_changes.files, vec!["src/lib.rs".to_string()]);
        assert_eq!(attempt.vcs_commit, "commit-step-a");
    }

    #[test]
    fn an_unparseable_work_result_is_treated_as_unverified_and_keeps_iterating() {
        let transport = StubTransport {
            rounds: Mutex::new(vec![json!({"status": "VERIFIED"}), json!("not-an-object")]),
            finalize_payload: finalize_payload("VERIFIED"),
        };
        let scanner = StubScanner;
        let storage = StubStorage { writes: Cell::new(0) };
        let vcs = StubVcs;
        let metrics = EngineMetrics::new();
        let engine = StepEngine::new(&transport, &scanner, &storage, &vcs, &metrics);
        let ctx = StepContext {
            run_id: &RunId::new("run-1"),
            flow_id: &FlowId::new("flow-1"),
            step_id: &StepId::new("step-a"),
            backend_id: &BackendId::new("backend-1"),
            context_pack: context_pack(),
            correlation_id: CorrelationId::new("corr-1"),
            max_microloop_iterations: 3,
        };
        let attempt = engine.run_step(&ctx, Timestamp::UnixMillis(1)).expect("run step");
        assert_eq!(attempt.microloop_iterations, 2);
        assert_eq!(attempt.microloop_exit, MicroloopExit::Verified);
    }

    #[test]
    fn a_microloop_exit_short_of_verified_downgrades_a_premature_verified_claim() {
        let transport = StubTransport {
            rounds: Mutex::new(vec![json!({"status": "UNVERIFIED", "routing": {"can_further_iteration_help": false}})]),
            finalize_payload: finalize_payload("VERIFIED"),
        };
        let scanner = StubScanner;
        let storage = StubStorage { writes: Cell::new(0) };
        let vcs = StubVcs;
        let metrics = EngineMetrics::new();
        let engine = StepEngine::new(&transport, &scanner, &storage, &vcs, &metrics);
        let ctx = StepContext {
            run_id: &RunId::new("run-1"),
            flow_id: &FlowId::new("flow-1"),
            step_id: &StepId::new("step-a"),
            backend_id: &BackendId::new("backend-1"),
            context_pack: context_pack(),
            correlation_id: CorrelationId::new("corr-1"),
            max_microloop_iterations: 3,
        };
        let attempt = engine.run_step(&ctx, Timestamp::UnixMillis(1)).expect("run step");
        assert_eq!(attempt.microloop_exit, MicroloopExit::BackendDeclined);
        assert_eq!(attempt.envelope.status, EnvelopeStatus::Unverified);
    }

    #[test]
    fn a_verified_claim_over_failing_tests_is_flagged_as_a_forensic_concern() {
        let mut payload = finalize_payload("VERIFIED");
        payload["file_changes"] = json!({"files": ["src/lib.rs"], "totals": {}});
        payload["summary"]["evidence"]["measurements"] = json!({"tests": {"passed": 4, "failed": 1, "total": 5}});
        let transport = StubTransport { rounds: Mutex::new(vec![json!({"status": "VERIFIED"})]), finalize_payload: payload };
        let scanner = StubScanner;
        let storage = StubStorage { writes: Cell::new(0) };
        let vcs = StubVcs;
        let metrics = EngineMetrics::new();
        let engine = StepEngine::new(&transport, &scanner, &storage, &vcs, &metrics);
        let ctx = StepContext {
            run_id: &RunId::new("run-1"),
            flow_id: &FlowId::new("flow-1"),
            step_id: &StepId::new("step-a"),
            backend_id: &BackendId::new("backend-1"),
            context_pack: context_pack(),
            correlation_id: CorrelationId::new("corr-1"),
            max_microloop_iterations: 3,
        };
        let attempt = engine.run_step(&ctx, Timestamp::UnixMillis(1)).expect("run step");
        assert_eq!(attempt.envelope.status, EnvelopeStatus::Verified);
        assert!(attempt.envelope.concerns.iter().any(|concern| concern.location == "forensic verdict"));
    }
}
