// crates/kernel-core/tests/replay.rs
// ============================================================================
// Module: Event Replay Tests
// Description: Verifies that folding a run's event log reproduces its state.
// ============================================================================
//! ## Overview
//! The orchestrator must be able to recover a run after a crash purely by
//! replaying its event log. These tests exercise `rebuild_state` end to end
//! and check that the gap-free sequencing invariant is enforced.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use kernel_core::core::apply_event;
use kernel_core::core::rebuild_state;
use kernel_core::core::EventSeq;
use kernel_core::core::FlowId;
use kernel_core::core::ReplayError;
use kernel_core::core::RunConfig;
use kernel_core::core::RunEvent;
use kernel_core::core::RunId;
use kernel_core::core::RunStatus;
use kernel_core::core::StepId;
use kernel_core::core::Timestamp;

fn run_started(run_id: &RunId) -> RunEvent {
    RunEvent::RunStarted {
        run_id: run_id.clone(),
        flow_id: FlowId::new("flow-1"),
        entry_step: StepId::new("step-1"),
        config: RunConfig::default(),
        at: Timestamp::Logical(0),
    }
}

#[test]
fn rebuilding_from_a_single_started_event_yields_running_state() {
    let run_id = RunId::new("run-1");
    let events = vec![(EventSeq::first(), run_started(&run_id))];
    let state = rebuild_state(run_id, &events).expect("rebuild");
    assert!(matches!(state.status, RunStatus::Running));
    assert_eq!(state.current_step, StepId::new("step-1"));
}

#[test]
fn rebuilding_an_empty_log_yields_pending_state() {
    let state = rebuild_state(RunId::new("run-2"), &[]).expect("rebuild");
    assert!(matches!(state.status, RunStatus::Pending));
}

#[test]
fn sequence_gap_is_rejected() {
    let run_id = RunId::new("run-3");
    let second = RunEvent::StepStarted {
        step_id: StepId::new("step-2"),
        at: Timestamp::Logical(1),
    };
    let events = vec![(EventSeq::from_raw(2).expect("nonzero"), second)];
    let err = rebuild_state(run_id, &events).expect_err("gap rejected");
    assert!(matches!(err, ReplayError::SequenceGap { expected: 1, found: 2 }));
}

#[test]
fn completion_after_completion_is_rejected() {
    let run_id = RunId::new("run-4");
    let started = run_started(&run_id);
    let events = vec![
        (EventSeq::first(), started),
        (
            EventSeq::from_raw(2).expect("nonzero"),
            RunEvent::RunCompleted {
                at: Timestamp::Logical(5),
            },
        ),
    ];
    let state = rebuild_state(run_id, &events).expect("rebuild");
    assert!(matches!(state.status, RunStatus::Completed));

    let extra = RunEvent::StepStarted {
        step_id: StepId::new("ghost"),
        at: Timestamp::Logical(6),
    };
    let err = apply_event(state, &extra).expect_err("terminal run rejects further events");
    assert!(matches!(err, ReplayError::AlreadyTerminal(_)));
}

#[test]
fn replaying_the_same_log_twice_produces_identical_state() {
    let run_id = RunId::new("run-5");
    let events = vec![(EventSeq::first(), run_started(&run_id))];
    let first = rebuild_state(run_id.clone(), &events).expect("rebuild 1");
    let second = rebuild_state(run_id, &events).expect("rebuild 2");
    assert_eq!(first, second);
}
