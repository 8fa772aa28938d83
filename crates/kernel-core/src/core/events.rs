// crates/kernel-core/src/core/events.rs
// ============================================================================
// Module: Run Events
// Description: The append-only log record for a run, and the pure functions
//              that fold it into a RunState.
// Purpose: Make a run's state fully reconstructible by replaying its log.
// Dependencies: crate::core::*, serde
// ============================================================================

//! ## Overview
//! Every durable change to a run is represented as a [`RunEvent`] before it is
//! applied. [`apply_event`] is a pure fold: given a state and an event it
//! returns the next state, never touching storage or the clock itself.
//! [`rebuild_state`] folds an entire ordered log from scratch, which is what
//! lets storage recover a run after a crash by replaying rather than trusting
//! a possibly-torn snapshot.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::envelope::EnvelopeStatus;
use crate::core::forensics::ForensicSummary;
use crate::core::identifiers::EnvelopeId;
use crate::core::identifiers::EventSeq;
use crate::core::identifiers::RunId;
use crate::core::identifiers::StepId;
use crate::core::receipts::Receipt;
use crate::core::routing::RoutingOutcome;
use crate::core::scent::ScentEntry;
use crate::core::state::RunConfig;
use crate::core::state::RunState;
use crate::core::state::RunStatus;
use crate::core::summary::BlockedSummary;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Run Event
// ============================================================================

/// A single durable fact recorded in a run's event log.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
/// - Applying the events of a run's log in sequence order is the only
///   supported way to reconstruct its [`RunState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunEvent {
    /// The run was created and its first step selected.
    RunStarted {
        /// Run identifier.
        run_id: RunId,
        /// Flow graph this run executes.
        flow_id: crate::core::identifiers::FlowId,
        /// Entry step of the flow graph this run executes.
        entry_step: StepId,
        /// Static configuration captured at run start.
        config: RunConfig,
        /// Timestamp the run started.
        at: Timestamp,
    },
    /// A step attempt began.
    StepStarted {
        /// Step that began.
        step_id: StepId,
        /// Timestamp the attempt began.
        at: Timestamp,
    },
    /// A handoff envelope was finalized for the current step.
    EnvelopeRecorded {
        /// Envelope identifier.
        envelope_id: EnvelopeId,
        /// The backend's claimed status.
        status: EnvelopeStatus,
        /// Timestamp the envelope was finalized.
        at: Timestamp,
    },
    /// A forensic scan completed for the current step's returned work.
    ForensicScanCompleted {
        /// The scan's result.
        summary: ForensicSummary,
    },
    /// The routing driver produced an outcome for the current step.
    RoutingDecided {
        /// The routing outcome.
        outcome: RoutingOutcome,
    },
    /// A receipt was recorded for a closed step attempt.
    ReceiptRecorded {
        /// The receipt.
        receipt: Receipt,
    },
    /// A scent trail breadcrumb was recorded.
    ScentRecorded {
        /// The breadcrumb entry.
        entry: ScentEntry,
    },
    /// A checkpoint was recorded naming a safe resumption point.
    CheckpointCreated {
        /// Operator-chosen label for the resumption point.
        label: String,
        /// Timestamp the checkpoint was recorded.
        at: Timestamp,
    },
    /// Routing escalated and the run is blocked awaiting intervention.
    RunBlocked {
        /// Redacted summary of why the run is blocked.
        summary: BlockedSummary,
    },
    /// The run reached a terminal step successfully.
    RunCompleted {
        /// Timestamp the run completed.
        at: Timestamp,
    },
    /// The run failed and cannot continue.
    RunFailed {
        /// Human-readable failure reason.
        reason: String,
        /// Timestamp the run failed.
        at: Timestamp,
    },
    /// The run was aborted by an operator or a fatal failure classification.
    RunAborted {
        /// Human-readable abort reason.
        reason: String,
        /// Timestamp the run was aborted.
        at: Timestamp,
    },
}

// ============================================================================
// SECTION: Replay
// ============================================================================

/// Errors raised while folding events into a [`RunState`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReplayError {
    /// An event was applied to a run already in a terminal status.
    #[error("event applied after run {0} reached a terminal status")]
    AlreadyTerminal(RunId),
    /// The event log's sequence numbers were not strictly increasing from one.
    #[error("event log is not gap-free: expected seq {expected}, found {found}")]
    SequenceGap {
        /// Sequence number that should have appeared next.
        expected: u64,
        /// Sequence number actually found.
        found: u64,
    },
}

/// Applies a single event to `state`, returning the next state.
///
/// This is a pure fold: it never reads the clock or touches storage.
///
/// # Errors
///
/// Returns [`ReplayError::AlreadyTerminal`] when `state` has already reached
/// a terminal status and `event` is not itself the event that produced it.
pub fn apply_event(state: RunState, event: &RunEvent) -> Result<RunState, ReplayError> {
    if state.status.is_terminal() && !matches!(event, RunEvent::RunCompleted { .. } | RunEvent::RunFailed { .. } | RunEvent::RunAborted { .. }) {
        return Err(ReplayError::AlreadyTerminal(state.run_id.clone()));
    }

    let mut next = state;
    match event {
        RunEvent::RunStarted { entry_step, config, flow_id, .. } => {
            next.flow_id = flow_id.clone();
            next.current_step = entry_step.clone();
            next.config = config.clone();
            next.status = RunStatus::Running;
        }
        RunEvent::StepStarted { step_id, .. } => {
            next.current_step = step_id.clone();
        }
        RunEvent::EnvelopeRecorded { envelope_id, .. } => {
            next.last_envelope = Some(envelope_id.clone());
        }
        RunEvent::ForensicScanCompleted { .. } | RunEvent::RoutingDecided { .. } | RunEvent::CheckpointCreated { .. } => {
            // Recorded for forensic replay; they do not themselves mutate run status.
        }
        RunEvent::ReceiptRecorded { receipt } => {
            next.budget.spent = next.budget.spent.add(receipt.cost);
            next.receipts.push(receipt.clone());
        }
        RunEvent::ScentRecorded { entry } => {
            next.scent_trail.push(entry.clone());
        }
        RunEvent::RunBlocked { summary } => {
            next.status = RunStatus::Blocked(summary.clone());
        }
        RunEvent::RunCompleted { .. } => {
            next.status = RunStatus::Completed;
        }
        RunEvent::RunFailed { reason, .. } => {
            next.status = RunStatus::Failed(reason.clone());
        }
        RunEvent::RunAborted { reason, .. } => {
            next.status = RunStatus::Aborted(reason.clone());
        }
    }
    Ok(next)
}

/// Rebuilds a [`RunState`] from scratch by folding an ordered event log.
///
/// # Errors
///
/// Returns [`ReplayError::SequenceGap`] if `events` is not contiguous from
/// [`EventSeq::first`], or [`ReplayError::AlreadyTerminal`] if an event
/// follows one that already terminated the run.
pub fn rebuild_state(run_id: RunId, events: &[(EventSeq, RunEvent)]) -> Result<RunState, ReplayError> {
    let mut expected = EventSeq::first();
    let Some((first_seq, first_event)) = events.first() else {
        return Ok(RunState::uninitialized(run_id));
    };
    if *first_seq != expected {
        return Err(ReplayError::SequenceGap {
            expected: expected.get(),
            found: first_seq.get(),
        });
    }
    let mut state = RunState::uninitialized(run_id);
    state = apply_event(state, first_event)?;
    expected = expected.next();

    for (seq, event) in &events[1..] {
        if *seq != expected {
            return Err(ReplayError::SequenceGap {
                expected: expected.get(),
                found: seq.get(),
            });
        }
        state = apply_event(state, event)?;
        expected = expected.next();
    }
    Ok(state)
}
