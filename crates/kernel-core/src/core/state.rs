// crates/kernel-core/src/core/state.rs
// ============================================================================
// Module: Run State
// Description: The reconstructible, in-memory state of a single orchestration run.
// Purpose: Give the orchestrator a single struct to act on, derivable purely
//          by folding a run's event log.
// Dependencies: crate::core::*, serde
// ============================================================================

//! ## Overview
//! A [`RunState`] never exists independently of its event log: it is always
//! either the result of [`crate::core::events::rebuild_state`] or of applying
//! one more [`crate::core::events::RunEvent`] via
//! [`crate::core::events::apply_event`]. Storage may snapshot it for fast
//! loading, but the log remains the source of truth.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::contextpack::BudgetSnapshot;
use crate::core::identifiers::EnvelopeId;
use crate::core::identifiers::FlowId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::StepId;
use crate::core::receipts::Receipt;
use crate::core::receipts::StepCost;
use crate::core::scent::ScentTrail;
use crate::core::summary::BlockedSummary;

// ============================================================================
// SECTION: Run Config
// ============================================================================

/// Static configuration captured at run start and carried unchanged thereafter.
///
/// # Invariants
/// - Immutable for the lifetime of a run; changing a run's configuration
///   requires starting a new run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Hard cost cap; the run aborts rather than exceed it.
    pub hard_budget_cap: StepCost,
    /// Maximum microloop iterations allowed per step before escalating.
    pub max_microloop_iterations: u32,
    /// Number of recent scent entries retained for stall detection.
    pub stall_window: usize,
    /// Whether the routing driver may propose brand-new flow nodes.
    pub allow_extend_graph: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            hard_budget_cap: StepCost::zero(),
            max_microloop_iterations: 1,
            stall_window: 8,
            allow_extend_graph: false,
        }
    }
}

// ============================================================================
// SECTION: Run Status
// ============================================================================

/// The lifecycle status of a run.
///
/// # Invariants
/// - `Completed`, `Failed`, and `Aborted` are terminal; no further events
///   other than the one that produced them may be applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunStatus {
    /// The run has been created but its `RunStarted` event has not yet been applied.
    Pending,
    /// The run is actively progressing through its flow graph.
    Running,
    /// Routing escalated and the run awaits operator intervention.
    Blocked(BlockedSummary),
    /// The run reached a terminal step successfully.
    Completed,
    /// The run failed and will not continue.
    Failed(String),
    /// The run was aborted.
    Aborted(String),
}

impl RunStatus {
    /// Returns `true` when no further events may advance this run.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_) | Self::Aborted(_))
    }
}

// ============================================================================
// SECTION: Run State
// ============================================================================

/// The reconstructible state of a single orchestration run.
///
/// # Invariants
/// - Only ever produced by folding a run's event log from
///   [`RunState::uninitialized`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Run identifier.
    pub run_id: RunId,
    /// Flow graph this run executes, populated once `RunStarted` is applied.
    pub flow_id: FlowId,
    /// Step the run is currently at (or was last at, if blocked or terminal).
    pub current_step: StepId,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Most recently recorded handoff envelope, if any.
    pub last_envelope: Option<EnvelopeId>,
    /// Bounded scent trail used for stall detection.
    pub scent_trail: ScentTrail,
    /// Current budget snapshot.
    pub budget: BudgetSnapshot,
    /// Every receipt recorded so far, oldest first.
    pub receipts: Vec<Receipt>,
    /// Configuration captured at run start.
    pub config: RunConfig,
}

impl RunState {
    /// Returns the zero-value state a run begins folding from, before its
    /// `RunStarted` event has been applied.
    #[must_use]
    pub fn uninitialized(run_id: RunId) -> Self {
        Self {
            run_id,
            flow_id: FlowId::new(""),
            current_step: StepId::new(""),
            status: RunStatus::Pending,
            last_envelope: None,
            scent_trail: ScentTrail::new(8),
            budget: BudgetSnapshot {
                cap: StepCost::zero(),
                spent: StepCost::zero(),
            },
            receipts: Vec::new(),
            config: RunConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RunConfig;
    use super::RunState;
    use super::RunStatus;
    use crate::core::identifiers::RunId;

    #[test]
    fn uninitialized_state_is_pending() {
        let state = RunState::uninitialized(RunId::new("run-1"));
        assert!(matches!(state.status, RunStatus::Pending));
        assert!(!state.status.is_terminal());
    }

    #[test]
    fn terminal_statuses_report_terminal() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed("boom".to_string()).is_terminal());
        assert!(RunStatus::Aborted("stop".to_string()).is_terminal());
    }

    #[test]
    fn default_config_disallows_graph_extension() {
        assert!(!RunConfig::default().allow_extend_graph);
    }
}
