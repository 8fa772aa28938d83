// crates/kernel-core/src/core/contextpack.rs
// ============================================================================
// Module: Context Pack
// Description: The bundle of context handed to a backend when a session opens.
// Purpose: Give a backend enough history to act without replaying the full run.
// Dependencies: crate::core::identifiers, crate::core::receipts, serde
// ============================================================================

//! ## Overview
//! Opening a transport session hands the backend a context pack rather than
//! the full run history: the step it is being asked to work on, a bounded
//! window of prior receipts, and a budget snapshot so the backend can reason
//! about how much room it has left.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::FlowId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::StepId;
use crate::core::receipts::Receipt;
use crate::core::receipts::StepCost;

// ============================================================================
// SECTION: Budget Snapshot
// ============================================================================

/// A point-in-time view of how much budget a run has left.
///
/// # Invariants
/// - `remaining` is `cap` minus the sum of every closed receipt's cost so far.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    /// The run's hard cost cap.
    pub cap: StepCost,
    /// Cost spent so far.
    pub spent: StepCost,
}

impl BudgetSnapshot {
    /// Returns the remaining USD budget, floored at zero.
    #[must_use]
    pub fn remaining_usd(&self) -> f64 {
        (self.cap.usd - self.spent.usd).max(0.0)
    }
}

// ============================================================================
// SECTION: Context Pack
// ============================================================================

/// The bundle of context a backend receives when a transport session opens.
///
/// # Invariants
/// - `recent_receipts` is bounded and ordered oldest-to-newest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPack {
    /// Run this context pack belongs to.
    pub run_id: RunId,
    /// Flow graph the run is executing.
    pub flow_id: FlowId,
    /// Step the backend is being asked to work on.
    pub step_id: StepId,
    /// Bounded window of the most recent receipts, oldest first.
    pub recent_receipts: Vec<Receipt>,
    /// Current budget snapshot.
    pub budget: BudgetSnapshot,
}
