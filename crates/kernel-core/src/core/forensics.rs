// crates/kernel-core/src/core/forensics.rs
// ============================================================================
// Module: Forensic Summary
// Description: The result of running forensic scanners over a step's output.
// Purpose: Feed guard-condition evaluation and stall detection with a shared,
//          replayable record of what a scan found.
// Dependencies: crate::core::identifiers, kernel_logic, serde
// ============================================================================

//! ## Overview
//! After a step's work is returned, forensic scanners (diff scanner, test
//! parser) inspect the result and produce condition outcomes. Those outcomes
//! are exactly the leaves a [`kernel_logic::Requirement`] guard evaluates.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use kernel_logic::TriState;
use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ScanId;
use crate::core::identifiers::StepId;

// ============================================================================
// SECTION: Forensic Summary
// ============================================================================

/// The result of running forensic scanners over a step's returned work.
///
/// # Invariants
/// - `conditions` maps every condition key referenced by the step's outgoing
///   guard edges to a tri-state outcome; absent keys evaluate as `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForensicSummary {
    /// Scan that produced this summary.
    pub scan_id: ScanId,
    /// Step the scan was run against.
    pub step_id: StepId,
    /// Tri-state outcome for every condition key the scan evaluated.
    pub conditions: BTreeMap<String, TriState>,
    /// `true` when the scan found no change relative to the prior attempt at this step.
    pub no_progress: bool,
}

impl ForensicSummary {
    /// Returns the tri-state outcome for `condition_key`, or `Unknown` if absent.
    #[must_use]
    pub fn condition(&self, condition_key: &str) -> TriState {
        self.conditions.get(condition_key).copied().unwrap_or(TriState::Unknown)
    }
}
