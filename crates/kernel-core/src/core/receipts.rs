// crates/kernel-core/src/core/receipts.rs
// ============================================================================
// Module: Receipts
// Description: The durable record left behind when a step closes.
// Purpose: Give the orchestrator, budget tracker, and forensic replay a
//          single record of what a step cost and how it ended.
// Dependencies: crate::core::identifiers, crate::core::hashing, serde
// ============================================================================

//! ## Overview
//! A receipt is written exactly once per step attempt, at close. It is the
//! join point between cost accounting (dollars and tokens spent), forensic
//! evidence (what changed), and the run's event log (what happened, in order).

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::CorrelationId;
use crate::core::identifiers::EnvelopeId;
use crate::core::identifiers::ReceiptId;
use crate::core::identifiers::ScanId;
use crate::core::identifiers::StepId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// How a step attempt ended.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReceiptOutcome {
    /// The step completed and its work was accepted.
    Success,
    /// The step's work was rejected by a forensic scan or guard condition.
    Rejected {
        /// Human-readable rejection reason.
        reason: String,
    },
    /// The backend or engine reported a failure for this attempt.
    Failed {
        /// Human-readable failure reason.
        reason: String,
    },
}

// ============================================================================
// SECTION: Cost
// ============================================================================

/// Cost accrued by a single step attempt.
///
/// # Invariants
/// - All fields are non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepCost {
    /// Dollars spent, in USD.
    pub usd: f64,
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens produced.
    pub output_tokens: u64,
}

impl StepCost {
    /// The zero cost value.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            usd: 0.0,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    /// Adds two costs component-wise.
    #[must_use]
    pub fn add(self, other: Self) -> Self {
        Self {
            usd: self.usd + other.usd,
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
        }
    }
}

// ============================================================================
// SECTION: Receipt
// ============================================================================

/// The durable record left behind when a step closes.
///
/// # Invariants
/// - Written exactly once per step attempt.
/// - `artifact_hash` is the canonical hash of whatever artifacts the step produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    /// Receipt identifier.
    pub receipt_id: ReceiptId,
    /// Step this receipt closes out.
    pub step_id: StepId,
    /// Envelope this receipt corresponds to.
    pub envelope_id: EnvelopeId,
    /// Correlation identifier shared with the envelope and any scans.
    pub correlation_id: CorrelationId,
    /// Forensic scan performed for this attempt, if any.
    pub scan_id: Option<ScanId>,
    /// How the attempt ended.
    pub outcome: ReceiptOutcome,
    /// Cost accrued by this attempt.
    pub cost: StepCost,
    /// Canonical hash of artifacts produced by this attempt.
    pub artifact_hash: HashDigest,
    /// Timestamp the receipt was written.
    pub closed_at: Timestamp,
}

impl Receipt {
    /// Returns `true` when the receipt represents a successful attempt.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.outcome, ReceiptOutcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::StepCost;

    #[test]
    fn cost_addition_is_component_wise() {
        let a = StepCost {
            usd: 1.5,
            input_tokens: 100,
            output_tokens: 50,
        };
        let b = StepCost {
            usd: 0.5,
            input_tokens: 10,
            output_tokens: 5,
        };
        let sum = a.add(b);
        assert!((sum.usd - 2.0).abs() < f64::EPSILON);
        assert_eq!(sum.input_tokens, 110);
        assert_eq!(sum.output_tokens, 55);
    }

    #[test]
    fn zero_is_identity_for_add() {
        let a = StepCost {
            usd: 3.25,
            input_tokens: 7,
            output_tokens: 2,
        };
        assert_eq!(a.add(StepCost::zero()).usd, a.usd);
    }
}
