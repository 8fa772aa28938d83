// crates/kernel-core/src/core/summary.rs
// ============================================================================
// Module: Routing Block Summaries
// Description: Redacted, policy-safe summaries of why routing could not advance.
// Purpose: Let the orchestrator report escalations without leaking raw evidence.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! When the routing driver escalates instead of choosing a candidate, callers
//! need to know which guard conditions blocked every outgoing edge — without
//! being handed the raw evidence that produced that verdict, which may carry
//! sensitive diff or test content.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::StepId;

// ============================================================================
// SECTION: Blocked Summary
// ============================================================================

/// Safe summary returned when routing escalates instead of advancing.
///
/// # Invariants
/// - Contains only safe, redacted status data (no evidence payloads).
/// - Strings are opaque and not normalized by this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedSummary {
    /// Summary status string.
    pub status: String,
    /// Step identifiers whose outgoing edges were all blocked.
    pub blocked_steps: Vec<StepId>,
    /// Optional retry guidance.
    pub retry_hint: Option<String>,
    /// Optional policy tags for the summary.
    pub policy_tags: Vec<String>,
}

impl BlockedSummary {
    /// Creates a blocked summary with the provided status and blocked steps.
    #[must_use]
    pub fn new(status: impl Into<String>, blocked_steps: Vec<StepId>) -> Self {
        Self {
            status: status.into(),
            blocked_steps,
            retry_hint: None,
            policy_tags: Vec::new(),
        }
    }
}
