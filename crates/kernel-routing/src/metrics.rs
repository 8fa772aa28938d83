// crates/kernel-routing/src/metrics.rs
// ============================================================================
// Module: Routing Metrics
// Description: In-process counters for routing decisions by classification.
// Purpose: Let operators inspect cascade behavior without pulling in an
//          external telemetry stack, matching kernel-engine's own metrics.
// Dependencies: std::sync, serde
// ============================================================================

//! ## Overview
//! [`RoutingMetrics`] tallies how often each [`crate::Decision`] classification
//! is reached, plus how many candidates the five-tier cascade considered
//! before settling on one. [`RoutingMetrics::snapshot`] produces a plain,
//! serializable [`RoutingStats`] for logging or a status endpoint.

use std::sync::Mutex;

use serde::Serialize;

use crate::decision::Decision;

/// Decision counts recorded by the routing cascade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecisionCounts {
    /// Number of decisions classified `Advance`.
    pub advance: u64,
    /// Number of decisions classified `Loop`.
    pub loop_: u64,
    /// Number of decisions classified `Detour`.
    pub detour: u64,
    /// Number of decisions classified `InjectFlow`.
    pub inject_flow: u64,
    /// Number of decisions classified `InjectNodes`.
    pub inject_nodes: u64,
    /// Number of decisions classified `Terminate`.
    pub terminate: u64,
    /// Number of decisions classified `Escalate`.
    pub escalate: u64,
}

/// A point-in-time snapshot of routing activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RoutingStats {
    /// Cumulative decision counts, keyed by classification.
    pub decisions: DecisionCounts,
    /// Cumulative candidates considered across every routed step.
    pub candidates_considered: u64,
    /// Number of times no tier found a chosen candidate.
    pub unresolved: u64,
}

/// Thread-safe accumulator for [`RoutingStats`].
#[derive(Debug, Default)]
pub struct RoutingMetrics {
    stats: Mutex<RoutingStats>,
}

impl RoutingMetrics {
    /// Builds an empty metrics accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current stats.
    #[must_use]
    #[allow(clippy::missing_panics_doc, reason = "poisoned mutex indicates a prior panic and is unrecoverable")]
    pub fn snapshot(&self) -> RoutingStats {
        *self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Records one routed step's decision and how many candidates the
    /// cascade considered before reaching it.
    #[allow(clippy::missing_panics_doc, reason = "poisoned mutex indicates a prior panic and is unrecoverable")]
    pub fn record_decision(&self, decision: Decision, candidates_considered: u64, resolved: bool) {
        let mut stats = self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match decision {
            Decision::Advance => stats.decisions.advance += 1,
            Decision::Loop => stats.decisions.loop_ += 1,
            Decision::Detour => stats.decisions.detour += 1,
            Decision::InjectFlow => stats.decisions.inject_flow += 1,
            Decision::InjectNodes => stats.decisions.inject_nodes += 1,
            Decision::Terminate => stats.decisions.terminate += 1,
            Decision::Escalate => stats.decisions.escalate += 1,
        }
        stats.candidates_considered += candidates_considered;
        if !resolved {
            stats.unresolved += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_decision_tallies_by_classification() {
        let metrics = RoutingMetrics::new();
        metrics.record_decision(Decision::Advance, 3, true);
        metrics.record_decision(Decision::Escalate, 0, false);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.decisions.advance, 1);
        assert_eq!(snapshot.decisions.escalate, 1);
        assert_eq!(snapshot.candidates_considered, 3);
        assert_eq!(snapshot.unresolved, 1);
    }

    #[test]
    fn record_decision_accumulates_across_multiple_calls() {
        let metrics = RoutingMetrics::new();
        metrics.record_decision(Decision::Loop, 2, true);
        metrics.record_decision(Decision::Loop, 1, true);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.decisions.loop_, 2);
        assert_eq!(snapshot.candidates_considered, 3);
        assert_eq!(snapshot.unresolved, 0);
    }
}
