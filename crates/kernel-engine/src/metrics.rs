// crates/kernel-engine/src/metrics.rs
// ============================================================================
// Module: Engine Metrics
// Description: In-process counters for step and run throughput.
// Purpose: Let operators inspect engine activity without pulling in an
//          external telemetry stack.
// Dependencies: std::sync, std::time
// ============================================================================

//! ## Overview
//! [`EngineMetrics`] accumulates operation counts and cumulative wall-clock
//! time under interior mutability so a single instance can be shared across
//! an orchestrator's worker threads. [`EngineMetrics::snapshot`] produces a
//! plain, serializable [`EngineStats`] for logging or a status endpoint.

use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

/// Operation counts recorded by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineOpCounts {
    /// Number of step attempts started.
    pub steps_attempted: u64,
    /// Number of step attempts that closed with a `VERIFIED` result.
    pub steps_verified: u64,
    /// Number of step attempts that closed `UNVERIFIED` or `BLOCKED`.
    pub steps_rejected: u64,
    /// Number of microloop re-entries across all steps.
    pub microloop_iterations: u64,
    /// Number of routing decisions classified as `Detour`.
    pub detours_taken: u64,
    /// Number of runs that reached a terminal state.
    pub runs_completed: u64,
    /// Number of runs aborted by the budget or stall fuse.
    pub runs_aborted: u64,
}

/// A point-in-time snapshot of engine activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EngineStats {
    /// Cumulative operation counts.
    pub op_counts: EngineOpCounts,
    /// Cumulative microseconds spent inside step attempts.
    pub step_micros: u64,
    /// Cumulative microseconds spent inside routing decisions.
    pub routing_micros: u64,
}

/// Thread-safe accumulator for [`EngineStats`].
#[derive(Debug, Default)]
pub struct EngineMetrics {
    stats: Mutex<EngineStats>,
}

impl EngineMetrics {
    /// Builds an empty metrics accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current stats.
    #[must_use]
    #[allow(clippy::missing_panics_doc, reason = "poisoned mutex indicates a prior panic and is unrecoverable")]
    pub fn snapshot(&self) -> EngineStats {
        *self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Records a completed step attempt, started at `start`.
    pub fn record_step(&self, start: Instant, verified: bool) {
        self.update(|stats| {
            stats.op_counts.steps_attempted += 1;
            if verified {
                stats.op_counts.steps_verified += 1;
            } else {
                stats.op_counts.steps_rejected += 1;
            }
            stats.step_micros += micros_since(start);
        });
    }

    /// Records one microloop re-entry.
    pub fn record_microloop_iteration(&self) {
        self.update(|stats| stats.op_counts.microloop_iterations += 1);
    }

    /// Records a routing decision that took a detour, started at `start`.
    pub fn record_routing(&self, start: Instant, detour: bool) {
        self.update(|stats| {
            if detour {
                stats.op_counts.detours_taken += 1;
            }
            stats.routing_micros += micros_since(start);
        });
    }

    /// Records a run reaching `Completed`.
    pub fn record_run_completed(&self) {
        self.update(|stats| stats.op_counts.runs_completed += 1);
    }

    /// Records a run reaching `Aborted`.
    pub fn record_run_aborted(&self) {
        self.update(|stats| stats.op_counts.runs_aborted += 1);
    }

    #[allow(clippy::missing_panics_doc, reason = "poisoned mutex indicates a prior panic and is unrecoverable")]
    fn update(&self, update: impl FnOnce(&mut EngineStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        update(&mut stats);
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "elapsed microseconds since a recent Instant fit in u64 for any realistic step duration"
)]
fn micros_since(start: Instant) -> u64 {
    start.elapsed().as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_step_updates_verified_and_rejected_counts() {
        let metrics = EngineMetrics::new();
        metrics.record_step(Instant::now(), true);
        metrics.record_step(Instant::now(), false);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.op_counts.steps_attempted, 2);
        assert_eq!(snapshot.op_counts.steps_verified, 1);
        assert_eq!(snapshot.op_counts.steps_rejected, 1);
    }

    #[test]
    fn record_routing_tracks_detours_separately_from_total_calls() {
        let metrics = EngineMetrics::new();
        metrics.record_routing(Instant::now(), true);
        metrics.record_routing(Instant::now(), false);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.op_counts.detours_taken, 1);
    }
}
