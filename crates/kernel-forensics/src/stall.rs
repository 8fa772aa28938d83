// crates/kernel-forensics/src/stall.rs
// ============================================================================
// Module: Stall Analysis
// Description: Turns a run's scent trail into a stall/progress verdict.
// Purpose: Let the orchestrator decide whether to keep retrying a step or
//          escalate because no forward progress is being made.
// Dependencies: kernel_core
// ============================================================================

//! ## Overview
//! A scent trail only records breadcrumbs; deciding what they mean is this
//! module's job. [`analyze`] compares the newest breadcrumb's measured shape
//! against the last time the run visited the same step and computes a
//! [`ProgressDelta`], then derives a [`StallAnalysis`] flagging the specific
//! way (if any) the run has stopped moving forward: no files touched, the
//! same tests still failing, a delta that nets to zero across the board, or
//! heavy line churn that left test failures untouched — the high-churn,
//! low-progress shape a run chasing the wrong fix tends to produce.

// ============================================================================
// SECTION: Imports
// ============================================================================

use kernel_core::core::ScentEntry;
use kernel_core::core::ScentTrail;

/// Line churn, in lines added plus removed, above which a flat test-failure
/// count is treated as high churn with low progress rather than ordinary
/// incremental work.
const HIGH_CHURN_LINES: i64 = 200;

// ============================================================================
// SECTION: Progress Delta
// ============================================================================

/// The measured difference between the newest breadcrumb and the run's prior
/// visit to the same step.
///
/// # Invariants
/// - All fields are zero when the step has no prior visit in the trail; a
///   first visit is always forward progress by definition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressDelta {
    /// Change in files touched since the prior visit.
    pub files_delta: i64,
    /// Change in lines added plus lines removed since the prior visit.
    pub lines_delta: i64,
    /// Change in tests still failing since the prior visit (negative is improvement).
    pub test_fail_delta: i64,
    /// Change in coverage percentage since the prior visit, when both visits reported one.
    pub coverage_delta: Option<f64>,
}

impl ProgressDelta {
    /// A delta with no prior visit to compare against: always forward progress.
    const NONE: Self = Self { files_delta: 0, lines_delta: 0, test_fail_delta: 0, coverage_delta: None };
}

/// The result of analyzing a run's scent trail for stalls.
///
/// # Invariants
/// - `is_stalled` is `true` exactly when at least one of the four flags is set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StallAnalysis {
    /// The measured change between this visit and the prior one at the same step.
    pub delta: ProgressDelta,
    /// The latest attempt touched no files at all.
    pub no_file_changes: bool,
    /// The same number of tests are failing as on the prior visit, and at least one is.
    pub same_test_failures: bool,
    /// Files, lines, and test-failure count are all unchanged from the prior visit.
    pub zero_progress_delta: bool,
    /// Heavy line churn occurred while the test-failure count did not improve.
    pub high_churn_low_progress: bool,
    /// Whether the run should be treated as stalled.
    pub is_stalled: bool,
}

/// Analyzes `trail` against `latest`, without mutating `trail`.
///
/// Looks up the trail's most recent breadcrumb at `latest`'s step and
/// compares measured shape: files touched, line churn, failing test count,
/// and coverage. A step visited for the first time is always forward
/// progress, since there is nothing yet to repeat.
#[must_use]
pub fn analyze(trail: &ScentTrail, latest: &ScentEntry) -> StallAnalysis {
    let Some(previous) = trail.most_recent_for(&latest.step_id) else {
        return StallAnalysis {
            delta: ProgressDelta::NONE,
            no_file_changes: false,
            same_test_failures: false,
            zero_progress_delta: false,
            high_churn_low_progress: false,
            is_stalled: false,
        };
    };

    let delta = ProgressDelta {
        files_delta: latest.files_changed - previous.files_changed,
        lines_delta: (latest.lines_added + latest.lines_removed) - (previous.lines_added + previous.lines_removed),
        test_fail_delta: i64::try_from(latest.tests_failed).unwrap_or(i64::MAX) - i64::try_from(previous.tests_failed).unwrap_or(i64::MAX),
        coverage_delta: previous.coverage_percent.zip(latest.coverage_percent).map(|(before, after)| after - before),
    };

    let no_file_changes = latest.files_changed == 0;
    let same_test_failures = latest.tests_failed > 0 && latest.tests_failed == previous.tests_failed;
    let zero_progress_delta = delta.files_delta == 0 && delta.lines_delta == 0 && delta.test_fail_delta == 0;
    let churn = latest.lines_added + latest.lines_removed;
    let high_churn_low_progress = churn >= HIGH_CHURN_LINES && delta.test_fail_delta >= 0;

    StallAnalysis {
        delta,
        no_file_changes,
        same_test_failures,
        zero_progress_delta,
        high_churn_low_progress,
        is_stalled: no_file_changes || same_test_failures || zero_progress_delta || high_churn_low_progress,
    }
}

#[cfg(test)]
mod tests {
    use super::analyze;
    use kernel_core::core::hash_bytes;
    use kernel_core::core::ScentEntry;
    use kernel_core::core::ScentTrail;
    use kernel_core::core::StepId;

    #[allow(clippy::too_many_arguments, reason = "test fixture builder, not production surface")]
    fn entry(step: &str, files_changed: i64, lines_added: i64, lines_removed: i64, tests_failed: u64, coverage_percent: Option<f64>) -> ScentEntry {
        ScentEntry {
            step_id: StepId::new(step),
            summary_hash: hash_bytes(step.as_bytes()),
            files_changed,
            lines_added,
            lines_removed,
            tests_failed,
            coverage_percent,
        }
    }

    #[test]
    fn a_steps_first_visit_is_never_stalled() {
        let trail = ScentTrail::new(4);
        let analysis = analyze(&trail, &entry("a", 0, 0, 0, 3, None));
        assert!(!analysis.is_stalled);
        assert!(!analysis.no_file_changes);
    }

    #[test]
    fn no_files_touched_on_a_repeat_visit_is_stalled() {
        let mut trail = ScentTrail::new(4);
        trail.push(entry("a", 2, 10, 4, 1, None));
        let analysis = analyze(&trail, &entry("a", 0, 0, 0, 1, None));
        assert!(analysis.no_file_changes);
        assert!(analysis.is_stalled);
    }

    #[test]
    fn the_same_failing_tests_twice_in_a_row_is_stalled() {
        let mut trail = ScentTrail::new(4);
        trail.push(entry("a", 1, 5, 0, 2, None));
        let analysis = analyze(&trail, &entry("a", 1, 3, 0, 2, None));
        assert!(analysis.same_test_failures);
        assert!(analysis.is_stalled);
    }

    #[test]
    fn a_flat_delta_across_every_dimension_is_zero_progress() {
        let mut trail = ScentTrail::new(4);
        trail.push(entry("a", 1, 5, 5, 0, Some(80.0)));
        let analysis = analyze(&trail, &entry("a", 1, 5, 5, 0, Some(80.0)));
        assert!(analysis.zero_progress_delta);
        assert_eq!(analysis.delta.files_delta, 0);
        assert_eq!(analysis.delta.lines_delta, 0);
        assert_eq!(analysis.delta.test_fail_delta, 0);
        assert_eq!(analysis.delta.coverage_delta, Some(0.0));
        assert!(analysis.is_stalled);
    }

    #[test]
    fn heavy_churn_with_no_test_improvement_is_high_churn_low_progress() {
        let mut trail = ScentTrail::new(4);
        trail.push(entry("a", 3, 50, 50, 5, None));
        let analysis = analyze(&trail, &entry("a", 6, 150, 150, 5, None));
        assert!(analysis.high_churn_low_progress);
        assert!(analysis.is_stalled);
    }

    #[test]
    fn real_forward_progress_is_not_stalled() {
        let mut trail = ScentTrail::new(4);
        trail.push(entry("a", 2, 20, 4, 3, None));
        let analysis = analyze(&trail, &entry("a", 3, 40, 8, 1, None));
        assert_eq!(analysis.delta.test_fail_delta, -2);
        assert!(!analysis.is_stalled);
    }
}
