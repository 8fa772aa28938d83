// crates/kernel-forensics/src/scanner.rs
// ============================================================================
// Module: Scanners
// Description: Concrete forensic scanners over diffs and test reports.
// Purpose: Turn a step's returned artifacts into a ForensicSummary the
//          routing driver's guards can evaluate.
// Dependencies: kernel_core, serde_json
// ============================================================================

//! ## Overview
//! Two scanners ship with the kernel: [`DiffScanner`] inspects a unified diff
//! and reports change-shape findings (files touched, lines added/removed);
//! [`TestParser`] inspects a structured test-run report. Both compile down to
//! the same [`ScanCheck`] evaluation so a flow author names one condition
//! vocabulary regardless of which scanner produced it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use kernel_core::core::ForensicSummary;
use kernel_core::core::ScanId;
use kernel_core::core::StepId;
use kernel_core::interfaces::ForensicScanner;
use kernel_core::interfaces::ScanError;
use kernel_logic::TriState;
use serde::Deserialize;

use crate::comparator::evaluate_comparator;
use crate::comparator::ScanCheck;
use crate::comparator::ScanFinding;
use crate::comparator::ScanValue;

// ============================================================================
// SECTION: Shared Evaluation
// ============================================================================

/// Structured diff statistics, shared between [`DiffScanner`] and the
/// forensic verdict comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffStats {
    /// Files touched by the diff.
    pub files_changed: i64,
    /// Lines added across the diff.
    pub lines_added: i64,
    /// Lines removed across the diff.
    pub lines_removed: i64,
}

/// Structured test-run statistics, shared between [`TestParser`] and the
/// forensic verdict comparator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestStats {
    /// Number of tests that passed.
    pub passed: u64,
    /// Number of tests that failed.
    pub failed: u64,
    /// Total tests collected.
    pub total: u64,
    /// Line coverage percentage, when the harness reports one.
    pub coverage_percent: Option<f64>,
}

impl From<&TestReport> for TestStats {
    fn from(report: &TestReport) -> Self {
        Self { passed: report.passed, failed: report.failed, total: report.total, coverage_percent: report.coverage_percent }
    }
}

/// A named set of raw findings, ready to be evaluated against [`ScanCheck`]s.
struct FindingSet(BTreeMap<String, ScanFinding>);

impl FindingSet {
    fn evaluate(&self, checks: &[ScanCheck]) -> BTreeMap<String, TriState> {
        checks
            .iter()
            .map(|check| {
                let finding = self.0.get(&check.condition_key).cloned().unwrap_or(ScanFinding { value: None });
                let outcome = evaluate_comparator(check.comparator, check.expected.as_ref(), &finding);
                (check.condition_key.clone(), outcome)
            })
            .collect()
    }
}

// ============================================================================
// SECTION: Diff Scanner
// ============================================================================

/// Scans a unified diff and evaluates change-shape conditions against it.
///
/// # Invariants
/// - Produces `no_progress = true` when the diff touches zero lines.
pub struct DiffScanner {
    /// Checks evaluated against the diff's findings.
    checks: Vec<ScanCheck>,
}

impl DiffScanner {
    /// Creates a diff scanner that evaluates `checks` against parsed diff stats.
    #[must_use]
    pub const fn new(checks: Vec<ScanCheck>) -> Self {
        Self { checks }
    }

    /// Parses unified-diff text into structured file/line statistics.
    #[must_use]
    pub fn parse_stats(diff_text: &str) -> DiffStats {
        let mut stats = DiffStats::default();

        for line in diff_text.lines() {
            if line.starts_with("+++ ") || line.starts_with("--- ") {
                continue;
            }
            if line.starts_with("diff --git ") {
                stats.files_changed += 1;
            } else if line.starts_with('+') {
                stats.lines_added += 1;
            } else if line.starts_with('-') {
                stats.lines_removed += 1;
            }
        }

        stats
    }

    /// Converts parsed diff statistics into findings ready for check evaluation.
    fn findings(stats: DiffStats) -> FindingSet {
        let mut findings = BTreeMap::new();
        findings.insert(
            "files_changed".to_string(),
            ScanFinding {
                value: Some(ScanValue::Json(serde_json::json!(stats.files_changed))),
            },
        );
        findings.insert(
            "lines_added".to_string(),
            ScanFinding {
                value: Some(ScanValue::Json(serde_json::json!(stats.lines_added))),
            },
        );
        findings.insert(
            "lines_removed".to_string(),
            ScanFinding {
                value: Some(ScanValue::Json(serde_json::json!(stats.lines_removed))),
            },
        );
        FindingSet(findings)
    }
}

impl ForensicScanner for DiffScanner {
    fn scan(&self, step_id: &StepId, artifact: &[u8]) -> Result<ForensicSummary, ScanError> {
        let diff_text = std::str::from_utf8(artifact).map_err(|err| ScanError::Unparseable(err.to_string()))?;
        let stats = Self::parse_stats(diff_text);
        let no_progress = stats.lines_added == 0 && stats.lines_removed == 0;
        Ok(ForensicSummary {
            scan_id: ScanId::new(format!("diff-{}", step_id.as_str())),
            step_id: step_id.clone(),
            conditions: Self::findings(stats).evaluate(&self.checks),
            no_progress,
        })
    }
}

// ============================================================================
// SECTION: Test Parser
// ============================================================================

/// A structured test-run report, as reported by a backend's test harness.
///
/// # Invariants
/// - `passed + failed <= total`; extra tests (skipped) are not represented here.
#[derive(Debug, Clone, Deserialize)]
pub struct TestReport {
    /// Number of tests that passed.
    pub passed: u64,
    /// Number of tests that failed.
    pub failed: u64,
    /// Total tests collected.
    pub total: u64,
    /// Line coverage percentage, when the harness reports one.
    pub coverage_percent: Option<f64>,
}

/// Scans a structured test-run report and evaluates test-outcome conditions against it.
pub struct TestParser {
    /// Checks evaluated against the report's findings.
    checks: Vec<ScanCheck>,
}

impl TestParser {
    /// Creates a test parser that evaluates `checks` against a parsed report.
    #[must_use]
    pub const fn new(checks: Vec<ScanCheck>) -> Self {
        Self { checks }
    }

    fn findings(report: &TestReport) -> FindingSet {
        let mut findings = BTreeMap::new();
        findings.insert(
            "tests_passed".to_string(),
            ScanFinding {
                value: Some(ScanValue::Json(serde_json::json!(report.failed == 0 && report.total > 0))),
            },
        );
        findings.insert(
            "tests_failed_count".to_string(),
            ScanFinding {
                value: Some(ScanValue::Json(serde_json::json!(report.failed))),
            },
        );
        if let Some(coverage) = report.coverage_percent {
            findings.insert(
                "coverage_percent".to_string(),
                ScanFinding {
                    value: Some(ScanValue::Json(serde_json::json!(coverage))),
                },
            );
        }
        FindingSet(findings)
    }
}

impl ForensicScanner for TestParser {
    fn scan(&self, step_id: &StepId, artifact: &[u8]) -> Result<ForensicSummary, ScanError> {
        let report: TestReport = serde_json::from_slice(artifact).map_err(|err| ScanError::Unparseable(err.to_string()))?;
        let findings = Self::findings(&report);
        Ok(ForensicSummary {
            scan_id: ScanId::new(format!("test-{}", step_id.as_str())),
            step_id: step_id.clone(),
            conditions: findings.evaluate(&self.checks),
            no_progress: report.total == 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use kernel_logic::TriState;

    use super::DiffScanner;
    use super::TestParser;
    use crate::comparator::Comparator;
    use crate::comparator::ScanCheck;
    use kernel_core::interfaces::ForensicScanner;
    use kernel_core::core::StepId;

    #[test]
    fn diff_scanner_reports_no_progress_on_an_empty_diff() {
        let scanner = DiffScanner::new(vec![]);
        let summary = scanner.scan(&StepId::new("s1"), b"").expect("scan");
        assert!(summary.no_progress);
    }

    #[test]
    fn diff_scanner_counts_added_and_removed_lines() {
        let diff = "diff --git a/x b/x\n--- a/x\n+++ b/x\n+new line\n-old line\n";
        let checks = vec![ScanCheck {
            condition_key: "lines_added".to_string(),
            comparator: Comparator::GreaterThan,
            expected: Some(serde_json::json!(0)),
        }];
        let scanner = DiffScanner::new(checks);
        let summary = scanner.scan(&StepId::new("s1"), diff.as_bytes()).expect("scan");
        assert_eq!(summary.condition("lines_added"), TriState::True);
        assert!(!summary.no_progress);
    }

    #[test]
    fn test_parser_marks_tests_passed_when_no_failures() {
        let report = serde_json::json!({"passed": 10, "failed": 0, "total": 10}).to_string();
        let checks = vec![ScanCheck {
            condition_key: "tests_passed".to_string(),
            comparator: Comparator::Equals,
            expected: Some(serde_json::json!(true)),
        }];
        let parser = TestParser::new(checks);
        let summary = parser.scan(&StepId::new("s1"), report.as_bytes()).expect("scan");
        assert_eq!(summary.condition("tests_passed"), TriState::True);
    }

    #[test]
    fn test_parser_rejects_unparseable_artifacts() {
        let parser = TestParser::new(vec![]);
        let err = parser.scan(&StepId::new("s1"), b"not json").expect_err("unparseable");
        assert!(matches!(err, kernel_core::interfaces::ScanError::Unparseable(_)));
    }
}
