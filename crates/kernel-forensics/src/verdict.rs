// crates/kernel-forensics/src/verdict.rs
// ============================================================================
// Module: Forensic Verdict
// Description: Compares a finalized envelope's claims against measured diff
//              and test reality and rules on whether to trust them.
// Purpose: Give the routing cascade a single, auditable signal for whether a
//          backend's self-report matches what the workspace actually shows.
// Dependencies: kernel_core
// ============================================================================

//! ## Overview
//! A backend narrates what it did; [`compare`] is the layer that refuses to
//! take the narration at face value. It lines up the envelope's file-change
//! and status claims against [`DiffStats`] and [`TestStats`] measured
//! independently by the scanners, and produces a [`ForensicVerdict`] the
//! routing cascade attaches to the step's record. A critical discrepancy —
//! the envelope claiming verification over a workspace that still fails
//! tests, or claiming files were touched that the diff never shows — forces
//! [`VerdictRecommendation::Reject`]. A softer reward-hacking pattern, such
//! as a shrinking test count or a claim of progress over an empty diff,
//! never clears [`VerdictRecommendation::Trust`] on its own.

// ============================================================================
// SECTION: Imports
// ============================================================================

use kernel_core::core::hash_bytes;
use kernel_core::core::hash_value;
use kernel_core::core::EnvelopeStatus;
use kernel_core::core::HandoffEnvelope;
use kernel_core::core::HashDigest;

use crate::scanner::DiffStats;
use crate::scanner::TestStats;

// ============================================================================
// SECTION: Verdict
// ============================================================================

/// The comparator's ruling on whether an envelope's claims match measured reality.
///
/// # Invariants
/// - Ordered from least to most trusting: `Reject` < `Verify` < `Trust`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VerdictRecommendation {
    /// A critical discrepancy was found; the claim should not be trusted.
    Reject,
    /// A reward-hacking pattern was found; an operator or critic should look.
    Verify,
    /// No discrepancy or reward-hacking pattern was found.
    Trust,
}

/// How seriously a discrepancy between claim and measurement should be weighed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscrepancySeverity {
    /// Forces the verdict to `Reject` outright.
    Critical,
    /// A reward-hacking pattern; caps the verdict at `Verify`.
    RewardHacking,
}

/// One mismatch found between the envelope's claims and measured reality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discrepancy {
    /// Stable tag naming the kind of mismatch, matching the flag vocabulary
    /// the routing cascade and operators are trained to recognize.
    pub flag: String,
    /// How seriously this discrepancy should be weighed.
    pub severity: DiscrepancySeverity,
    /// Human-readable detail.
    pub detail: String,
}

/// The comparator's full ruling on one step attempt's claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForensicVerdict {
    /// Whether the envelope's verification claim holds up against measurement.
    pub claim_verified: bool,
    /// Confidence in `claim_verified`, as a permille (0..=1000) to avoid
    /// float `Eq`/`Ord` friction while keeping two decimal digits of precision.
    pub confidence_permille: u16,
    /// Every mismatch found, regardless of severity.
    pub discrepancies: Vec<Discrepancy>,
    /// Tags of the discrepancies that specifically indicate reward hacking.
    pub reward_hacking_flags: Vec<String>,
    /// The comparator's overall recommendation.
    pub recommendation: VerdictRecommendation,
    /// Human-readable rollup of the verdict.
    pub summary: String,
    /// Canonical hashes of the evidence this verdict was computed from.
    pub evidence_hashes: Vec<HashDigest>,
}

// ============================================================================
// SECTION: Comparison
// ============================================================================

/// Compares `envelope`'s claims against `diff` and `test`, optionally against
/// `previous_test` to detect a shrinking test suite or a coverage regression.
#[must_use]
pub fn compare(envelope: &HandoffEnvelope, diff: &DiffStats, test: &TestStats, previous_test: Option<&TestStats>) -> ForensicVerdict {
    let mut discrepancies = Vec::new();

    if matches!(envelope.status, EnvelopeStatus::Verified) && test.failed > 0 {
        discrepancies.push(Discrepancy {
            flag: "claimed_verified_with_failures".to_string(),
            severity: DiscrepancySeverity::Critical,
            detail: format!("envelope claims VERIFIED but {} test(s) are failing", test.failed),
        });
    }

    let claims_tests_pass = envelope.summary.what_i_found.to_lowercase().contains("tests pass") || envelope.summary.what_i_found.to_lowercase().contains("all tests passing");
    if claims_tests_pass && test.failed > 0 {
        discrepancies.push(Discrepancy {
            flag: "claimed_pass_but_failed".to_string(),
            severity: DiscrepancySeverity::Critical,
            detail: format!("summary claims tests pass but {} are failing", test.failed),
        });
    }

    let claimed_files = i64::try_from(envelope.file_changes.files.len()).unwrap_or(i64::MAX);
    if claimed_files > 0 && diff.files_changed == 0 {
        discrepancies.push(Discrepancy {
            flag: "file_changes_mismatch".to_string(),
            severity: DiscrepancySeverity::Critical,
            detail: format!("envelope claims {claimed_files} file(s) changed but the diff touches none"),
        });
    }

    if claimed_files == 0 && !envelope.summary.what_i_did.is_empty() && diff.lines_added == 0 && diff.lines_removed == 0 {
        discrepancies.push(Discrepancy {
            flag: "claimed_progress_no_diff".to_string(),
            severity: DiscrepancySeverity::RewardHacking,
            detail: "envelope narrates work done but the diff is empty".to_string(),
        });
    }

    if let Some(previous) = previous_test {
        if test.total < previous.total {
            discrepancies.push(Discrepancy {
                flag: "test_count_decreased".to_string(),
                severity: DiscrepancySeverity::RewardHacking,
                detail: format!("test count dropped from {} to {}", previous.total, test.total),
            });
            discrepancies.push(Discrepancy {
                flag: "tests_deleted".to_string(),
                severity: DiscrepancySeverity::RewardHacking,
                detail: format!("{} test(s) disappeared between attempts", previous.total - test.total),
            });
        }
        if let (Some(before), Some(after)) = (previous.coverage_percent, test.coverage_percent) {
            if after < before {
                discrepancies.push(Discrepancy {
                    flag: "coverage_dropped".to_string(),
                    severity: DiscrepancySeverity::RewardHacking,
                    detail: format!("coverage dropped from {before:.1}% to {after:.1}%"),
                });
            }
        }
    }

    if matches!(envelope.status, EnvelopeStatus::Verified) && envelope.concerns.is_empty() && envelope.summary.evidence.commands_run.is_empty() {
        discrepancies.push(Discrepancy {
            flag: "unverified_claims_high_confidence".to_string(),
            severity: DiscrepancySeverity::RewardHacking,
            detail: "envelope claims VERIFIED with no commands run in evidence".to_string(),
        });
    }

    let reward_hacking_flags: Vec<String> =
        discrepancies.iter().filter(|discrepancy| matches!(discrepancy.severity, DiscrepancySeverity::RewardHacking)).map(|discrepancy| discrepancy.flag.clone()).collect();
    let has_critical = discrepancies.iter().any(|discrepancy| matches!(discrepancy.severity, DiscrepancySeverity::Critical));

    let recommendation = if has_critical {
        VerdictRecommendation::Reject
    } else if !reward_hacking_flags.is_empty() {
        VerdictRecommendation::Verify
    } else {
        VerdictRecommendation::Trust
    };

    let claim_verified = matches!(envelope.status, EnvelopeStatus::Verified) && !has_critical;
    let confidence_permille = confidence(discrepancies.len(), has_critical);
    let summary = summarize(&discrepancies, recommendation);
    let evidence_hashes = vec![
        hash_value(&serde_json::json!({"files_changed": diff.files_changed, "lines_added": diff.lines_added, "lines_removed": diff.lines_removed}))
            .unwrap_or_else(|_| hash_bytes(b"")),
        hash_value(&serde_json::json!({"passed": test.passed, "failed": test.failed, "total": test.total, "coverage_percent": test.coverage_percent}))
            .unwrap_or_else(|_| hash_bytes(b"")),
    ];

    ForensicVerdict { claim_verified, confidence_permille, discrepancies, reward_hacking_flags, recommendation, summary, evidence_hashes }
}

/// Starts confidence at full and deducts per discrepancy, more for critical ones.
fn confidence(discrepancy_count: usize, has_critical: bool) -> u16 {
    let base: i32 = if has_critical { 400 } else { 1000 };
    let penalty = i32::try_from(discrepancy_count).unwrap_or(i32::MAX).saturating_mul(100);
    u16::try_from((base - penalty).max(0)).unwrap_or(0)
}

/// Builds the verdict's human-readable rollup.
fn summarize(discrepancies: &[Discrepancy], recommendation: VerdictRecommendation) -> String {
    if discrepancies.is_empty() {
        return "no discrepancies found between the envelope's claims and measured reality".to_string();
    }
    let flags: Vec<&str> = discrepancies.iter().map(|discrepancy| discrepancy.flag.as_str()).collect();
    format!("{recommendation:?} — {}", flags.join(", "))
}

#[cfg(test)]
mod tests {
    use kernel_core::core::Assumption;
    use kernel_core::core::Concern;
    use kernel_core::core::CorrelationId;
    use kernel_core::core::EnvelopeId;
    use kernel_core::core::EnvelopeMeta;
    use kernel_core::core::EnvelopeSummary;
    use kernel_core::core::Evidence;
    use kernel_core::core::FileChanges;
    use kernel_core::core::RoutingRecommendation;
    use kernel_core::core::RunId;
    use kernel_core::core::SessionId;
    use kernel_core::core::StepId;
    use kernel_core::core::Timestamp;
    use kernel_core::core::hash_bytes;

    use super::*;

    fn envelope(status: EnvelopeStatus, files: Vec<String>, what_i_found: &str) -> HandoffEnvelope {
        HandoffEnvelope {
            schema_version: "1.0.0".to_string(),
            envelope_id: EnvelopeId::new("env-1"),
            session_id: SessionId::new("sess-1"),
            correlation_id: CorrelationId::new("corr-1"),
            meta: EnvelopeMeta { step_id: StepId::new("step-1"), flow_key: "flow-1".to_string(), run_id: RunId::new("run-1"), agent_key: "builder".to_string() },
            status,
            summary: EnvelopeSummary {
                what_i_did: "fixed the bug".to_string(),
                what_i_found: what_i_found.to_string(),
                key_decisions: vec![],
                evidence: Evidence { artifacts_produced: vec![], commands_run: vec!["cargo test".to_string()], measurements: serde_json::json!({}) },
            },
            concerns: Vec::<Concern>::new(),
            assumptions: Vec::<Assumption>::new(),
            file_changes: FileChanges { files, totals: serde_json::json!({}) },
            routing: RoutingRecommendation { recommendation: "advance".to_string(), reason: "done".to_string(), next_step_suggestion: None, can_further_iteration_help: false },
            content_hash: hash_bytes(b"x"),
            closed_at: Timestamp::UnixMillis(0),
        }
    }

    fn diff(files_changed: i64, lines_added: i64, lines_removed: i64) -> DiffStats {
        DiffStats { files_changed, lines_added, lines_removed }
    }

    fn test(passed: u64, failed: u64, total: u64, coverage_percent: Option<f64>) -> TestStats {
        TestStats { passed, failed, total, coverage_percent }
    }

    #[test]
    fn a_clean_match_between_claim_and_measurement_is_trusted() {
        let envelope = envelope(EnvelopeStatus::Verified, vec!["src/lib.rs".to_string()], "all good");
        let verdict = compare(&envelope, &diff(1, 10, 2), &test(5, 0, 5, None), None);
        assert_eq!(verdict.recommendation, VerdictRecommendation::Trust);
        assert!(verdict.claim_verified);
        assert!(verdict.discrepancies.is_empty());
    }

    #[test]
    fn a_verified_claim_over_failing_tests_is_rejected() {
        let envelope = envelope(EnvelopeStatus::Verified, vec!["src/lib.rs".to_string()], "done");
        let verdict = compare(&envelope, &diff(1, 10, 2), &test(4, 1, 5, None), None);
        assert_eq!(verdict.recommendation, VerdictRecommendation::Reject);
        assert!(!verdict.claim_verified);
        assert!(verdict.discrepancies.iter().any(|discrepancy| discrepancy.flag == "claimed_verified_with_failures"));
    }

    #[test]
    fn a_shrinking_test_suite_is_verify_not_trust() {
        let envelope = envelope(EnvelopeStatus::Verified, vec!["src/lib.rs".to_string()], "done");
        let verdict = compare(&envelope, &diff(1, 10, 2), &test(4, 0, 4, None), Some(&test(5, 0, 5, None)));
        assert_eq!(verdict.recommendation, VerdictRecommendation::Verify);
        assert!(verdict.reward_hacking_flags.contains(&"test_count_decreased".to_string()));
        assert!(verdict.reward_hacking_flags.contains(&"tests_deleted".to_string()));
    }

    #[test]
    fn claimed_file_changes_with_an_empty_diff_is_rejected() {
        let envelope = envelope(EnvelopeStatus::Verified, vec!["src/lib.rs".to_string()], "done");
        let verdict = compare(&envelope, &diff(0, 0, 0), &test(5, 0, 5, None), None);
        assert_eq!(verdict.recommendation, VerdictRecommendation::Reject);
        assert!(verdict.discrepancies.iter().any(|discrepancy| discrepancy.flag == "file_changes_mismatch"));
    }
}
