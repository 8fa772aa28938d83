// crates/kernel-core/src/core/envelope.rs
// ============================================================================
// Module: Handoff Envelope
// Description: The structured report a transport backend returns once a
//              step's work is finalized.
// Purpose: Give the routing cascade and forensic verdicts a single, schema-
//          validated account of what a backend did, found, and recommends.
// Dependencies: crate::core::identifiers, crate::core::hashing, serde
// ============================================================================

//! ## Overview
//! A handoff envelope is produced once per step attempt, at the end of a
//! [`crate::interfaces::TransportPort::finalize`] call: the backend's own
//! account of what it did, what it found, and what it recommends happens
//! next. The engine stamps it with the identifiers and content hash that
//! matter for replay and persists it alongside the forensic scan of the same
//! attempt, so a [`crate::core::forensics::ForensicSummary`] and the claims in
//! an envelope can be compared for reward-hacking signals.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::CorrelationId;
use crate::core::identifiers::EnvelopeId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::StepId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Status
// ============================================================================

/// The backend's own claim about whether its work is done.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnvelopeStatus {
    /// The backend claims its work satisfies the step's guard conditions.
    Verified,
    /// The backend could not verify its own work.
    Unverified,
    /// The backend is blocked and cannot proceed without intervention.
    Blocked,
}

// ============================================================================
// SECTION: Meta
// ============================================================================

/// Identifying context every envelope carries, matching `envelope_schema`'s
/// required `meta` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    /// Step this envelope reports on.
    pub step_id: StepId,
    /// Flow key the run is executing.
    pub flow_key: String,
    /// Run this envelope belongs to.
    pub run_id: RunId,
    /// Caller-resolved agent/persona key that produced this envelope.
    pub agent_key: String,
}

// ============================================================================
// SECTION: Summary and Evidence
// ============================================================================

/// What the backend ran, measured, and produced in support of its claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Artifact paths or identifiers produced by this attempt.
    pub artifacts_produced: Vec<String>,
    /// Commands the backend ran to produce or verify its result.
    pub commands_run: Vec<String>,
    /// Free-form measurements (test counts, coverage, timings) the backend reports.
    pub measurements: serde_json::Value,
}

/// The backend's narrative account of the step attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeSummary {
    /// What the backend did during this attempt.
    pub what_i_did: String,
    /// What the backend found while doing it.
    pub what_i_found: String,
    /// Key decisions the backend made and why.
    pub key_decisions: Vec<String>,
    /// Supporting evidence for the claims above.
    pub evidence: Evidence,
}

// ============================================================================
// SECTION: Concerns and Assumptions
// ============================================================================

/// How seriously a concern should be weighed by the routing cascade or an
/// operator reviewing a blocked run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConcernSeverity {
    /// Blocks safe progress; should route to escalation or a fix step.
    High,
    /// Worth operator attention but not necessarily blocking.
    Medium,
    /// Informational; unlikely to change routing.
    Low,
}

/// A single concern the backend is raising about its own work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concern {
    /// How seriously this concern should be weighed.
    pub severity: ConcernSeverity,
    /// What the concern is.
    pub description: String,
    /// Where the concern applies (file, function, line range).
    pub location: String,
    /// What the backend recommends doing about it.
    pub recommendation: String,
}

/// An assumption the backend made while producing its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assumption {
    /// The assumption itself.
    pub assumption: String,
    /// Why the backend made it.
    pub why: String,
    /// What breaks if the assumption is wrong.
    pub impact_if_wrong: String,
}

// ============================================================================
// SECTION: File Changes and Routing
// ============================================================================

/// The files this attempt touched, and a free-form rollup of totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChanges {
    /// Paths touched by this attempt.
    pub files: Vec<String>,
    /// Free-form totals (lines added/removed, files touched) the backend reports.
    pub totals: serde_json::Value,
}

/// The backend's own recommendation for what should happen next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRecommendation {
    /// The backend's recommended next action, in its own words.
    pub recommendation: String,
    /// Why the backend recommends it.
    pub reason: String,
    /// A specific next step the backend suggests, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_suggestion: Option<StepId>,
    /// Whether the backend believes another microloop iteration would help.
    #[serde(default)]
    pub can_further_iteration_help: bool,
}

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// The structured report a backend returns when it finalizes a step attempt.
///
/// # Invariants
/// - `content_hash` is the canonical hash of the schema-governed fields
///   (`meta`, `status`, `summary`, `concerns`, `assumptions`, `file_changes`,
///   `routing`), computed once at `closed_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffEnvelope {
    /// Schema version this envelope was produced under.
    pub schema_version: String,
    /// Envelope identifier, assigned by the engine.
    pub envelope_id: EnvelopeId,
    /// Transport session this envelope was finalized on.
    pub session_id: SessionId,
    /// Correlation identifier threaded through events and receipts for this attempt.
    pub correlation_id: CorrelationId,
    /// Identifying context for this attempt.
    pub meta: EnvelopeMeta,
    /// The backend's own claim about whether its work is done.
    pub status: EnvelopeStatus,
    /// The backend's narrative account of the attempt.
    pub summary: EnvelopeSummary,
    /// Concerns the backend is raising about its own work.
    pub concerns: Vec<Concern>,
    /// Assumptions the backend made while producing its result.
    pub assumptions: Vec<Assumption>,
    /// Files touched by this attempt.
    pub file_changes: FileChanges,
    /// The backend's own recommendation for what happens next.
    pub routing: RoutingRecommendation,
    /// Canonical hash of the schema-governed fields above.
    pub content_hash: HashDigest,
    /// Timestamp the envelope was finalized.
    pub closed_at: Timestamp,
}

impl HandoffEnvelope {
    /// Returns `true` when the backend claims its work is verified.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        matches!(self.status, EnvelopeStatus::Verified)
    }
}
