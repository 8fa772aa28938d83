// crates/kernel-core/src/core/routing.rs
// ============================================================================
// Module: Routing Data Model
// Description: Candidates proposed for the current step and the outcome chosen.
// Purpose: Give the routing driver's five-tier cascade a shared vocabulary.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! At each step the routing driver assembles a candidate set from the flow
//! graph's outgoing edges, the sidequest catalog, and (in the navigator tier)
//! an LLM-proposed detour. The navigator may choose only among the candidates
//! it was handed — this module's [`RoutingOutcome::chosen`] always refers back
//! to a [`CandidateId`] that appeared in the candidate set it was given.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::CandidateId;
use crate::core::identifiers::SidequestId;
use crate::core::identifiers::StepId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Candidates
// ============================================================================

/// What a routing candidate would do if chosen.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutingTarget {
    /// Advance to an existing node already present in the flow graph.
    ExistingStep {
        /// Destination step identifier.
        step_id: StepId,
    },
    /// Detour into a catalog sidequest before returning to the flow.
    Sidequest {
        /// Sidequest identifier drawn from the catalog.
        sidequest_id: SidequestId,
    },
    /// Propose a brand-new node not yet present in the flow graph.
    ///
    /// Only reachable when `allow_extend_graph` is enabled on the engine; see
    /// `kernel-routing`'s `EXTEND_GRAPH` proposal writer.
    NewNode {
        /// Proposed step identifier for the new node.
        proposed_step_id: StepId,
        /// Proposed agent/persona key for the new node.
        proposed_agent_key: String,
    },
}

/// A single candidate offered to the routing driver's navigator tier.
///
/// # Invariants
/// - `candidate_id` is unique within the candidate set it was generated in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingCandidate {
    /// Candidate identifier, unique within its candidate set.
    pub candidate_id: CandidateId,
    /// What choosing this candidate would do.
    pub target: RoutingTarget,
    /// Human-readable rationale surfaced to the navigator.
    pub rationale: String,
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Which tier of the routing cascade produced the outcome.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching, and are
///   ordered by the cascade's evaluation order (fast path first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingSource {
    /// A single unguarded or trivially-satisfied edge, taken without deliberation.
    FastPath,
    /// Guard conditions deterministically selected exactly one edge.
    Deterministic,
    /// An LLM-assisted navigator chose among multiple eligible candidates.
    Navigator,
    /// No candidate was eligible; the handoff envelope's own fallback applied.
    EnvelopeFallback,
    /// A deterministic stall rule matched a sidequest catalog entry and detoured to it.
    DetourCatalog,
    /// No tier could produce a candidate; the run escalates for intervention.
    Escalate,
}

/// The result of running the routing driver for one step.
///
/// # Invariants
/// - When `source` is not `Escalate`, `chosen` is `Some` and refers to a
///   [`CandidateId`] present in the candidate set evaluated for this outcome.
/// - When `source` is `Escalate`, `chosen` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingOutcome {
    /// Step the outcome was computed for.
    pub step_id: StepId,
    /// Which cascade tier produced this outcome.
    pub source: RoutingSource,
    /// The candidate chosen, or `None` when `source` is `Escalate`.
    pub chosen: Option<CandidateId>,
    /// Full candidate set considered, preserved for forensic replay.
    pub candidates: Vec<RoutingCandidate>,
}

impl RoutingOutcome {
    /// Returns `true` when `candidate_id` was a member of the candidate set
    /// this outcome was computed from.
    #[must_use]
    pub fn is_known_candidate(&self, candidate_id: &CandidateId) -> bool {
        self.candidates.iter().any(|candidate| &candidate.candidate_id == candidate_id)
    }

    /// Validates the candidate-set membership invariant: a non-escalating
    /// outcome's `chosen` candidate must appear in `candidates`.
    #[must_use]
    pub fn chosen_is_valid(&self) -> bool {
        match &self.chosen {
            Some(candidate_id) => self.is_known_candidate(candidate_id),
            None => matches!(self.source, RoutingSource::Escalate),
        }
    }
}

// ============================================================================
// SECTION: Decision Record
// ============================================================================

/// The action a routing outcome takes against the run.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Move forward to the next step along the chosen edge.
    Advance,
    /// Re-enter the current step's microloop for another iteration.
    Loop,
    /// Detour into a sidequest before resuming the flow.
    Detour,
    /// Splice a whole utility flow into the run.
    InjectFlow,
    /// Propose new nodes not yet present in the flow graph.
    InjectNodes,
    /// Reached a terminal step; the run is complete.
    Terminate,
    /// No tier could decide; the run awaits operator intervention.
    Escalate,
}

/// Confidence the cascade tier assigns to a routing outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    /// The tier is certain of the outcome (fast path, deterministic rule).
    High,
    /// The tier produced a reasonable but non-deterministic outcome.
    Medium,
    /// The tier had no good option and fell back.
    Low,
}

/// Iteration counters attached to a routing decision record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationCounters {
    /// Iterations spent at the current step so far.
    pub current: u32,
    /// Maximum iterations allowed before a deterministic exit is forced.
    pub max: u32,
}

/// One line of the routing decision log, matching the contract bundle's
/// `routing_decision_schema`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecisionRecord {
    /// Schema version this record was written under.
    pub schema_version: String,
    /// Timestamp the decision was made.
    pub ts: Timestamp,
    /// Run this decision belongs to.
    pub run_id: String,
    /// Flow key the run is executing.
    pub flow_key: String,
    /// Step the decision was computed for.
    pub step_id: String,
    /// The action this decision takes against the run.
    pub decision: Decision,
    /// Human-readable label for the chosen target.
    pub target: String,
    /// Rationale surfaced by the chosen candidate, or why none was chosen.
    pub reason: String,
    /// Hex digest of the forensic summary this decision was computed from.
    pub forensic_digest: String,
    /// Iteration counters at the current step.
    pub iteration: IterationCounters,
    /// Whether a sidequest trigger signature matched.
    pub signature_matched: bool,
    /// Confidence the producing tier assigns to this decision.
    pub confidence: Confidence,
    /// Which cascade tier produced this decision, as its wire name.
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::RoutingCandidate;
    use super::RoutingOutcome;
    use super::RoutingSource;
    use super::RoutingTarget;
    use crate::core::identifiers::CandidateId;
    use crate::core::identifiers::StepId;

    fn candidate(id: &str) -> RoutingCandidate {
        RoutingCandidate {
            candidate_id: CandidateId::new(id),
            target: RoutingTarget::ExistingStep {
                step_id: StepId::new("next"),
            },
            rationale: "edge is eligible".to_string(),
        }
    }

    #[test]
    fn chosen_must_be_a_member_of_candidates() {
        let outcome = RoutingOutcome {
            step_id: StepId::new("current"),
            source: RoutingSource::Navigator,
            chosen: Some(CandidateId::new("ghost")),
            candidates: vec![candidate("real")],
        };
        assert!(!outcome.chosen_is_valid());
    }

    #[test]
    fn escalate_outcome_has_no_chosen_candidate() {
        let outcome = RoutingOutcome {
            step_id: StepId::new("current"),
            source: RoutingSource::Escalate,
            chosen: None,
            candidates: vec![],
        };
        assert!(outcome.chosen_is_valid());
    }

    #[test]
    fn valid_choice_passes() {
        let outcome = RoutingOutcome {
            step_id: StepId::new("current"),
            source: RoutingSource::Deterministic,
            chosen: Some(CandidateId::new("real")),
            candidates: vec![candidate("real")],
        };
        assert!(outcome.chosen_is_valid());
    }
}
