// crates/kernel-routing/src/cascade.rs
// ============================================================================
// Module: Routing Cascade
// Description: The five-tier driver that turns a step's forensic summary
//              into a routing outcome.
// Purpose: Prefer cheap, deterministic answers and only reach for an
//          LLM-assisted navigator when the graph genuinely leaves a choice.
// Dependencies: kernel-core, kernel-forensics, kernel-logic
// ============================================================================

//! ## Overview
//! Each step closes by calling [`route`], which tries five tiers in order
//! and stops at the first that produces an outcome:
//!
//! 1. **Fast path** — exactly one graph edge is eligible and the run is not
//!    stalled; take it without deliberation.
//! 2. **Deterministic** — the microloop iteration budget is exhausted (force
//!    the non-self edge) or the run is stalled (detour to a matching
//!    sidequest, or escalate if none matches).
//! 3. **Navigator** — more than one edge is eligible; ask a bounded,
//!    retried navigator to choose among the candidate set it is handed. The
//!    navigator may never return a candidate it was not offered.
//! 4. **Envelope fallback** — the navigator is unavailable or exhausted its
//!    retries; fall back to the step's own handoff envelope's suggested
//!    next step, if one was offered.
//! 5. **Escalate** — no tier produced an outcome; the run blocks for
//!    operator intervention.

use kernel_core::core::CandidateId;
use kernel_core::core::ForensicSummary;
use kernel_core::core::FlowGraph;
use kernel_core::core::RoutingCandidate;
use kernel_core::core::RoutingOutcome;
use kernel_core::core::RoutingSource;
use kernel_core::core::RoutingTarget;
use kernel_core::core::ScentEntry;
use kernel_core::core::ScentTrail;
use kernel_core::core::StepId;
use kernel_forensics::stall;

use crate::candidates::build_candidate_set;
use crate::candidates::PrioritizedCandidate;
use crate::sidequest::SidequestCatalog;

/// How much authority the cascade's navigator tier is granted.
///
/// # Invariants
/// - Variants are stable for serialization and configuration parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    /// Never consult the navigator; unresolved choices escalate directly.
    DeterministicOnly,
    /// Consult the navigator, but it may only choose among existing steps
    /// and sidequests — never propose a brand-new node.
    Assist,
    /// Consult the navigator with full authority, including proposing new
    /// nodes when the run's configuration allows graph extension.
    Authoritative,
}

/// How many iterations the current step has spent, and its configured cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationState {
    /// Iterations already spent at the current step.
    pub current: u32,
    /// Maximum iterations allowed before a deterministic exit is forced.
    pub max: u32,
}

impl IterationState {
    /// Returns `true` once the step has exhausted its iteration budget.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.current >= self.max
    }
}

/// Errors a navigator implementation may report.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum NavigatorError {
    /// The navigator could not be reached; the caller may retry.
    #[error("navigator unavailable: {0}")]
    Unavailable(String),
    /// The navigator responded but its choice could not be used.
    #[error("navigator returned an invalid choice: {0}")]
    Invalid(String),
}

/// An LLM-assisted chooser consulted by the cascade's navigator tier.
///
/// Implementations must only ever return a [`CandidateId`] present in the
/// `candidates` slice they were handed; [`route`] validates this regardless.
pub trait Navigator {
    /// Chooses one candidate from `candidates` given the current forensic summary.
    ///
    /// # Errors
    ///
    /// Returns [`NavigatorError`] when the navigator is unreachable or its
    /// response cannot be used.
    fn choose(&self, step_id: &StepId, forensic: &ForensicSummary, candidates: &[RoutingCandidate]) -> Result<CandidateId, NavigatorError>;
}

/// Maximum number of times the navigator tier retries a transient failure.
const NAVIGATOR_MAX_ATTEMPTS: u32 = 3;

/// Inputs shared by every tier of the cascade.
pub struct RouteRequest<'a> {
    /// The flow graph the run is executing.
    pub flow: &'a FlowGraph,
    /// The step the outcome is being computed for.
    pub current_step: &'a StepId,
    /// The forensic summary produced for the step's latest attempt.
    pub forensic: &'a ForensicSummary,
    /// The run's scent trail, used for stall detection.
    pub scent_trail: &'a ScentTrail,
    /// The breadcrumb the current attempt would leave, used to test for a stall.
    pub latest_scent: &'a ScentEntry,
    /// Iteration counters for the current step.
    pub iteration: IterationState,
    /// How much authority the navigator tier is granted.
    pub mode: RoutingMode,
    /// Sidequest catalog consulted when the run is stalled.
    pub catalog: &'a SidequestCatalog,
    /// Error signature of the latest attempt, if any, used to match sidequests.
    pub error_signature: Option<&'a str>,
    /// Whether the run's configuration allows proposing brand-new flow nodes.
    pub allow_extend_graph: bool,
    /// The handoff envelope's own suggested next step, consulted at tier 4.
    pub envelope_fallback: Option<&'a StepId>,
}

/// Runs the five-tier cascade and returns the resulting outcome.
///
/// `navigator` is consulted only at tier 3, only when `mode` permits it, and
/// only when more than one candidate remains eligible.
#[must_use]
pub fn route(request: &RouteRequest<'_>, navigator: Option<&dyn Navigator>) -> RoutingOutcome {
    let stalled = stall::analyze(request.scent_trail, request.latest_scent).is_stalled;

    let mut candidates = build_candidate_set(request.flow, request.current_step, request.forensic, request.catalog, request.error_signature);
    let new_nodes_allowed = request.allow_extend_graph && matches!(request.mode, RoutingMode::Authoritative);
    if !new_nodes_allowed {
        candidates.retain(|candidate| !matches!(candidate.candidate.target, RoutingTarget::NewNode { .. }));
    }

    let edge_candidates: Vec<&PrioritizedCandidate> =
        candidates.iter().filter(|candidate| !matches!(candidate.candidate.target, RoutingTarget::Sidequest { .. })).collect();

    // Tier 1: exactly one eligible edge, no deliberation needed. This beats
    // every other tier outright, including a stalled trail or an exhausted
    // iteration budget, because a single edge leaves nothing to deliberate.
    if edge_candidates.len() == 1 {
        return outcome(
            request.current_step,
            RoutingSource::FastPath,
            Some(edge_candidates[0].candidate.candidate_id.clone()),
            all_candidates(&candidates),
        );
    }

    // Tier 2: iteration budget exhausted forces a deterministic exit along
    // whichever non-self edge remains, regardless of stall state.
    if request.iteration.is_exhausted() {
        if let Some(exit) = edge_candidates.iter().find(|candidate| !is_self_edge(candidate, request.current_step)) {
            return outcome(request.current_step, RoutingSource::Deterministic, Some(exit.candidate.candidate_id.clone()), all_candidates(&candidates));
        }
        return outcome(request.current_step, RoutingSource::Escalate, None, all_candidates(&candidates));
    }

    // Tier 2: a stalled run detours to a matching sidequest or escalates outright.
    if stalled {
        return match candidates.iter().find(|candidate| matches!(candidate.candidate.target, RoutingTarget::Sidequest { .. })) {
            Some(detour) => {
                outcome(request.current_step, RoutingSource::DetourCatalog, Some(detour.candidate.candidate_id.clone()), all_candidates(&candidates))
            }
            None => outcome(request.current_step, RoutingSource::Escalate, None, all_candidates(&candidates)),
        };
    }

    if edge_candidates.is_empty() {
        return match request.envelope_fallback {
            Some(step_id) => outcome_with_synthetic_fallback(request.current_step, step_id, &candidates),
            None => outcome(request.current_step, RoutingSource::Escalate, None, all_candidates(&candidates)),
        };
    }

    // Tier 3: more than one edge is eligible; ask the navigator to choose.
    if !matches!(request.mode, RoutingMode::DeterministicOnly)
        && let Some(navigator) = navigator
    {
        let raw_candidates: Vec<RoutingCandidate> = candidates.iter().map(|candidate| candidate.candidate.clone()).collect();
        for _ in 0..NAVIGATOR_MAX_ATTEMPTS {
            match navigator.choose(request.current_step, request.forensic, &raw_candidates) {
                Ok(choice) if raw_candidates.iter().any(|candidate| candidate.candidate_id == choice) => {
                    return outcome(request.current_step, RoutingSource::Navigator, Some(choice), all_candidates(&candidates));
                }
                Ok(_) | Err(NavigatorError::Invalid(_)) => break,
                Err(NavigatorError::Unavailable(_)) => continue,
            }
        }
    }

    // Tier 4: fall back to the handoff envelope's own suggestion.
    if let Some(step_id) = request.envelope_fallback {
        return outcome_with_synthetic_fallback(request.current_step, step_id, &candidates);
    }

    // Tier 5: nothing produced an outcome.
    outcome(request.current_step, RoutingSource::Escalate, None, all_candidates(&candidates))
}

fn is_self_edge(candidate: &PrioritizedCandidate, current_step: &StepId) -> bool {
    matches!(&candidate.candidate.target, RoutingTarget::ExistingStep { step_id } if step_id == current_step)
}

fn all_candidates(candidates: &[PrioritizedCandidate]) -> Vec<RoutingCandidate> {
    candidates.iter().map(|candidate| candidate.candidate.clone()).collect()
}

fn outcome(step_id: &StepId, source: RoutingSource, chosen: Option<CandidateId>, candidates: Vec<RoutingCandidate>) -> RoutingOutcome {
    RoutingOutcome { step_id: step_id.clone(), source, chosen, candidates }
}

/// Builds an envelope-fallback outcome whose single candidate is synthesized
/// from the envelope's suggested step, since that suggestion was never part
/// of the graph-derived candidate set.
fn outcome_with_synthetic_fallback(current_step: &StepId, fallback_step: &StepId, candidates: &[PrioritizedCandidate]) -> RoutingOutcome {
    let fallback = RoutingCandidate {
        candidate_id: CandidateId::new(format!("envelope-fallback-{fallback_step}")),
        target: RoutingTarget::ExistingStep { step_id: fallback_step.clone() },
        rationale: "handoff envelope suggested this step when no other candidate was eligible".to_string(),
    };
    let mut all = all_candidates(candidates);
    all.push(fallback.clone());
    outcome(current_step, RoutingSource::EnvelopeFallback, Some(fallback.candidate_id), all)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use kernel_core::core::FlowEdge;
    use kernel_core::core::FlowNode;
    use kernel_core::core::ScanId;
    use kernel_core::core::StepKind;
    use kernel_core::core::hash_bytes;

    use super::*;

    fn flow_with_two_edges() -> FlowGraph {
        let nodes = vec![
            FlowNode { step_id: StepId::new("a"), agent_key: "builder".to_string(), kind: StepKind::Work, microloop_max_iterations: None },
            FlowNode { step_id: StepId::new("b"), agent_key: "builder".to_string(), kind: StepKind::Work, microloop_max_iterations: None },
            FlowNode { step_id: StepId::new("c"), agent_key: "builder".to_string(), kind: StepKind::Terminal, microloop_max_iterations: None },
        ];
        let edges = vec![
            FlowEdge { from: StepId::new("a"), to: StepId::new("b"), guard: None },
            FlowEdge { from: StepId::new("a"), to: StepId::new("c"), guard: None },
        ];
        FlowGraph::new(StepId::new("a"), nodes, edges).expect("valid graph")
    }

    fn flow_with_one_edge() -> FlowGraph {
        let nodes = vec![
            FlowNode { step_id: StepId::new("a"), agent_key: "builder".to_string(), kind: StepKind::Work, microloop_max_iterations: None },
            FlowNode { step_id: StepId::new("b"), agent_key: "builder".to_string(), kind: StepKind::Terminal, microloop_max_iterations: None },
        ];
        let edges = vec![FlowEdge { from: StepId::new("a"), to: StepId::new("b"), guard: None }];
        FlowGraph::new(StepId::new("a"), nodes, edges).expect("valid graph")
    }

    fn forensic() -> ForensicSummary {
        ForensicSummary { scan_id: ScanId::new("scan-1"), step_id: StepId::new("a"), conditions: BTreeMap::new(), no_progress: false }
    }

    fn scent(step: &str, payload: &[u8]) -> ScentEntry {
        ScentEntry {
            step_id: StepId::new(step),
            summary_hash: hash_bytes(payload),
            files_changed: 0,
            lines_added: 0,
            lines_removed: 0,
            tests_failed: 0,
            coverage_percent: None,
        }
    }

    fn base_request<'a>(flow: &'a FlowGraph, forensic: &'a ForensicSummary, trail: &'a ScentTrail, latest: &'a ScentEntry, catalog: &'a SidequestCatalog) -> RouteRequest<'a> {
        RouteRequest {
            flow,
            current_step: &flow.entry,
            forensic,
            scent_trail: trail,
            latest_scent: latest,
            iteration: IterationState { current: 0, max: 3 },
            mode: RoutingMode::DeterministicOnly,
            catalog,
            error_signature: None,
            allow_extend_graph: false,
            envelope_fallback: None,
        }
    }

    #[test]
    fn a_single_eligible_edge_takes_the_fast_path() {
        let flow = flow_with_one_edge();
        let forensic = forensic();
        let trail = ScentTrail::new(4);
        let latest = scent("a", b"1");
        let catalog = SidequestCatalog::default();
        let outcome = route(&base_request(&flow, &forensic, &trail, &latest, &catalog), None);
        assert_eq!(outcome.source, RoutingSource::FastPath);
        assert!(outcome.chosen_is_valid());
    }

    #[test]
    fn an_exhausted_iteration_budget_forces_the_non_self_edge() {
        let nodes = vec![
            FlowNode { step_id: StepId::new("a"), agent_key: "builder".to_string(), kind: StepKind::Work, microloop_max_iterations: Some(2) },
            FlowNode { step_id: StepId::new("b"), agent_key: "builder".to_string(), kind: StepKind::Terminal, microloop_max_iterations: None },
        ];
        let edges = vec![
            FlowEdge { from: StepId::new("a"), to: StepId::new("a"), guard: None },
            FlowEdge { from: StepId::new("a"), to: StepId::new("b"), guard: None },
        ];
        let flow = FlowGraph::new(StepId::new("a"), nodes, edges).expect("valid graph");
        let forensic = forensic();
        let trail = ScentTrail::new(4);
        let latest = scent("a", b"1");
        let catalog = SidequestCatalog::default();
        let mut request = base_request(&flow, &forensic, &trail, &latest, &catalog);
        request.iteration = IterationState { current: 2, max: 2 };
        let outcome = route(&request, None);
        assert_eq!(outcome.source, RoutingSource::Deterministic);
        assert!(outcome.chosen_is_valid());
        let chosen = outcome.chosen.as_ref().expect("chosen");
        let target = &outcome.candidates.iter().find(|candidate| &candidate.candidate_id == chosen).expect("candidate").target;
        assert_eq!(target, &RoutingTarget::ExistingStep { step_id: StepId::new("b") });
    }

    #[test]
    fn a_stalled_run_without_a_matching_sidequest_escalates() {
        let flow = flow_with_two_edges();
        let forensic = forensic();
        let mut trail = ScentTrail::new(4);
        let latest = scent("a", b"same");
        trail.push(latest.clone());
        let catalog = SidequestCatalog::default();
        let outcome = route(&base_request(&flow, &forensic, &trail, &latest, &catalog), None);
        assert_eq!(outcome.source, RoutingSource::Escalate);
        assert!(outcome.chosen_is_valid());
    }

    #[test]
    fn multiple_edges_without_a_navigator_fall_back_to_the_envelope_suggestion() {
        let flow = flow_with_two_edges();
        let forensic = forensic();
        let trail = ScentTrail::new(4);
        let latest = scent("a", b"1");
        let catalog = SidequestCatalog::default();
        let mut request = base_request(&flow, &forensic, &trail, &latest, &catalog);
        request.mode = RoutingMode::DeterministicOnly;
        let fallback_step = StepId::new("b");
        request.envelope_fallback = Some(&fallback_step);
        let outcome = route(&request, None);
        assert_eq!(outcome.source, RoutingSource::EnvelopeFallback);
        assert!(outcome.chosen_is_valid());
    }

    struct StubNavigator {
        choice: CandidateId,
    }

    impl Navigator for StubNavigator {
        fn choose(&self, _step_id: &StepId, _forensic: &ForensicSummary, _candidates: &[RoutingCandidate]) -> Result<CandidateId, NavigatorError> {
            Ok(self.choice.clone())
        }
    }

    #[test]
    fn the_navigator_tier_is_used_when_multiple_edges_are_eligible() {
        let flow = flow_with_two_edges();
        let forensic = forensic();
        let trail = ScentTrail::new(4);
        let latest = scent("a", b"1");
        let catalog = SidequestCatalog::default();
        let mut request = base_request(&flow, &forensic, &trail, &latest, &catalog);
        request.mode = RoutingMode::Authoritative;
        let candidates = build_candidate_set(&flow, &flow.entry, &forensic, &catalog, None);
        let navigator = StubNavigator { choice: candidates[0].candidate.candidate_id.clone() };
        let outcome = route(&request, Some(&navigator));
        assert_eq!(outcome.source, RoutingSource::Navigator);
        assert!(outcome.chosen_is_valid());
    }
}
