// crates/kernel-routing/src/candidates.rs
// ============================================================================
// Module: Candidate Set Builder
// Description: Assembles the routing candidates offered to Tier 3 (and
//              recorded alongside every outcome for forensic replay).
// Purpose: Turn a flow graph's outgoing edges plus the sidequest catalog
//          into the bounded candidate set the navigator may choose among.
// Dependencies: kernel-core, kernel-logic
// ============================================================================

//! ## Overview
//! A candidate set is built from two sources: the current step's outgoing
//! graph edges (excluding any whose guard definitely fails) and the
//! sidequest catalog entries applicable given the current forensic summary.
//! Candidates carry a priority so [`crate::cascade`] can present them to the
//! navigator sorted highest-first, and so a deterministic tie-break never
//! depends on iteration order.

use kernel_core::core::CandidateId;
use kernel_core::core::ForensicSummary;
use kernel_core::core::FlowGraph;
use kernel_core::core::RoutingCandidate;
use kernel_core::core::RoutingTarget;
use kernel_core::core::StepId;
use kernel_logic::TriState;

use crate::sidequest::SidequestCatalog;

/// A candidate together with the priority it was offered at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrioritizedCandidate {
    /// The candidate itself.
    pub candidate: RoutingCandidate,
    /// Selection priority; higher wins ties.
    pub priority: i32,
}

/// Builds the candidate set for `current_step`, highest priority first.
///
/// Graph edges are included unless their guard evaluates definitely `False`
/// against `forensic`. Sidequest catalog entries whose trigger matches the
/// forensic summary's recorded error signature (if any) are appended as
/// detour candidates.
#[must_use]
pub fn build_candidate_set(
    flow: &FlowGraph,
    current_step: &StepId,
    forensic: &ForensicSummary,
    catalog: &SidequestCatalog,
    error_signature: Option<&str>,
) -> Vec<PrioritizedCandidate> {
    let mut out = Vec::new();
    for (index, edge) in flow.outgoing(current_step).into_iter().enumerate() {
        let eligible = match &edge.guard {
            None => true,
            Some(guard) => guard.evaluate(&|key: &String| forensic.condition(key)) != TriState::False,
        };
        if !eligible {
            continue;
        }
        out.push(PrioritizedCandidate {
            candidate: RoutingCandidate {
                candidate_id: CandidateId::new(format!("edge-{index}-{}", edge.to)),
                target: RoutingTarget::ExistingStep { step_id: edge.to.clone() },
                rationale: "graph edge is eligible under the current forensic summary".to_string(),
            },
            priority: 100,
        });
    }
    if let Some(signature) = error_signature
        && let Some(entry) = catalog.matching(signature)
    {
        out.push(PrioritizedCandidate {
            candidate: RoutingCandidate {
                candidate_id: CandidateId::new(format!("sidequest-{}", entry.sidequest_id)),
                target: RoutingTarget::Sidequest { sidequest_id: entry.sidequest_id.clone() },
                rationale: format!("error signature {signature} matches sidequest catalog entry"),
            },
            priority: entry.priority,
        });
    }
    out.sort_by(|a, b| b.priority.cmp(&a.priority));
    out
}

#[cfg(test)]
mod tests {
    use kernel_core::core::FlowEdge;
    use kernel_core::core::FlowNode;
    use kernel_core::core::ScanId;
    use kernel_core::core::StepKind;
    use std::collections::BTreeMap;

    use super::*;
    use crate::sidequest::SidequestEntry;

    fn flow() -> FlowGraph {
        let nodes = vec![
            FlowNode { step_id: StepId::new("a"), agent_key: "builder".to_string(), kind: StepKind::Work, microloop_max_iterations: None },
            FlowNode { step_id: StepId::new("b"), agent_key: "builder".to_string(), kind: StepKind::Terminal, microloop_max_iterations: None },
        ];
        let edges = vec![FlowEdge { from: StepId::new("a"), to: StepId::new("b"), guard: None }];
        FlowGraph::new(StepId::new("a"), nodes, edges).expect("valid graph")
    }

    fn forensic() -> ForensicSummary {
        ForensicSummary {
            scan_id: ScanId::new("scan-1"),
            step_id: StepId::new("a"),
            conditions: BTreeMap::new(),
            no_progress: false,
        }
    }

    #[test]
    fn an_unguarded_edge_is_always_a_candidate() {
        let candidates = build_candidate_set(&flow(), &StepId::new("a"), &forensic(), &SidequestCatalog::default(), None);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].priority, 100);
    }

    #[test]
    fn a_matching_sidequest_is_appended_above_nothing() {
        let catalog = SidequestCatalog::new(vec![SidequestEntry {
            sidequest_id: kernel_core::core::SidequestId::new("fix"),
            target_step: StepId::new("fix-step"),
            resume_step: StepId::new("a"),
            trigger_signatures: vec!["oops".to_string()],
            priority: 200,
        }]);
        let candidates =
            build_candidate_set(&flow(), &StepId::new("a"), &forensic(), &catalog, Some("oops:detail"));
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].priority, 200);
    }
}
