// crates/kernel-core/src/core/flow.rs
// ============================================================================
// Module: Flow Graph
// Description: The static plan a run executes against.
// Purpose: Describe steps and the guarded edges between them.
// Dependencies: crate::core::identifiers, kernel_logic, serde
// ============================================================================

//! ## Overview
//! A flow graph is an author-supplied plan: a set of steps (nodes) and the
//! guarded edges that connect them. The routing driver walks this graph one
//! step at a time, consulting each outgoing edge's guard condition before it
//! becomes an eligible [`crate::core::routing::RoutingCandidate`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use kernel_logic::dsl;
use kernel_logic::dsl::DslError;
use kernel_logic::Requirement;
use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::StepId;

// ============================================================================
// SECTION: Step Nodes
// ============================================================================

/// The role a step plays in the flow.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Ordinary work step dispatched to a backend.
    Work,
    /// Terminal success step; reaching it completes the run.
    Terminal,
    /// Bounded detour step drawn from the sidequest catalog.
    Sidequest,
}

/// A single node in the flow graph.
///
/// # Invariants
/// - `agent_key` is opaque to the kernel; it is resolved by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowNode {
    /// Step identifier, unique within the flow.
    pub step_id: StepId,
    /// Caller-resolved agent/persona key for this step.
    pub agent_key: String,
    /// The step's role in the flow.
    pub kind: StepKind,
    /// `Some(max_iterations)` when this step is a microloop node whose
    /// self-edge may be taken at most that many times before the routing
    /// driver forces an exit along the non-self edge.
    #[serde(default)]
    pub microloop_max_iterations: Option<u32>,
}

impl FlowNode {
    /// Returns `true` when this node is a microloop node.
    #[must_use]
    pub const fn is_microloop(&self) -> bool {
        self.microloop_max_iterations.is_some()
    }
}

// ============================================================================
// SECTION: Edges
// ============================================================================

/// A directed, optionally guarded edge between two flow steps.
///
/// # Invariants
/// - `from` and `to` must reference step identifiers present in the owning
///   [`FlowGraph`].
/// - `guard` of `None` means the edge is unconditionally eligible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEdge {
    /// Source step identifier.
    pub from: StepId,
    /// Destination step identifier.
    pub to: StepId,
    /// Guard condition tree gating eligibility; leaves are scan condition keys.
    pub guard: Option<Requirement<String>>,
}

impl FlowEdge {
    /// Builds an edge whose guard is authored as a [`parse_guard`] expression
    /// rather than a hand-nested [`Requirement`] tree.
    ///
    /// # Errors
    ///
    /// Returns [`DslError`] when `guard` fails to parse.
    pub fn with_guard_dsl(from: StepId, to: StepId, guard: &str) -> Result<Self, DslError> {
        Ok(Self {
            from,
            to,
            guard: Some(parse_guard(guard)?),
        })
    }
}

/// Parses a guard-condition expression written against the flow graph's
/// condition-key vocabulary (the keys a [`crate::core::ForensicSummary`]
/// reports, such as `tests_passed` or `lines_added`) into a
/// [`Requirement<String>`] tree.
///
/// Any identifier the DSL resolves is accepted as a condition key; a key the
/// forensic summary never measured evaluates to `Unknown` at guard-evaluation
/// time rather than being rejected here, the same fail-closed treatment
/// [`crate::core::ForensicSummary::condition`] gives an absent key.
///
/// # Errors
///
/// Returns [`DslError`] for malformed guard text.
pub fn parse_guard(input: &str) -> Result<Requirement<String>, DslError> {
    dsl::parse_requirement(input, &|key: &str| Some(key.to_string()))
}

// ============================================================================
// SECTION: Flow Graph
// ============================================================================

/// Errors raised while constructing or querying a [`FlowGraph`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FlowGraphError {
    /// An edge referenced a step identifier not present in the graph.
    #[error("edge references unknown step: {0}")]
    UnknownStep(StepId),
    /// The entry step identifier is not present in the graph.
    #[error("entry step not found: {0}")]
    UnknownEntry(StepId),
    /// Two nodes were declared with the same step identifier.
    #[error("duplicate step id: {0}")]
    DuplicateStep(StepId),
}

/// The static plan a run executes against.
///
/// # Invariants
/// - Node identifiers are unique.
/// - Every edge's endpoints exist among the graph's nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowGraph {
    /// Entry step identifier.
    pub entry: StepId,
    /// All nodes in the graph, keyed by step identifier.
    nodes: BTreeMap<StepId, FlowNode>,
    /// All edges in the graph.
    edges: Vec<FlowEdge>,
}

impl FlowGraph {
    /// Builds a flow graph from nodes and edges, validating structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`FlowGraphError`] when an edge references an unknown step, the
    /// entry step is missing, or a step identifier is duplicated.
    pub fn new(entry: StepId, nodes: Vec<FlowNode>, edges: Vec<FlowEdge>) -> Result<Self, FlowGraphError> {
        let mut by_id = BTreeMap::new();
        for node in nodes {
            if by_id.insert(node.step_id.clone(), node).is_some() {
                return Err(FlowGraphError::DuplicateStep(
                    by_id.keys().next_back().cloned().unwrap_or_else(|| StepId::new("")),
                ));
            }
        }
        if !by_id.contains_key(&entry) {
            return Err(FlowGraphError::UnknownEntry(entry));
        }
        for edge in &edges {
            if !by_id.contains_key(&edge.from) {
                return Err(FlowGraphError::UnknownStep(edge.from.clone()));
            }
            if !by_id.contains_key(&edge.to) {
                return Err(FlowGraphError::UnknownStep(edge.to.clone()));
            }
        }
        Ok(Self {
            entry,
            nodes: by_id,
            edges,
        })
    }

    /// Returns the node for `step_id`, if present.
    #[must_use]
    pub fn node(&self, step_id: &StepId) -> Option<&FlowNode> {
        self.nodes.get(step_id)
    }

    /// Returns all outgoing edges from `step_id`, in declaration order.
    #[must_use]
    pub fn outgoing(&self, step_id: &StepId) -> Vec<&FlowEdge> {
        self.edges.iter().filter(|edge| &edge.from == step_id).collect()
    }

    /// Returns the total number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::parse_guard;
    use super::FlowEdge;
    use super::FlowGraph;
    use super::FlowGraphError;
    use super::FlowNode;
    use super::StepKind;
    use crate::core::identifiers::StepId;
    use kernel_logic::Requirement;
    use kernel_logic::TriState;

    fn node(id: &str, kind: StepKind) -> FlowNode {
        FlowNode {
            step_id: StepId::new(id),
            agent_key: "builder".to_string(),
            kind,
            microloop_max_iterations: None,
        }
    }

    #[test]
    fn rejects_edge_to_unknown_step() {
        let nodes = vec![node("a", StepKind::Work)];
        let edges = vec![FlowEdge {
            from: StepId::new("a"),
            to: StepId::new("missing"),
            guard: None,
        }];
        let err = FlowGraph::new(StepId::new("a"), nodes, edges).expect_err("unknown step");
        assert_eq!(err, FlowGraphError::UnknownStep(StepId::new("missing")));
    }

    #[test]
    fn rejects_missing_entry() {
        let nodes = vec![node("a", StepKind::Work)];
        let err = FlowGraph::new(StepId::new("b"), nodes, vec![]).expect_err("missing entry");
        assert_eq!(err, FlowGraphError::UnknownEntry(StepId::new("b")));
    }

    #[test]
    fn outgoing_preserves_declaration_order() {
        let nodes = vec![node("a", StepKind::Work), node("b", StepKind::Work), node("c", StepKind::Terminal)];
        let edges = vec![
            FlowEdge {
                from: StepId::new("a"),
                to: StepId::new("b"),
                guard: None,
            },
            FlowEdge {
                from: StepId::new("a"),
                to: StepId::new("c"),
                guard: None,
            },
        ];
        let graph = FlowGraph::new(StepId::new("a"), nodes, edges).expect("valid graph");
        let out = graph.outgoing(&StepId::new("a"));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].to, StepId::new("b"));
        assert_eq!(out[1].to, StepId::new("c"));
    }

    #[test]
    fn a_dsl_guard_evaluates_against_condition_keys() {
        let guard = parse_guard("tests_passed and not high_churn_low_progress").expect("valid guard text");
        let resolve = |key: &String| match key.as_str() {
            "tests_passed" => TriState::True,
            "high_churn_low_progress" => TriState::False,
            _ => TriState::Unknown,
        };
        assert_eq!(guard.evaluate(&resolve), TriState::True);
    }

    #[test]
    fn a_malformed_guard_is_rejected_before_it_ever_reaches_a_flow_edge() {
        parse_guard("all(tests_passed,").expect_err("unbalanced call should not parse");
    }

    #[test]
    fn with_guard_dsl_builds_the_same_tree_a_hand_authored_edge_would() {
        let edge = FlowEdge::with_guard_dsl(StepId::new("a"), StepId::new("b"), "at_least(2, tests_passed, lint_clean, coverage_met)")
            .expect("valid guard text");
        let expected = Requirement::require_group(
            2,
            vec![
                Requirement::condition("tests_passed".to_string()),
                Requirement::condition("lint_clean".to_string()),
                Requirement::condition("coverage_met".to_string()),
            ],
        );
        assert_eq!(edge.guard, Some(expected));
    }
}
