// crates/kernel-routing/src/decision.rs
// ============================================================================
// Module: Routing Decision Record
// Description: Classifies a routing outcome into an action and its wire form.
// Purpose: Give every routing outcome a stable action vocabulary and a
//          serializable record matching the routing decision log schema.
// Dependencies: kernel-core
// ============================================================================

//! ## Overview
//! [`RoutingOutcome`] describes what the cascade chose; [`Decision`] names
//! what that choice *does* to the run. [`classify_decision`] derives one from
//! the other, and [`RoutingDecisionRecord`] is the durable record written to
//! the routing decision log, one line per step. The record and its action
//! vocabulary live in `kernel-core` alongside the outcome they are derived
//! from, since [`crate::log::RoutingLog`]'s port trait also needs them and a
//! port trait cannot depend back on this crate.

use kernel_core::core::CandidateId;
pub use kernel_core::core::Confidence;
pub use kernel_core::core::Decision;
use kernel_core::core::FlowGraph;
use kernel_core::core::HashDigest;
pub use kernel_core::core::IterationCounters;
pub use kernel_core::core::RoutingDecisionRecord;
use kernel_core::core::RoutingOutcome;
use kernel_core::core::RoutingSource;
use kernel_core::core::RoutingTarget;
use kernel_core::core::Timestamp;

/// Derives the [`Decision`] a [`RoutingOutcome`] represents against `flow`.
///
/// `chosen_is_current_step` distinguishes a microloop re-entry (`Loop`) from
/// an ordinary advance to a different existing step.
#[must_use]
pub fn classify_decision(outcome: &RoutingOutcome, flow: &FlowGraph) -> Decision {
    if outcome.source == RoutingSource::Escalate {
        return Decision::Escalate;
    }
    let Some(candidate_id) = &outcome.chosen else {
        return Decision::Escalate;
    };
    let Some(candidate) = outcome.candidates.iter().find(|candidate| &candidate.candidate_id == candidate_id) else {
        return Decision::Escalate;
    };
    match &candidate.target {
        RoutingTarget::Sidequest { .. } => Decision::Detour,
        RoutingTarget::NewNode { .. } => Decision::InjectNodes,
        RoutingTarget::ExistingStep { step_id } => {
            if step_id == &outcome.step_id {
                Decision::Loop
            } else if flow.node(step_id).is_some_and(|node| matches!(node.kind, kernel_core::core::StepKind::Terminal)) {
                Decision::Terminate
            } else {
                Decision::Advance
            }
        }
    }
}

/// The confidence conventionally associated with a cascade tier.
#[must_use]
pub const fn default_confidence(source: RoutingSource) -> Confidence {
    match source {
        RoutingSource::FastPath | RoutingSource::Deterministic => Confidence::High,
        RoutingSource::DetourCatalog | RoutingSource::Navigator => Confidence::Medium,
        RoutingSource::EnvelopeFallback | RoutingSource::Escalate => Confidence::Low,
    }
}

/// The wire name a cascade tier serializes as in the routing decision log.
#[must_use]
pub const fn source_wire_name(source: RoutingSource) -> &'static str {
    match source {
        RoutingSource::FastPath => "fast_path",
        RoutingSource::Deterministic => "deterministic",
        RoutingSource::Navigator => "navigator",
        RoutingSource::EnvelopeFallback => "envelope_fallback",
        RoutingSource::DetourCatalog => "detour_catalog",
        RoutingSource::Escalate => "escalate",
    }
}

/// Builds a [`RoutingDecisionRecord`] from an outcome and its supporting context.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn build_decision_record(
    outcome: &RoutingOutcome,
    decision: Decision,
    flow_key: &str,
    run_id: &str,
    forensic_digest: HashDigest,
    iteration: IterationCounters,
    signature_matched: bool,
    ts: Timestamp,
) -> RoutingDecisionRecord {
    let target = target_label(outcome.chosen.as_ref(), outcome);
    RoutingDecisionRecord {
        schema_version: "1.0.0".to_string(),
        ts,
        run_id: run_id.to_string(),
        flow_key: flow_key.to_string(),
        step_id: outcome.step_id.to_string(),
        decision,
        target,
        reason: outcome
            .chosen
            .as_ref()
            .and_then(|id| outcome.candidates.iter().find(|candidate| &candidate.candidate_id == id))
            .map_or_else(|| "no eligible candidate".to_string(), |candidate| candidate.rationale.clone()),
        forensic_digest: forensic_digest.to_string(),
        iteration,
        signature_matched,
        confidence: default_confidence(outcome.source),
        source: source_wire_name(outcome.source).to_string(),
    }
}

fn target_label(chosen: Option<&CandidateId>, outcome: &RoutingOutcome) -> String {
    let Some(candidate_id) = chosen else {
        return "none".to_string();
    };
    match outcome.candidates.iter().find(|candidate| &candidate.candidate_id == candidate_id) {
        Some(candidate) => match &candidate.target {
            RoutingTarget::ExistingStep { step_id } => step_id.to_string(),
            RoutingTarget::Sidequest { sidequest_id } => sidequest_id.to_string(),
            RoutingTarget::NewNode { proposed_step_id, .. } => proposed_step_id.to_string(),
        },
        None => candidate_id.to_string(),
    }
}
