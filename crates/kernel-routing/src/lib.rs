// crates/kernel-routing/src/lib.rs
// ============================================================================
// Crate: kernel-routing
// Description: The five-tier routing cascade that decides what a run does
//              after each step closes.
// Purpose: Turn a step's forensic summary and scent trail into a single,
//          auditable routing decision, persisted alongside its rationale.
// Dependencies: kernel-core, kernel-forensics, kernel-logic
// ============================================================================

//! Routing decisions are the orchestration kernel's steering wheel: every
//! time a step closes, [`cascade::route`] decides whether the run advances,
//! loops, detours into a sidequest, proposes new flow nodes, terminates, or
//! escalates. [`decision::classify_decision`] and [`decision::build_decision_record`]
//! turn that outcome into the durable record [`log::FileRoutingLog`] appends.

pub mod candidates;
pub mod cascade;
pub mod decision;
pub mod log;
pub mod metrics;
pub mod sidequest;

pub use candidates::build_candidate_set;
pub use candidates::PrioritizedCandidate;
pub use cascade::route;
pub use cascade::IterationState;
pub use cascade::Navigator;
pub use cascade::NavigatorError;
pub use cascade::RouteRequest;
pub use cascade::RoutingMode;
pub use decision::build_decision_record;
pub use decision::classify_decision;
pub use decision::Confidence;
pub use decision::Decision;
pub use decision::IterationCounters;
pub use decision::RoutingDecisionRecord;
pub use log::FileRoutingLog;
pub use log::FileRoutingLogError;
pub use metrics::DecisionCounts;
pub use metrics::RoutingMetrics;
pub use metrics::RoutingStats;
pub use sidequest::SidequestCatalog;
pub use sidequest::SidequestEntry;
