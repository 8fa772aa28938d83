// crates/kernel-logic/src/lib.rs
// ============================================================================
// Crate: kernel-logic
// Description: Tri-state boolean algebra and guard-condition trees for flow-graph edges.
// Purpose: Give the routing driver a fail-closed way to evaluate whether an
//          edge out of the current flow-graph node may be taken.
// Dependencies: serde
// ============================================================================

//! Tri-state guard-condition evaluation for flow-graph edges.
//!
//! This crate is deliberately small and has no knowledge of the kernel's
//! run state, routing driver, or storage layer. It exposes three things:
//!
//! - [`TriState`](tristate::TriState): a three-valued boolean with fail-closed
//!   (`Unknown`-propagating) `and`/`or`/`not`.
//! - [`Requirement`](requirement::Requirement): a serializable boolean-composable
//!   tree of leaf conditions, generic over the leaf condition type.
//! - [`dsl::parse_requirement`]: an optional human-authored syntax that compiles
//!   down to the same tree.

pub mod dsl;
pub mod requirement;
pub mod serde_support;
pub mod tristate;

pub use requirement::Requirement;
pub use serde_support::RequirementError;
pub use serde_support::RequirementValidator;
pub use tristate::TriState;
