// crates/kernel-transport/src/capability.rs
// ============================================================================
// Module: Capability Subsumption
// Description: Session capability vocabulary and the fallback strategy each
//              capability falls back to when a backend lacks it.
// Purpose: Let the engine drive every backend through a uniform session
//          protocol without branching on backend identity.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A transport backend declares which of the seven session capabilities it
//! has. For every capability it lacks, [`default_fallback`] names the
//! strategy that compensates so the orchestrator sees a uniform interface.
//! `tool interception` is the one capability with no fallback: a backend that
//! cannot intercept tool calls is simply refused when policy requires it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Capability
// ============================================================================

/// One capability a transport session may or may not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Backend emits JSON matching a schema natively.
    StructuredOutput,
    /// The three session phases share the same in-memory conversation state.
    HotContext,
    /// Work phase can be cancelled asynchronously with partial state preserved.
    Interrupts,
    /// Pre/post tool-call hooks can observe or block tool invocations.
    Hooks,
    /// Incremental output is available.
    Streaming,
    /// Backend routes tool calls; the kernel observes only.
    NativeTools,
    /// The kernel can enumerate tool calls after the fact.
    ToolObservation,
    /// Tool calls can be intercepted and blocked before they run. Has no
    /// fallback strategy: a backend lacking it is refused when policy
    /// requires interception.
    ToolInterception,
}

/// The compensation strategy applied when a session lacks a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// No compensation is possible; the capability is simply absent.
    None,
    /// Attempt the capability's effect approximately, without a hard guarantee.
    BestEffort,
    /// Re-drive the backend in a bounded loop until the capability's effect is achieved.
    Microloop,
    /// Inject compensating context or instructions into the next request.
    Injection,
    /// Collect output that would have streamed and emit it as one unit.
    Buffer,
    /// Enforce a wall-clock cutoff in place of a native signal.
    Timeout,
    /// Observe after the fact instead of intervening in real time.
    Logging,
}

/// Returns the documented fallback strategy for a missing capability.
///
/// `tool interception` has no fallback: callers must treat
/// [`FallbackStrategy::None`] for that capability as "refuse the backend
/// when policy requires interception," not as a usable compensation.
#[must_use]
pub const fn default_fallback(capability: Capability) -> FallbackStrategy {
    match capability {
        Capability::StructuredOutput => FallbackStrategy::BestEffort,
        Capability::HotContext => FallbackStrategy::Injection,
        Capability::Interrupts => FallbackStrategy::Timeout,
        Capability::Hooks => FallbackStrategy::Logging,
        Capability::Streaming => FallbackStrategy::Buffer,
        Capability::NativeTools | Capability::ToolObservation | Capability::ToolInterception => {
            FallbackStrategy::None
        }
    }
}

/// A backend's declared capability set, as reported when a session opens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityProfile {
    /// The capabilities this backend's sessions natively support.
    pub supported: BTreeSet<Capability>,
}

impl CapabilityProfile {
    /// Returns `true` when `capability` is natively supported.
    #[must_use]
    pub fn has(&self, capability: Capability) -> bool {
        self.supported.contains(&capability)
    }

    /// Returns the strategy the engine must use to compensate for
    /// `capability`, or `None` if the backend already supports it natively.
    #[must_use]
    pub fn fallback_for(&self, capability: Capability) -> Option<FallbackStrategy> {
        if self.has(capability) { None } else { Some(default_fallback(capability)) }
    }

    /// Returns `true` when a policy requiring `capability` can be satisfied,
    /// either natively or because its fallback is not [`FallbackStrategy::None`].
    #[must_use]
    pub fn satisfies(&self, capability: Capability) -> bool {
        self.has(capability) || default_fallback(capability) != FallbackStrategy::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_output_falls_back_to_best_effort() {
        assert_eq!(default_fallback(Capability::StructuredOutput), FallbackStrategy::BestEffort);
    }

    #[test]
    fn tool_interception_has_no_fallback() {
        assert_eq!(default_fallback(Capability::ToolInterception), FallbackStrategy::None);
    }

    #[test]
    fn a_profile_missing_tool_interception_does_not_satisfy_it() {
        let profile = CapabilityProfile::default();
        assert!(!profile.satisfies(Capability::ToolInterception));
        assert!(profile.satisfies(Capability::StructuredOutput));
    }

    #[test]
    fn a_profile_with_a_capability_reports_no_fallback_needed() {
        let mut profile = CapabilityProfile::default();
        profile.supported.insert(Capability::Streaming);
        assert_eq!(profile.fallback_for(Capability::Streaming), None);
        assert_eq!(profile.fallback_for(Capability::Hooks), Some(FallbackStrategy::Logging));
    }
}
