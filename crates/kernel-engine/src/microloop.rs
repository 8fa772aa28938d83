// crates/kernel-engine/src/microloop.rs
// ============================================================================
// Module: Microloop
// Description: Exit-condition logic for a step's self-correction loop.
// Purpose: Decide, after each backend round, whether a step should re-enter
//          its own microloop or hand the result up to routing.
// Dependencies: kernel-core, kernel-forensics, serde_json
// ============================================================================

//! ## Overview
//! A step that supports `HotContext` or `Interrupts` may retry its own work
//! in place before handing control to the routing cascade: this is the
//! microloop. [`MicroloopState`] tracks how many times a step has retried
//! itself and the signature of its most recent failure; [`MicroloopState::should_exit`]
//! reads a backend's handoff result and decides whether another iteration is
//! worth attempting.

use kernel_core::core::hash_bytes;
use kernel_core::core::HashDigest;
use serde::Deserialize;

/// The `status` field of a handoff envelope's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResultStatus {
    /// The backend considers its work complete and verified.
    Verified,
    /// The backend produced work it could not verify itself.
    Unverified,
    /// The backend is blocked and cannot proceed without intervention.
    Blocked,
}

/// The subset of a handoff envelope's result the microloop reads.
#[derive(Debug, Clone, Deserialize)]
pub struct MicroloopSignal {
    /// The backend's self-reported verification status.
    pub status: ResultStatus,
    /// The routing section of the result, if present.
    #[serde(default)]
    pub routing: RoutingSignal,
}

/// The `routing` section of a handoff envelope's result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingSignal {
    /// Whether the backend believes another iteration would help.
    #[serde(default)]
    pub can_further_iteration_help: Option<bool>,
}

/// Why a microloop stopped re-entering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroloopExit {
    /// The backend reported `VERIFIED`.
    Verified,
    /// The backend reported it cannot make further progress itself.
    BackendDeclined,
    /// The configured maximum iteration count was reached.
    IterationLimit,
    /// The same failure signature repeated, so retrying would not help.
    RepeatedFailure,
}

/// Tracks one step's microloop iteration count and failure history.
#[derive(Debug, Clone)]
pub struct MicroloopState {
    iteration: u32,
    max_iterations: u32,
    last_failure_signature: Option<HashDigest>,
}

impl MicroloopState {
    /// Starts a fresh microloop bounded at `max_iterations`.
    #[must_use]
    pub const fn new(max_iterations: u32) -> Self {
        Self { iteration: 0, max_iterations, last_failure_signature: None }
    }

    /// The number of iterations completed so far.
    #[must_use]
    pub const fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Evaluates `signal` and `artifact` from the latest round, returning the
    /// exit reason if the microloop should stop, or `None` to re-enter.
    ///
    /// `artifact` is hashed to detect a step repeating the same failure
    /// verbatim; a genuinely different attempt produces a different hash even
    /// when it also fails.
    pub fn should_exit(&mut self, signal: &MicroloopSignal, artifact: &[u8]) -> Option<MicroloopExit> {
        self.iteration += 1;
        if signal.status == ResultStatus::Verified {
            return Some(MicroloopExit::Verified);
        }
        if signal.routing.can_further_iteration_help == Some(false) {
            return Some(MicroloopExit::BackendDeclined);
        }
        if self.iteration >= self.max_iterations {
            return Some(MicroloopExit::IterationLimit);
        }
        let signature = hash_bytes(artifact);
        if self.last_failure_signature == Some(signature) {
            return Some(MicroloopExit::RepeatedFailure);
        }
        self.last_failure_signature = Some(signature);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(status: ResultStatus, can_help: Option<bool>) -> MicroloopSignal {
        MicroloopSignal { status, routing: RoutingSignal { can_further_iteration_help: can_help } }
    }

    #[test]
    fn a_verified_result_exits_immediately() {
        let mut state = MicroloopState::new(5);
        let exit = state.should_exit(&signal(ResultStatus::Verified, None), b"ok");
        assert_eq!(exit, Some(MicroloopExit::Verified));
    }

    #[test]
    fn the_backend_declining_further_iteration_exits() {
        let mut state = MicroloopState::new(5);
        let exit = state.should_exit(&signal(ResultStatus::Unverified, Some(false)), b"fail-1");
        assert_eq!(exit, Some(MicroloopExit::BackendDeclined));
    }

    #[test]
    fn reaching_the_iteration_limit_exits() {
        let mut state = MicroloopState::new(2);
        assert_eq!(state.should_exit(&signal(ResultStatus::Unverified, Some(true)), b"fail-1"), None);
        let exit = state.should_exit(&signal(ResultStatus::Unverified, Some(true)), b"fail-2");
        assert_eq!(exit, Some(MicroloopExit::IterationLimit));
    }

    #[test]
    fn an_identical_failure_signature_twice_in_a_row_exits() {
        let mut state = MicroloopState::new(10);
        assert_eq!(state.should_exit(&signal(ResultStatus::Unverified, Some(true)), b"same-failure"), None);
        let exit = state.should_exit(&signal(ResultStatus::Unverified, Some(true)), b"same-failure");
        assert_eq!(exit, Some(MicroloopExit::RepeatedFailure));
    }

    #[test]
    fn a_different_failure_each_round_keeps_iterating_until_the_limit() {
        let mut state = MicroloopState::new(3);
        assert_eq!(state.should_exit(&signal(ResultStatus::Unverified, Some(true)), b"fail-a"), None);
        assert_eq!(state.should_exit(&signal(ResultStatus::Unverified, Some(true)), b"fail-b"), None);
        assert_eq!(state.iteration(), 2);
    }
}
