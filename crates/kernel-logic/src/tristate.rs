// crates/kernel-logic/src/tristate.rs
// ============================================================================
// Module: Tri-State Logic
// Description: Three-valued (true/false/unknown) boolean algebra.
// Purpose: Let guard-condition evaluation fail closed when evidence for a
//          condition is missing rather than silently defaulting to true/false.
// Dependencies: none
// ============================================================================

//! ## Overview
//!
//! Routing and gate decisions in the kernel often depend on evidence that may
//! not be available yet (a scan that has not run, a provider that returned no
//! answer). [`TriState`] models this directly instead of forcing a boolean
//! guess, and its `and`/`or`/`not` combinators follow Kleene's strong logic of
//! indeterminacy so that `Unknown` propagates the way a fail-closed evaluator
//! requires.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// A three-valued logical result.
///
/// # Invariants
/// - `Unknown` is absorbing under `and` with `False` and under `or` with `True`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriState {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// The condition could not be evaluated.
    Unknown,
}

impl TriState {
    /// Returns `true` only when the value is [`TriState::True`].
    #[must_use]
    pub const fn is_true(self) -> bool {
        matches!(self, Self::True)
    }

    /// Returns `true` when the value is [`TriState::Unknown`].
    #[must_use]
    pub const fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Collapses the value to a boolean, treating `Unknown` as the given default.
    #[must_use]
    pub const fn resolve(self, default_for_unknown: bool) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::Unknown => default_for_unknown,
        }
    }

    /// Kleene conjunction: `False` dominates, then `Unknown`, then `True`.
    #[must_use]
    pub const fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::False, _) | (_, Self::False) => Self::False,
            (Self::Unknown, _) | (_, Self::Unknown) => Self::Unknown,
            (Self::True, Self::True) => Self::True,
        }
    }

    /// Kleene disjunction: `True` dominates, then `Unknown`, then `False`.
    #[must_use]
    pub const fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::True, _) | (_, Self::True) => Self::True,
            (Self::Unknown, _) | (_, Self::Unknown) => Self::Unknown,
            (Self::False, Self::False) => Self::False,
        }
    }

    /// Logical negation; `Unknown` negates to `Unknown`.
    #[must_use]
    pub const fn not(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Unknown => Self::Unknown,
        }
    }
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

impl fmt::Display for TriState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TriState;

    #[test]
    fn and_is_false_dominant() {
        assert_eq!(TriState::False.and(TriState::Unknown), TriState::False);
        assert_eq!(TriState::Unknown.and(TriState::False), TriState::False);
    }

    #[test]
    fn or_is_true_dominant() {
        assert_eq!(TriState::True.or(TriState::Unknown), TriState::True);
        assert_eq!(TriState::Unknown.or(TriState::True), TriState::True);
    }

    #[test]
    fn unknown_propagates_when_not_dominated() {
        assert_eq!(TriState::Unknown.and(TriState::True), TriState::Unknown);
        assert_eq!(TriState::Unknown.or(TriState::False), TriState::Unknown);
    }

    #[test]
    fn not_is_involutive_on_true_false() {
        assert_eq!(TriState::True.not(), TriState::False);
        assert_eq!(TriState::False.not(), TriState::True);
        assert_eq!(TriState::Unknown.not(), TriState::Unknown);
    }

    #[test]
    fn resolve_uses_default_only_for_unknown() {
        assert!(TriState::True.resolve(false));
        assert!(!TriState::False.resolve(true));
        assert!(TriState::Unknown.resolve(true));
        assert!(!TriState::Unknown.resolve(false));
    }
}
