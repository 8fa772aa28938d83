// crates/kernel-logic/src/requirement.rs
// ============================================================================
// Module: Requirement Tree
// Description: Boolean-composable guard conditions attached to flow-graph edges.
// Purpose: Give the routing driver a serializable, evaluable tree of conditions
//          that decides whether an edge out of the current node may be taken.
// Dependencies: crate::tristate
// ============================================================================

//! ## Overview
//!
//! A [`Requirement<P>`] tree composes leaf conditions of type `P` (left
//! abstract so callers can use their own condition identifiers, such as a
//! scan-result key) with `all`/`any`/`not`/`at_least` combinators. Evaluation
//! is tri-state: a leaf whose evidence is missing evaluates to
//! [`TriState::Unknown`] and propagates through the tree per Kleene logic
//! rather than being coerced to `true` or `false`.

use serde::Deserialize;
use serde::Serialize;

use crate::tristate::TriState;

/// A boolean-composable guard condition tree.
///
/// # Invariants
/// - `All`/`Any`/`AtLeast` with an empty child list are rejected by
///   [`crate::serde_support::RequirementValidator`] before evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Requirement<P> {
    /// A leaf condition resolved by the caller's evaluator.
    Condition(P),
    /// Conjunction of all children.
    All(Vec<Requirement<P>>),
    /// Disjunction of all children.
    Any(Vec<Requirement<P>>),
    /// Negation of a single child.
    Not(Box<Requirement<P>>),
    /// At least `count` of the children must hold.
    AtLeast {
        /// Minimum number of children that must evaluate to `True`.
        count: usize,
        /// Children being counted.
        children: Vec<Requirement<P>>,
    },
}

impl<P> Requirement<P> {
    /// Builds a leaf condition node.
    #[must_use]
    pub const fn condition(value: P) -> Self {
        Self::Condition(value)
    }

    /// Builds a conjunction, collapsing a single-element list to that element.
    #[must_use]
    pub fn and(mut children: Vec<Self>) -> Self {
        if children.len() == 1 {
            return children.remove(0);
        }
        Self::All(children)
    }

    /// Builds a disjunction, collapsing a single-element list to that element.
    #[must_use]
    pub fn or(mut children: Vec<Self>) -> Self {
        if children.len() == 1 {
            return children.remove(0);
        }
        Self::Any(children)
    }

    /// Builds a negation.
    #[must_use]
    pub fn negate(inner: Self) -> Self {
        Self::Not(Box::new(inner))
    }

    /// Builds an `at_least(count, children)` group.
    #[must_use]
    pub fn require_group(count: u8, children: Vec<Self>) -> Self {
        Self::AtLeast {
            count: count as usize,
            children,
        }
    }

    /// Evaluates the tree, resolving each leaf condition with `resolve_leaf`.
    ///
    /// `at_least` counts only children that resolve to `True`; children that
    /// resolve to `Unknown` count toward neither satisfaction nor failure
    /// unless that ambiguity itself makes the threshold unreachable, in which
    /// case the group is `Unknown` rather than `False`.
    pub fn evaluate<F>(&self, resolve_leaf: &F) -> TriState
    where
        F: Fn(&P) -> TriState,
    {
        match self {
            Self::Condition(leaf) => resolve_leaf(leaf),
            Self::Not(inner) => inner.evaluate(resolve_leaf).not(),
            Self::All(children) => children
                .iter()
                .map(|child| child.evaluate(resolve_leaf))
                .fold(TriState::True, TriState::and),
            Self::Any(children) => children
                .iter()
                .map(|child| child.evaluate(resolve_leaf))
                .fold(TriState::False, TriState::or),
            Self::AtLeast { count, children } => evaluate_at_least(*count, children, resolve_leaf),
        }
    }

    /// Returns the direct children of combinator nodes, or an empty slice for leaves.
    #[must_use]
    pub fn children(&self) -> &[Requirement<P>] {
        match self {
            Self::Condition(_) => &[],
            Self::All(children) | Self::Any(children) | Self::AtLeast { children, .. } => children,
            Self::Not(_) => &[],
        }
    }
}

/// Evaluates an `at_least(count, children)` group under tri-state logic.
fn evaluate_at_least<P, F>(count: usize, children: &[Requirement<P>], resolve_leaf: &F) -> TriState
where
    F: Fn(&P) -> TriState,
{
    if count == 0 {
        return TriState::True;
    }
    let mut satisfied = 0usize;
    let mut unknown = 0usize;
    for child in children {
        match child.evaluate(resolve_leaf) {
            TriState::True => satisfied += 1,
            TriState::Unknown => unknown += 1,
            TriState::False => {}
        }
    }
    if satisfied >= count {
        return TriState::True;
    }
    if satisfied + unknown >= count {
        return TriState::Unknown;
    }
    TriState::False
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::Requirement;
    use crate::tristate::TriState;

    fn resolver<'a>(map: &'a HashMap<&'static str, TriState>) -> impl Fn(&&'static str) -> TriState + 'a {
        move |key: &&'static str| *map.get(key).unwrap_or(&TriState::Unknown)
    }

    #[test]
    fn all_short_circuits_to_false() {
        let tree = Requirement::All(vec![
            Requirement::Condition("a"),
            Requirement::Condition("b"),
        ]);
        let mut map = HashMap::new();
        map.insert("a", TriState::False);
        map.insert("b", TriState::Unknown);
        assert_eq!(tree.evaluate(&resolver(&map)), TriState::False);
    }

    #[test]
    fn at_least_unknown_when_threshold_still_reachable() {
        let tree = Requirement::AtLeast {
            count: 2,
            children: vec![
                Requirement::Condition("a"),
                Requirement::Condition("b"),
                Requirement::Condition("c"),
            ],
        };
        let mut map = HashMap::new();
        map.insert("a", TriState::True);
        map.insert("b", TriState::Unknown);
        map.insert("c", TriState::False);
        assert_eq!(tree.evaluate(&resolver(&map)), TriState::Unknown);
    }

    #[test]
    fn at_least_false_when_threshold_unreachable() {
        let tree = Requirement::AtLeast {
            count: 2,
            children: vec![Requirement::Condition("a"), Requirement::Condition("b")],
        };
        let mut map = HashMap::new();
        map.insert("a", TriState::False);
        map.insert("b", TriState::Unknown);
        assert_eq!(tree.evaluate(&resolver(&map)), TriState::False);
    }

    #[test]
    fn at_least_zero_is_vacuously_true() {
        let tree: Requirement<&str> = Requirement::AtLeast {
            count: 0,
            children: vec![],
        };
        let map = HashMap::new();
        assert_eq!(tree.evaluate(&resolver(&map)), TriState::True);
    }
}
