// crates/kernel-logic/src/serde_support.rs
// ============================================================================
// Module: Requirement Validation
// Description: Structural validation for parsed or deserialized requirement trees.
// Purpose: Reject degenerate or oversized trees before they reach evaluation.
// Dependencies: crate::requirement
// ============================================================================

//! ## Overview
//!
//! Requirement trees can arrive from untrusted sources (a flow-graph document
//! authored by a navigator, a DSL string). [`RequirementValidator`] enforces
//! depth and group-arity limits so a malformed or adversarial tree cannot blow
//! the evaluation stack or silently vacuously pass.

use std::fmt;

use crate::requirement::Requirement;

/// Structural error found while validating a [`Requirement`] tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequirementError {
    /// Tree nesting exceeded the configured maximum depth.
    TooDeep {
        /// Configured maximum.
        max_depth: usize,
    },
    /// An `all`/`any`/`at_least` group had no children.
    EmptyGroup,
    /// An `at_least` group's threshold exceeded its child count.
    ThresholdExceedsChildren {
        /// Requested threshold.
        count: usize,
        /// Number of children present.
        children: usize,
    },
}

impl fmt::Display for RequirementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooDeep {
                max_depth,
            } => write!(f, "requirement tree exceeds max depth {max_depth}"),
            Self::EmptyGroup => write!(f, "requirement group has no children"),
            Self::ThresholdExceedsChildren {
                count,
                children,
            } => write!(f, "at_least threshold {count} exceeds {children} children"),
        }
    }
}

impl std::error::Error for RequirementError {}

/// Validates structural invariants of a [`Requirement`] tree.
///
/// # Invariants
/// - `max_depth` bounds recursion; `0` means only leaf conditions are allowed.
#[derive(Debug, Clone, Copy)]
pub struct RequirementValidator {
    /// Maximum permitted nesting depth.
    max_depth: usize,
}

impl RequirementValidator {
    /// Creates a validator with the default depth limit used by the DSL parser.
    #[must_use]
    pub const fn with_defaults() -> Self {
        Self {
            max_depth: 32,
        }
    }

    /// Creates a validator with an explicit depth limit.
    #[must_use]
    pub const fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
        }
    }

    /// Validates the tree, returning the first structural error encountered.
    ///
    /// # Errors
    ///
    /// Returns [`RequirementError`] when the tree is too deep or contains an
    /// empty or over-thresholded group.
    pub fn validate<P>(&self, tree: &Requirement<P>) -> Result<(), RequirementError> {
        self.validate_at_depth(tree, 0)
    }

    fn validate_at_depth<P>(&self, tree: &Requirement<P>, depth: usize) -> Result<(), RequirementError> {
        if depth > self.max_depth {
            return Err(RequirementError::TooDeep {
                max_depth: self.max_depth,
            });
        }
        match tree {
            Requirement::Condition(_) => Ok(()),
            Requirement::Not(inner) => self.validate_at_depth(inner, depth + 1),
            Requirement::All(children) | Requirement::Any(children) => {
                if children.is_empty() {
                    return Err(RequirementError::EmptyGroup);
                }
                for child in children {
                    self.validate_at_depth(child, depth + 1)?;
                }
                Ok(())
            }
            Requirement::AtLeast {
                count,
                children,
            } => {
                if children.is_empty() {
                    return Err(RequirementError::EmptyGroup);
                }
                if *count > children.len() {
                    return Err(RequirementError::ThresholdExceedsChildren {
                        count: *count,
                        children: children.len(),
                    });
                }
                for child in children {
                    self.validate_at_depth(child, depth + 1)?;
                }
                Ok(())
            }
        }
    }
}

impl Default for RequirementValidator {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::RequirementError;
    use super::RequirementValidator;
    use crate::requirement::Requirement;

    #[test]
    fn rejects_empty_group() {
        let tree: Requirement<&str> = Requirement::All(vec![]);
        assert_eq!(
            RequirementValidator::with_defaults().validate(&tree),
            Err(RequirementError::EmptyGroup)
        );
    }

    #[test]
    fn rejects_threshold_exceeding_children() {
        let tree: Requirement<&str> = Requirement::AtLeast {
            count: 3,
            children: vec![Requirement::Condition("a")],
        };
        assert_eq!(
            RequirementValidator::with_defaults().validate(&tree),
            Err(RequirementError::ThresholdExceedsChildren {
                count: 3,
                children: 1,
            })
        );
    }

    #[test]
    fn rejects_depth_beyond_limit() {
        let mut tree = Requirement::Condition("leaf");
        for _ in 0 .. 5 {
            tree = Requirement::Not(Box::new(tree));
        }
        assert_eq!(
            RequirementValidator::with_max_depth(2).validate(&tree),
            Err(RequirementError::TooDeep { max_depth: 2 })
        );
    }

    #[test]
    fn accepts_well_formed_tree() {
        let tree = Requirement::All(vec![
            Requirement::Condition("a"),
            Requirement::AtLeast {
                count: 1,
                children: vec![Requirement::Condition("b"), Requirement::Condition("c")],
            },
        ]);
        assert!(RequirementValidator::with_defaults().validate(&tree).is_ok());
    }
}
