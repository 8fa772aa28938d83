// crates/kernel-core/src/core/errors.rs
// ============================================================================
// Module: Failure Classification
// Description: The shared error taxonomy every crate's leaf errors map into.
// Purpose: Let the orchestrator decide retry/escalate/abort behavior without
//          knowing which crate or backend produced a failure.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Every fallible operation in the kernel eventually surfaces a
//! [`FailureClass`]. Leaf error types implement `classify` to report their
//! own class; when several failures occur together (for example, a batch of
//! concurrent scans), [`aggregate`] collapses them into the single class the
//! orchestrator should act on, favoring the least recoverable outcome.

// ============================================================================
// SECTION: Failure Class
// ============================================================================

/// How recoverable a failure is, from the orchestrator's point of view.
///
/// # Invariants
/// - Ordered from least to most severe: `Transient < Retriable < Permanent < Fatal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureClass {
    /// Likely to succeed if retried immediately or after a short backoff.
    Transient,
    /// May succeed if retried, but the run's retry budget for this step should be charged.
    Retriable,
    /// Will not succeed without a change to inputs, configuration, or the flow graph itself.
    Permanent,
    /// The run cannot continue in any form; it must be aborted.
    Fatal,
}

impl FailureClass {
    /// Returns `true` when the orchestrator should attempt a retry for this class.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::Retriable)
    }
}

/// A type whose failures can be classified into a [`FailureClass`].
pub trait Classify {
    /// Returns this failure's class.
    fn classify(&self) -> FailureClass;
}

// ============================================================================
// SECTION: Aggregation
// ============================================================================

/// Collapses a set of failure classes into the one the orchestrator should
/// act on, using fatal > permanent > retriable > transient precedence.
///
/// Returns `None` when `classes` is empty.
#[must_use]
pub fn aggregate(classes: impl IntoIterator<Item = FailureClass>) -> Option<FailureClass> {
    classes.into_iter().max()
}
