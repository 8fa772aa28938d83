// crates/kernel-engine/src/vcs.rs
// ============================================================================
// Module: Shadow Fork Adapter
// Description: Extends the core VCS port with the operations a run's
//              shadow fork needs beyond create/commit/discard.
// Purpose: Let the orchestrator inspect and publish a shadow fork's state
//          without widening the core port every backend must implement.
// Dependencies: kernel-core
// ============================================================================

//! ## Overview
//! [`kernel_core::interfaces::VcsAdapter`] defines the minimal lifecycle every
//! backend must support: fork, commit, discard. [`ShadowForkAdapter`] extends
//! it with the read-only and publish-gating operations only a concrete,
//! file-system-aware adapter can answer, so the core port stays the small
//! surface every backend has to implement while concrete adapters opt into
//! the rest. [`NullVcsAdapter`] is the default no-op implementation used when
//! a run has no working tree of its own to isolate.

use kernel_core::core::RunId;
use kernel_core::core::StepId;
use kernel_core::interfaces::VcsAdapter;
use kernel_core::interfaces::VcsError;

/// Extends [`VcsAdapter`] with shadow-fork inspection and publish gating.
pub trait ShadowForkAdapter: VcsAdapter {
    /// Returns a unified diff of the shadow fork's changes since it was created.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError`] when the fork does not exist or the diff fails.
    fn diff(&self, run_id: &RunId) -> Result<String, VcsError>;

    /// Returns the current commit reference of the shadow fork.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError`] when the fork does not exist.
    fn current_sha(&self, run_id: &RunId) -> Result<String, VcsError>;

    /// Returns the current branch or worktree name of the shadow fork.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError`] when the fork does not exist.
    fn current_branch(&self, run_id: &RunId) -> Result<String, VcsError>;

    /// Reports whether the shadow fork's current state is safe to publish
    /// (merge or push) to the run's target branch.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError`] when the check itself fails.
    fn allow_publish(&self, run_id: &RunId) -> Result<bool, VcsError>;

    /// Removes any adapter-side bookkeeping for a run once it is fully
    /// closed out, independent of whether its fork was discarded or published.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError`] when cleanup fails.
    fn cleanup(&self, run_id: &RunId) -> Result<(), VcsError>;
}

/// A no-op VCS adapter for runs with no working tree to isolate.
///
/// # Invariants
/// - Every shadow fork reference is the run's own identifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullVcsAdapter;

impl VcsAdapter for NullVcsAdapter {
    fn shadow_fork(&self, run_id: &RunId) -> Result<String, VcsError> {
        Ok(run_id.to_string())
    }

    fn commit_step(&self, run_id: &RunId, _step_id: &StepId) -> Result<String, VcsError> {
        Ok(run_id.to_string())
    }

    fn discard(&self, _run_id: &RunId) -> Result<(), VcsError> {
        Ok(())
    }
}

impl ShadowForkAdapter for NullVcsAdapter {
    fn diff(&self, _run_id: &RunId) -> Result<String, VcsError> {
        Ok(String::new())
    }

    fn current_sha(&self, run_id: &RunId) -> Result<String, VcsError> {
        Ok(run_id.to_string())
    }

    fn current_branch(&self, run_id: &RunId) -> Result<String, VcsError> {
        Ok(run_id.to_string())
    }

    fn allow_publish(&self, _run_id: &RunId) -> Result<bool, VcsError> {
        Ok(true)
    }

    fn cleanup(&self, _run_id: &RunId) -> Result<(), VcsError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_null_adapter_always_allows_publish() {
        let adapter = NullVcsAdapter;
        assert!(adapter.allow_publish(&RunId::new("run-1")).expect("allow publish"));
    }

    #[test]
    fn the_null_adapter_reports_an_empty_diff() {
        let adapter = NullVcsAdapter;
        assert_eq!(adapter.diff(&RunId::new("run-1")).expect("diff"), "");
    }
}
