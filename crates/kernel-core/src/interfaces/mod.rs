// crates/kernel-core/src/interfaces/mod.rs
// ============================================================================
// Module: Orchestration Kernel Interfaces
// Description: Backend-agnostic ports for storage, transport, and forensics.
// Purpose: Define the contract surfaces the orchestrator drives without
//          embedding any concrete backend's details.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the orchestration kernel integrates with external
//! systems without embedding backend-specific details. Implementations must
//! be deterministic where the kernel requires determinism (storage, replay)
//! and must fail closed on missing or invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::envelope::HandoffEnvelope;
use crate::core::events::RunEvent;
use crate::core::forensics::ForensicSummary;
use crate::core::identifiers::BackendId;
use crate::core::identifiers::EventSeq;
use crate::core::identifiers::RunId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::StepId;
use crate::core::receipts::Receipt;
use crate::core::routing::RoutingDecisionRecord;
use crate::core::state::RunState;

// ============================================================================
// SECTION: Pagination
// ============================================================================

/// A page of cursor-paginated results.
///
/// # Invariants
/// - `next_cursor` is `None` only when no further results remain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items in this page, in stable order.
    pub items: Vec<T>,
    /// Opaque cursor for the next page, if any.
    pub next_cursor: Option<String>,
}

// ============================================================================
// SECTION: Storage
// ============================================================================

/// Storage backend errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage I/O error.
    #[error("storage io error: {0}")]
    Io(String),
    /// Stored data is corrupted or fails integrity checks.
    #[error("storage corruption: {0}")]
    Corrupt(String),
    /// Stored data version is incompatible with this build.
    #[error("storage version mismatch: {0}")]
    VersionMismatch(String),
    /// Caller supplied an out-of-order or otherwise invalid write.
    #[error("storage invalid write: {0}")]
    Invalid(String),
    /// A write collided with a concurrent writer for the same run.
    #[error("storage write conflict: {0}")]
    Conflict(String),
}

/// Durable storage for run state, the event log, and envelopes.
///
/// Implementations must make `append_event` atomic with respect to process
/// crashes: a crash mid-write must leave the log either unchanged or
/// containing the complete event, never a torn record.
pub trait Storage {
    /// Loads the current run state, if the run exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the load fails or stored data is corrupt.
    fn load(&self, run_id: &RunId) -> Result<Option<RunState>, StoreError>;

    /// Appends one event to a run's log at `seq`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when `seq` is not exactly one past the
    /// log's current tail, and [`StoreError::Io`] on write failure.
    fn append_event(&self, run_id: &RunId, seq: EventSeq, event: &RunEvent) -> Result<(), StoreError>;

    /// Reads events for `run_id` after `after` (exclusive), oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails or the log is corrupt.
    fn read_events(&self, run_id: &RunId, after: Option<EventSeq>, limit: usize) -> Result<Page<(EventSeq, RunEvent)>, StoreError>;

    /// Durably writes a handoff envelope, creating or overwriting it by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn write_envelope(&self, envelope: &HandoffEnvelope) -> Result<(), StoreError>;

    /// Atomically records a step's receipt together with the event that closes it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the commit fails; implementations must
    /// leave no partial record on failure.
    fn commit_step_completion(&self, run_id: &RunId, seq: EventSeq, receipt: &Receipt) -> Result<(), StoreError>;

    /// Reports storage readiness for liveness/readiness probes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when storage is unavailable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Transport Port
// ============================================================================

/// Transport backend errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No backend is registered under the requested identifier.
    #[error("unknown transport backend: {0}")]
    UnknownBackend(BackendId),
    /// The backend rejected the session or work request.
    #[error("transport backend error: {0}")]
    Backend(String),
    /// The session was closed or timed out before a result arrived.
    #[error("transport session closed before completion: {0}")]
    Closed(SessionId),
}

/// Backend-agnostic transport session lifecycle.
///
/// A session is opened once per step attempt, driven through one or more
/// rounds of the work phase, finalized exactly once to produce a schema-
/// governed handoff envelope, optionally asked for a routing recommendation
/// while its context is still hot, then closed.
pub trait TransportPort {
    /// Opens a session with `backend_id` for `step_id`, handing over the
    /// run's current context pack.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownBackend`] when no backend is
    /// registered, or [`SessionError::Backend`] when the backend refuses.
    fn open_session(&self, backend_id: &BackendId, step_id: &StepId) -> Result<SessionId, SessionError>;

    /// Dispatches one round of the work phase on an open session and returns
    /// the backend's raw result payload.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the backend fails or the session is closed.
    fn work(&self, session_id: &SessionId, prompt: &serde_json::Value) -> Result<serde_json::Value, SessionError>;

    /// Extracts a structured handoff envelope matching `schema` while tools
    /// are disabled. Called exactly once per session, after the work phase
    /// has finished iterating.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the backend fails or cannot produce a
    /// structurally valid result after its fallback retries are exhausted.
    fn finalize(&self, session_id: &SessionId, schema: &serde_json::Value) -> Result<serde_json::Value, SessionError>;

    /// Asks the backend for a routing-recommendation payload matching
    /// `schema`. Not every backend's route phase is authoritative; a
    /// backend that has nothing to add returns `None` rather than erroring.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the backend fails outright.
    fn route(&self, session_id: &SessionId, schema: &serde_json::Value) -> Result<Option<serde_json::Value>, SessionError>;

    /// Closes a session, releasing any backend-held resources.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the backend fails to close cleanly.
    fn close(&self, session_id: &SessionId) -> Result<(), SessionError>;
}

// ============================================================================
// SECTION: Forensic Scanner
// ============================================================================

/// Forensic scanner errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The scanner could not parse the step's returned artifacts.
    #[error("forensic scan could not parse artifacts: {0}")]
    Unparseable(String),
    /// The scanner's underlying tool failed to run.
    #[error("forensic scan tool failed: {0}")]
    ToolFailed(String),
}

/// A forensic scanner that inspects a step's returned work and produces a
/// [`ForensicSummary`] for guard-condition evaluation.
pub trait ForensicScanner {
    /// Scans `artifact` produced by `step_id` and returns a summary.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] when the scan cannot be completed.
    fn scan(&self, step_id: &StepId, artifact: &[u8]) -> Result<ForensicSummary, ScanError>;
}

// ============================================================================
// SECTION: VCS Adapter
// ============================================================================

/// Version-control adapter errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The adapter's underlying VCS command failed.
    #[error("vcs command failed: {0}")]
    CommandFailed(String),
    /// The requested shadow fork does not exist.
    #[error("shadow fork not found for run: {0}")]
    ForkNotFound(RunId),
}

/// Isolates a run's working tree changes in a shadow fork so concurrent runs
/// never observe each other's uncommitted work.
pub trait VcsAdapter {
    /// Creates (or reuses) a shadow fork for `run_id` and returns its
    /// reference, for example a branch or worktree name.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError`] when the fork cannot be created.
    fn shadow_fork(&self, run_id: &RunId) -> Result<String, VcsError>;

    /// Commits the shadow fork's current working tree state for `step_id`
    /// and returns the resulting commit reference.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError`] when the commit fails.
    fn commit_step(&self, run_id: &RunId, step_id: &StepId) -> Result<String, VcsError>;

    /// Discards a run's shadow fork and any uncommitted changes within it.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError`] when the fork cannot be removed.
    fn discard(&self, run_id: &RunId) -> Result<(), VcsError>;
}

// ============================================================================
// SECTION: Routing Decision Sink
// ============================================================================

/// Routing decision log errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum RoutingLogError {
    /// The sink failed to append the routing decision.
    #[error("routing decision log write failed: {0}")]
    WriteFailed(String),
}

/// Durable append-only sink for routing decisions, kept separate from the
/// run event log so forensic tooling can replay routing history in isolation.
pub trait RoutingLog {
    /// Appends a routing decision record for `run_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingLogError`] when the append fails.
    fn record(&self, run_id: &RunId, record: &RoutingDecisionRecord) -> Result<(), RoutingLogError>;
}
