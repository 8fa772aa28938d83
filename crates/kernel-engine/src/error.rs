// crates/kernel-engine/src/error.rs
// ============================================================================
// Module: Engine Errors
// Description: The failure taxonomy for step execution and orchestration.
// Purpose: Let the orchestrator decide retry/escalate/abort behavior from one
//          classified error type instead of matching on each port's leaf error.
// Dependencies: kernel-core, kernel-transport, thiserror
// ============================================================================

//! ## Overview
//! [`EngineError`] wraps every failure a step attempt or a run can produce and
//! reports a [`kernel_core::core::FailureClass`] for it, so the orchestrator's
//! retry and abort logic never has to match on which port produced the error.

use kernel_core::core::Classify;
use kernel_core::core::FailureClass;
use kernel_core::interfaces::ScanError;
use kernel_core::interfaces::SessionError;
use kernel_core::interfaces::StoreError;
use kernel_core::interfaces::VcsError;
use thiserror::Error;

/// Errors raised by the step engine or orchestrator.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A preflight check failed before a step could be attempted.
    #[error("preflight check failed: {0}")]
    PreflightFailed(String),
    /// The transport session could not be opened or closed cleanly.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// The forensic scanner could not produce a summary.
    #[error(transparent)]
    Scan(#[from] ScanError),
    /// Durable storage rejected a read or write.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The version-control adapter failed.
    #[error(transparent)]
    Vcs(#[from] VcsError),
    /// The routing decision log rejected a write.
    #[error("routing log write failed: {0}")]
    RoutingLog(String),
    /// The backend's result never settled into a verified or unverified
    /// shape within the step's microloop budget.
    #[error("microloop exhausted for step without a verifiable result: {0}")]
    MicroloopExhausted(String),
    /// The interruption stack would exceed its configured depth.
    #[error("interruption stack depth {depth} exceeded (max {max})")]
    InterruptionStackOverflow {
        /// Depth the detour would have reached.
        depth: usize,
        /// Configured maximum depth.
        max: usize,
    },
    /// The run's hard budget cap was reached or exceeded.
    #[error("hard budget cap of {cap_usd} USD reached (spent {spent_usd} USD)")]
    BudgetExhausted {
        /// Configured hard cap, in USD.
        cap_usd: f64,
        /// Cumulative spend at the time of the check, in USD.
        spent_usd: f64,
    },
    /// A dangerous operation was attempted and the step was halted.
    #[error("dangerous operation blocked: {0}")]
    DangerousOperation(String),
}

impl Classify for EngineError {
    fn classify(&self) -> FailureClass {
        match self {
            Self::Session(SessionError::Closed(_)) | Self::Store(StoreError::Conflict(_)) => FailureClass::Transient,
            Self::Session(SessionError::Backend(_)) | Self::Scan(ScanError::ToolFailed(_)) => FailureClass::Retriable,
            Self::Session(SessionError::UnknownBackend(_))
            | Self::Scan(ScanError::Unparseable(_))
            | Self::PreflightFailed(_)
            | Self::RoutingLog(_)
            | Self::MicroloopExhausted(_)
            | Self::Store(StoreError::Invalid(_) | StoreError::VersionMismatch(_)) => FailureClass::Permanent,
            Self::Store(StoreError::Io(_) | StoreError::Corrupt(_))
            | Self::Vcs(_)
            | Self::InterruptionStackOverflow { .. }
            | Self::BudgetExhausted { .. }
            | Self::DangerousOperation(_) => FailureClass::Fatal,
        }
    }
}
