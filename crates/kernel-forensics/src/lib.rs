// crates/kernel-forensics/src/lib.rs
// ============================================================================
// Module: Forensics Library
// Description: Scanners and comparator logic that evaluate a step's returned work.
// Purpose: Convert diffs and test reports into the tri-state conditions a
//          flow graph's guard edges depend on, and detect stalled runs.
// Dependencies: kernel-core, kernel-logic, bigdecimal, time
// ============================================================================

//! ## Overview
//! `kernel-forensics` provides the kernel's reference [`ForensicScanner`]
//! implementations ([`DiffScanner`], [`TestParser`]), the comparator logic
//! that turns raw findings into tri-state outcomes, the [`verdict`] module
//! that rules on whether a finalized envelope's claims match what those
//! scanners actually measured, and progress/stall analysis over a run's
//! accumulated scan history.
//!
//! [`ForensicScanner`]: kernel_core::interfaces::ForensicScanner

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod comparator;
pub mod scanner;
pub mod stall;
pub mod verdict;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use comparator::evaluate_comparator;
pub use comparator::Comparator;
pub use comparator::ScanCheck;
pub use comparator::ScanFinding;
pub use comparator::ScanValue;
pub use scanner::DiffScanner;
pub use scanner::DiffStats;
pub use scanner::TestParser;
pub use scanner::TestReport;
pub use scanner::TestStats;
pub use stall::analyze;
pub use stall::ProgressDelta;
pub use stall::StallAnalysis;
pub use verdict::compare;
pub use verdict::Discrepancy;
pub use verdict::DiscrepancySeverity;
pub use verdict::ForensicVerdict;
pub use verdict::VerdictRecommendation;
