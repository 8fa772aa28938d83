// crates/kernel-core/src/lib.rs
// ============================================================================
// Crate: kernel-core
// Description: The shared data model and port traits for the orchestration kernel.
// Purpose: Give every other kernel crate a single, dependency-light vocabulary
//          for runs, flow graphs, envelopes, receipts, and events.
// Dependencies: kernel-logic, serde, thiserror
// ============================================================================

//! ## Overview
//! `kernel-core` holds no runtime logic of its own: it defines the data that
//! flows between the step engine, routing driver, forensic scanners, and
//! storage, plus the port traits those components implement against. Nothing
//! in this crate reads the clock or touches the filesystem.

/// Shared data model: runs, flow graphs, envelopes, receipts, and events.
pub mod core;
pub mod interfaces;
