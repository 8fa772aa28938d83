// crates/kernel-config/src/lib.rs
// ============================================================================
// Module: Kernel Config
// Description: Installation-wide configuration: root directory, price table
//              path, budget cap, and microloop/stall defaults.
// Purpose: Read once at process start, validate fail-closed, and snapshot
//          into each run's metadata so a run's lifetime sees an immutable view.
// Dependencies: serde, thiserror, toml
// ============================================================================

//! ## Overview
//! `kernel-config` owns the handful of settings every other crate treats as
//! ambient: where runs live on disk, where the cost tracker's price table
//! is, the hard budget fuse, and the defaults a flow graph's microloop edges
//! and stall detector fall back to when a node doesn't override them.

/// Markdown documentation generation for the config schema.
pub mod docs;
/// Error types for config loading and validation.
pub mod error;
pub mod load;
pub mod model;
/// JSON schema for validating the on-disk config format.
pub mod schema;

pub use docs::config_docs_markdown;
pub use error::ConfigError;
pub use load::load;
pub use model::KernelConfig;
pub use schema::config_schema;
pub use schema::config_toml_example;
