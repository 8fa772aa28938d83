// crates/kernel-contract/src/lib.rs
// ============================================================================
// Module: Contract Library
// Description: Schema versioning and structural validation for the kernel's
//              persisted wire records.
// Purpose: Keep readers and writers of events.jsonl, handoff envelopes, and
//          routing decision logs in lockstep without coupling storage,
//          transport, or routing directly to JSON Schema.
// Dependencies: jsonschema, kernel-core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! `kernel-contract` is the kernel's schema authority: it defines the JSON
//! Schema for each persisted record kind, enforces the N / N-1 major-version
//! reader compatibility rule described in the run directory layout's external
//! interface, and bundles the schemas for external tooling.

pub mod bundle;
pub mod schemas;
pub mod validate;
pub mod version;

pub use bundle::build_bundle;
pub use bundle::SchemaBundle;
pub use bundle::SchemaBundleEntry;
pub use validate::validate_record;
pub use version::validate_version;
pub use version::ContractError;
pub use version::RecordKind;
pub use version::SchemaVersion;
