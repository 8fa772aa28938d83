// crates/kernel-contract/src/bundle.rs
// ============================================================================
// Module: Schema Bundle
// Description: Hash-digested bundle of the three wire schemas.
// Purpose: Give external tooling (SDK generators, docs) one deterministic,
//          integrity-checked artifact set describing the kernel's on-disk
//          record shapes.
// Dependencies: kernel-core, serde_json
// ============================================================================

//! ## Overview
//! [`build_bundle`] assembles the event, envelope, and routing-decision
//! schemas into a manifest whose entries are ordered by record kind and
//! digested with the kernel's canonical content hash, so a consumer can
//! detect drift between the schema it has cached and the one this build
//! actually validates against.

// ============================================================================
// SECTION: Imports
// ============================================================================

use kernel_core::core::hash_value;
use kernel_core::core::HashDigest;
use serde::Serialize;
use serde_json::Value;

use crate::schemas;
use crate::version::ContractError;
use crate::version::RecordKind;
use crate::version::SchemaVersion;

// ============================================================================
// SECTION: Bundle Types
// ============================================================================

/// One schema entry in a [`SchemaBundle`].
#[derive(Debug, Clone, Serialize)]
pub struct SchemaBundleEntry {
    /// Which record kind this entry describes.
    pub kind: &'static str,
    /// The schema version this build currently writes.
    pub version: SchemaVersion,
    /// The JSON Schema payload itself.
    pub schema: Value,
    /// Canonical content hash of `schema`.
    pub digest: HashDigest,
}

/// A deterministic, hash-digested bundle of the kernel's wire schemas.
///
/// # Invariants
/// - `entries` are always ordered `Event`, `Envelope`, `RoutingDecision`.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaBundle {
    /// The crate version that produced this bundle.
    pub contract_version: &'static str,
    /// Schema entries, in stable kind order.
    pub entries: Vec<SchemaBundleEntry>,
}

/// Builds the canonical schema bundle for this build.
///
/// # Errors
///
/// Returns [`ContractError::SchemaViolation`] if a schema cannot be hashed
/// (only possible if `serde_json::Value` contains non-canonicalizable data,
/// which the schemas defined in this crate never do).
pub fn build_bundle() -> Result<SchemaBundle, ContractError> {
    let kinds = [RecordKind::Event, RecordKind::Envelope, RecordKind::RoutingDecision];
    let mut entries = Vec::with_capacity(kinds.len());
    for kind in kinds {
        let schema = match kind {
            RecordKind::Event => schemas::event_schema(),
            RecordKind::Envelope => schemas::envelope_schema(),
            RecordKind::RoutingDecision => schemas::routing_decision_schema(),
        };
        let digest = hash_value(&schema)
            .map_err(|err| ContractError::SchemaViolation { kind: kind.label(), detail: err.to_string() })?;
        entries.push(SchemaBundleEntry { kind: kind.label(), version: kind.current_version(), schema, digest });
    }
    Ok(SchemaBundle { contract_version: env!("CARGO_PKG_VERSION"), entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_entries_are_ordered_event_envelope_routing() {
        let bundle = build_bundle().expect("build");
        let labels: Vec<&str> = bundle.entries.iter().map(|entry| entry.kind).collect();
        assert_eq!(labels, vec!["event", "envelope", "routing_decision"]);
    }

    #[test]
    fn building_the_bundle_twice_produces_identical_digests() {
        let first = build_bundle().expect("build");
        let second = build_bundle().expect("build");
        for (a, b) in first.entries.iter().zip(second.entries.iter()) {
            assert_eq!(a.digest, b.digest);
        }
    }
}
