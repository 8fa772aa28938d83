// crates/kernel-contract/src/validate.rs
// ============================================================================
// Module: Record Validation
// Description: Structural (JSON Schema) and version validation for persisted
//              wire records.
// Purpose: Give storage and replay a single fail-closed gate before trusting
//          a record read back off disk.
// Dependencies: jsonschema, serde_json
// ============================================================================

//! ## Overview
//! A record is accepted only if both checks pass: its `schema_version` field
//! names a major version this build reads ([`crate::version::validate_version`]),
//! and its shape conforms to the matching JSON Schema. Version is checked
//! first since a schema mismatch on an unsupported version is a less useful
//! error than naming the version problem directly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use jsonschema::Draft;
use jsonschema::Validator;
use serde_json::Value;

use crate::schemas;
use crate::version::validate_version;
use crate::version::ContractError;
use crate::version::RecordKind;
use crate::version::SchemaVersion;

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates `record` against `kind`'s current schema, after checking that
/// its `schema_version` field is within this build's supported range.
///
/// # Errors
///
/// Returns [`ContractError::MalformedVersion`] when `schema_version` is
/// missing or not well-formed, [`ContractError::UnsupportedVersion`] when its
/// major version falls outside the supported window, and
/// [`ContractError::SchemaViolation`] when the record's shape does not match.
pub fn validate_record(kind: RecordKind, record: &Value) -> Result<(), ContractError> {
    let raw_version = record
        .get("schema_version")
        .and_then(Value::as_str)
        .ok_or_else(|| ContractError::MalformedVersion("schema_version field missing".to_string()))?;
    let version = SchemaVersion::parse(raw_version)?;
    validate_version(kind, version)?;

    let schema = schema_for(kind);
    let compiled = compile(kind, &schema)?;
    if compiled.is_valid(record) {
        Ok(())
    } else {
        let detail = compiled.iter_errors(record).map(|err| err.to_string()).collect::<Vec<_>>().join("; ");
        Err(ContractError::SchemaViolation { kind: kind.label(), detail })
    }
}

fn schema_for(kind: RecordKind) -> Value {
    match kind {
        RecordKind::Event => schemas::event_schema(),
        RecordKind::Envelope => schemas::envelope_schema(),
        RecordKind::RoutingDecision => schemas::routing_decision_schema(),
    }
}

fn compile(kind: RecordKind, schema: &Value) -> Result<Validator, ContractError> {
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|err| ContractError::SchemaViolation { kind: kind.label(), detail: format!("invalid schema definition: {err}") })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn valid_event() -> Value {
        json!({
            "schema_version": "1.0.0",
            "seq": 1,
            "ts": "2026-08-01T00:00:00Z",
            "kind": "run_started",
            "flow_key": "demo",
            "step_id": null,
            "agent_key": null,
            "payload": {}
        })
    }

    #[test]
    fn a_well_formed_current_version_event_validates() {
        validate_record(RecordKind::Event, &valid_event()).expect("valid");
    }

    #[test]
    fn a_missing_schema_version_is_rejected() {
        let mut event = valid_event();
        event.as_object_mut().expect("object").remove("schema_version");
        let err = validate_record(RecordKind::Event, &event).expect_err("rejected");
        assert!(matches!(err, ContractError::MalformedVersion(_)));
    }

    #[test]
    fn a_future_major_version_is_rejected_before_schema_checking() {
        let mut event = valid_event();
        event["schema_version"] = json!("99.0.0");
        let err = validate_record(RecordKind::Event, &event).expect_err("rejected");
        assert!(matches!(err, ContractError::UnsupportedVersion { .. }));
    }

    #[test]
    fn a_missing_required_field_is_a_schema_violation() {
        let mut event = valid_event();
        event.as_object_mut().expect("object").remove("kind");
        let err = validate_record(RecordKind::Event, &event).expect_err("rejected");
        assert!(matches!(err, ContractError::SchemaViolation { .. }));
    }
}
