// crates/kernel-contract/src/schemas.rs
// ============================================================================
// Module: Wire Schemas
// Description: JSON Schema definitions for the three persisted wire records.
// Purpose: Give validators and documentation a single canonical source for
//          the shape of events.jsonl lines, handoff envelopes, and routing
//          decision log lines.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Each schema here matches the run directory layout's external interface:
//! one event per `events.jsonl` line, one envelope per completed step, and
//! one routing decision per `routing/decisions.jsonl` line. They are plain
//! data (`serde_json::Value`) so they can be embedded in a contract bundle,
//! fed to a JSON Schema validator, or written out for external tooling.

use serde_json::json;
use serde_json::Value;

/// Returns the JSON Schema for one `events.jsonl` line.
#[must_use]
pub fn event_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["schema_version", "seq", "ts", "kind", "flow_key", "payload"],
        "properties": {
            "schema_version": { "type": "string", "pattern": "^\\d+\\.\\d+\\.\\d+$" },
            "seq": { "type": "integer", "minimum": 0 },
            "ts": { "type": "string" },
            "kind": { "type": "string" },
            "flow_key": { "type": "string" },
            "step_id": { "type": ["string", "null"] },
            "agent_key": { "type": ["string", "null"] },
            "payload": { "type": "object" }
        },
        "additionalProperties": false
    })
}

/// Returns the JSON Schema for one completed-step handoff envelope.
#[must_use]
pub fn envelope_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["schema_version", "meta", "status", "summary", "concerns", "assumptions", "file_changes", "routing"],
        "properties": {
            "schema_version": { "type": "string", "pattern": "^\\d+\\.\\d+\\.\\d+$" },
            "meta": {
                "type": "object",
                "required": ["step_id", "flow_key", "run_id", "agent_key"],
                "properties": {
                    "step_id": { "type": "string" },
                    "flow_key": { "type": "string" },
                    "run_id": { "type": "string" },
                    "agent_key": { "type": "string" }
                }
            },
            "status": { "type": "string", "enum": ["VERIFIED", "UNVERIFIED", "BLOCKED"] },
            "summary": {
                "type": "object",
                "required": ["what_i_did", "what_i_found", "key_decisions", "evidence"],
                "properties": {
                    "what_i_did": { "type": "string" },
                    "what_i_found": { "type": "string" },
                    "key_decisions": { "type": "array", "items": { "type": "string" } },
                    "evidence": {
                        "type": "object",
                        "required": ["artifacts_produced", "commands_run", "measurements"],
                        "properties": {
                            "artifacts_produced": { "type": "array", "items": { "type": "string" } },
                            "commands_run": { "type": "array", "items": { "type": "string" } },
                            "measurements": { "type": "object" }
                        }
                    }
                }
            },
            "concerns": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["severity", "description", "location", "recommendation"],
                    "properties": {
                        "severity": { "type": "string", "enum": ["HIGH", "MEDIUM", "LOW"] },
                        "description": { "type": "string" },
                        "location": { "type": "string" },
                        "recommendation": { "type": "string" }
                    }
                }
            },
            "assumptions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["assumption", "why", "impact_if_wrong"],
                    "properties": {
                        "assumption": { "type": "string" },
                        "why": { "type": "string" },
                        "impact_if_wrong": { "type": "string" }
                    }
                }
            },
            "file_changes": {
                "type": "object",
                "required": ["files", "totals"],
                "properties": {
                    "files": { "type": "array", "items": { "type": "string" } },
                    "totals": { "type": "object" }
                }
            },
            "routing": {
                "type": "object",
                "required": ["recommendation", "reason"],
                "properties": {
                    "recommendation": { "type": "string" },
                    "reason": { "type": "string" },
                    "next_step_suggestion": { "type": "string" },
                    "can_further_iteration_help": { "type": "boolean" }
                }
            }
        }
    })
}

/// Returns the JSON Schema for one `routing/decisions.jsonl` line.
#[must_use]
pub fn routing_decision_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["schema_version", "ts", "run_id", "flow_key", "step_id", "decision", "target", "reason", "forensic_digest", "iteration", "signature_matched", "confidence", "source"],
        "properties": {
            "schema_version": { "type": "string", "pattern": "^\\d+\\.\\d+\\.\\d+$" },
            "ts": { "type": "string" },
            "run_id": { "type": "string" },
            "flow_key": { "type": "string" },
            "step_id": { "type": "string" },
            "decision": { "type": "string" },
            "target": { "type": "string" },
            "reason": { "type": "string" },
            "forensic_digest": { "type": "string" },
            "iteration": {
                "type": "object",
                "required": ["current", "max"],
                "properties": {
                    "current": { "type": "integer", "minimum": 0 },
                    "max": { "type": "integer", "minimum": 0 }
                }
            },
            "signature_matched": { "type": "boolean" },
            "confidence": { "type": "string", "enum": ["HIGH", "MEDIUM", "LOW"] },
            "source": { "type": "string", "enum": ["fast_path", "deterministic", "navigator", "envelope_fallback", "detour_catalog", "escalate"] }
        },
        "additionalProperties": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_schema_declares_its_own_draft() {
        for schema in [event_schema(), envelope_schema(), routing_decision_schema()] {
            assert!(schema.get("$schema").is_some());
        }
    }
}
