// crates/kernel-config/src/schema.rs
// ============================================================================
// Module: Config Schema and Example
// Description: JSON Schema and canonical TOML example for KernelConfig.
// Purpose: Prevent drift between the config model and the artifacts external
//          tooling (docs, editors) relies on to validate `kernel.toml`.
// Dependencies: serde_json
// ============================================================================

use serde_json::json;
use serde_json::Value;

/// Returns the JSON Schema describing a valid `kernel.toml`.
#[must_use]
pub fn config_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "properties": {
            "install_root": { "type": "string" },
            "price_table_path": { "type": "string" },
            "hard_budget_cap_usd": { "type": "number", "exclusiveMinimum": 0 },
            "default_microloop_max_iterations": { "type": "integer", "minimum": 1 },
            "default_stall_window": { "type": "integer", "minimum": 1 }
        },
        "additionalProperties": false
    })
}

/// Returns a canonical `kernel.toml` example matching [`crate::KernelConfig::default`].
#[must_use]
pub fn config_toml_example() -> String {
    let config = crate::model::KernelConfig::default();
    format!(
        "install_root = \"{}\"\n\
         price_table_path = \"{}\"\n\
         hard_budget_cap_usd = {}\n\
         default_microloop_max_iterations = {}\n\
         default_stall_window = {}\n",
        config.install_root.display(),
        config.price_table_path.display(),
        config.hard_budget_cap_usd,
        config.default_microloop_max_iterations,
        config.default_stall_window,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_schema_declares_its_own_draft() {
        assert!(config_schema().get("$schema").is_some());
    }

    #[test]
    fn the_toml_example_parses_back_into_the_default_config() {
        let config: crate::model::KernelConfig = toml::from_str(&config_toml_example()).expect("parses");
        assert_eq!(config, crate::model::KernelConfig::default());
    }

    fn compiled_schema() -> jsonschema::Validator {
        jsonschema::options().with_draft(jsonschema::Draft::Draft202012).build(&config_schema()).expect("schema compiles")
    }

    #[test]
    fn the_default_config_validates_against_its_own_schema() {
        let compiled = compiled_schema();
        let instance = serde_json::to_value(crate::model::KernelConfig::default()).expect("serializes");
        assert!(compiled.is_valid(&instance));
    }

    #[test]
    fn a_config_with_an_unknown_field_fails_the_schema() {
        let compiled = compiled_schema();
        let mut instance = serde_json::to_value(crate::model::KernelConfig::default()).expect("serializes");
        instance["unknown_field"] = json!("nope");
        assert!(!compiled.is_valid(&instance));
    }
}
