// crates/kernel-config/src/docs.rs
// ============================================================================
// Module: Config Docs Generation
// Description: Renders KernelConfig's fields as a Markdown reference table.
// Purpose: Keep the human-facing config reference generated from the same
//          source the schema and example are generated from.
// Dependencies: (none beyond std)
// ============================================================================

/// Renders a Markdown reference for every `kernel.toml` field.
///
/// # Errors
///
/// This never fails; the `Result` exists so callers can thread it through
/// the same fallible pipeline as [`crate::config_schema`] consumers without
/// special-casing docs generation.
pub fn config_docs_markdown() -> Result<String, crate::error::ConfigError> {
    let mut out = String::from("# kernel.toml Configuration\n\n");
    out.push_str("| Field | Meaning | Default |\n|---|---|---|\n");
    out.push_str("| `install_root` | Root directory runs and flow artifacts are written under. | `.` |\n");
    out.push_str(
        "| `price_table_path` | Path to the model-tier price table used by the cost tracker. | `prices.toml` |\n",
    );
    out.push_str(
        "| `hard_budget_cap_usd` | Cumulative cost, in USD, at which a run aborts. | `50.0` |\n",
    );
    out.push_str(
        "| `default_microloop_max_iterations` | Default retry ceiling for a microloop-edge step. | `3` |\n",
    );
    out.push_str(
        "| `default_stall_window` | Repeated identical failure signatures before a stall is declared. | `3` |\n",
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docs_generate_without_error() {
        let docs = config_docs_markdown().expect("docs");
        assert!(docs.contains("# kernel.toml Configuration"));
        assert!(docs.contains("hard_budget_cap_usd"));
    }
}
