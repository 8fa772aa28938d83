// crates/kernel-config/src/load.rs
// ============================================================================
// Module: Config Loading
// Description: Fail-closed TOML loading with environment variable overrides.
// Purpose: Read installation config from disk (or fall back to documented
//          defaults) without trusting path length, file size, or encoding.
// Dependencies: kernel-config::error, kernel-config::model, toml
// ============================================================================

//! ## Overview
//! [`load`] reads a `kernel.toml` from an explicit path (or skips straight to
//! defaults if none is given), rejecting paths and files that exceed the
//! guard-rail limits before ever parsing them. Environment variables then
//! override individual fields, and the result is validated once before use.

use std::env;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::model::KernelConfig;

const MAX_PATH_BYTES: usize = 4_096;
const MAX_PATH_COMPONENT_BYTES: usize = 255;
const MAX_FILE_BYTES: u64 = 1_048_576;

const ENV_INSTALL_ROOT: &str = "KERNEL_INSTALL_ROOT";
const ENV_PRICE_TABLE_PATH: &str = "KERNEL_PRICE_TABLE_PATH";
const ENV_HARD_BUDGET_CAP_USD: &str = "KERNEL_HARD_BUDGET_CAP_USD";
const ENV_MICROLOOP_MAX_ITERATIONS: &str = "KERNEL_MICROLOOP_MAX_ITERATIONS";
const ENV_STALL_WINDOW: &str = "KERNEL_STALL_WINDOW";

/// Loads installation config from `path`, falling back to documented
/// defaults for any field neither the file nor the environment sets.
///
/// # Errors
///
/// Returns [`ConfigError`] when `path` or its contents fail a guard rail, the
/// TOML cannot be parsed, an environment override is malformed, or the
/// resulting config fails [`KernelConfig::validate`].
pub fn load(path: Option<&Path>) -> Result<KernelConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_toml_file(path)?,
        None => KernelConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn read_toml_file(path: &Path) -> Result<KernelConfig, ConfigError> {
    let path_str = path.to_string_lossy();
    if path_str.len() > MAX_PATH_BYTES {
        return Err(ConfigError::PathTooLong);
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_BYTES {
            return Err(ConfigError::PathComponentTooLong);
        }
    }
    let metadata = fs::metadata(path).map_err(|err| ConfigError::Io(err.to_string()))?;
    if metadata.len() > MAX_FILE_BYTES {
        return Err(ConfigError::FileTooLarge);
    }
    let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|_| ConfigError::NotUtf8)?;
    toml::from_str(&text).map_err(|err| ConfigError::Parse(err.to_string()))
}

fn apply_env_overrides(config: &mut KernelConfig) -> Result<(), ConfigError> {
    if let Ok(value) = env::var(ENV_INSTALL_ROOT) {
        config.install_root = value.into();
    }
    if let Ok(value) = env::var(ENV_PRICE_TABLE_PATH) {
        config.price_table_path = value.into();
    }
    if let Ok(value) = env::var(ENV_HARD_BUDGET_CAP_USD) {
        config.hard_budget_cap_usd = value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
            variable: ENV_HARD_BUDGET_CAP_USD,
            detail: format!("{value:?} is not a valid number"),
        })?;
    }
    if let Ok(value) = env::var(ENV_MICROLOOP_MAX_ITERATIONS) {
        config.default_microloop_max_iterations =
            value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                variable: ENV_MICROLOOP_MAX_ITERATIONS,
                detail: format!("{value:?} is not a valid integer"),
            })?;
    }
    if let Ok(value) = env::var(ENV_STALL_WINDOW) {
        config.default_stall_window = value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
            variable: ENV_STALL_WINDOW,
            detail: format!("{value:?} is not a valid integer"),
        })?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(unsafe_code, reason = "env::set_var/remove_var require unsafe in this edition; test-only env mutation")]
mod tests {
    use std::sync::Mutex;

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn loading_with_no_path_returns_defaults() {
        let config = load(None).expect("defaults");
        assert_eq!(config, KernelConfig::default());
    }

    #[test]
    fn an_overlong_path_is_rejected() {
        let long_path = "a".repeat(5_000);
        let err = load(Some(Path::new(&long_path))).expect_err("rejected");
        assert!(matches!(err, ConfigError::PathTooLong));
    }

    #[test]
    fn an_overlong_path_component_is_rejected() {
        let long_component = "a".repeat(300);
        let err = load(Some(Path::new(&long_component))).expect_err("rejected");
        assert!(matches!(err, ConfigError::PathComponentTooLong));
    }

    #[test]
    fn env_override_replaces_the_default_budget_cap() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        unsafe {
            env::set_var(ENV_HARD_BUDGET_CAP_USD, "12.5");
        }
        let config = load(None).expect("loaded");
        unsafe {
            env::remove_var(ENV_HARD_BUDGET_CAP_USD);
        }
        assert!((config.hard_budget_cap_usd - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn a_non_numeric_budget_cap_override_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        unsafe {
            env::set_var(ENV_HARD_BUDGET_CAP_USD, "not-a-number");
        }
        let err = load(None).expect_err("rejected");
        unsafe {
            env::remove_var(ENV_HARD_BUDGET_CAP_USD);
        }
        assert!(matches!(err, ConfigError::InvalidEnvOverride { .. }));
    }

    #[test]
    fn loading_a_real_file_parses_its_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("kernel.toml");
        std::fs::write(&config_path, "hard_budget_cap_usd = 9.0\ndefault_stall_window = 5\n").expect("write config");

        let config = load(Some(&config_path)).expect("loaded");

        assert!((config.hard_budget_cap_usd - 9.0).abs() < f64::EPSILON);
        assert_eq!(config.default_stall_window, 5);
    }

    #[test]
    fn loading_a_missing_file_path_falls_back_to_env_and_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("does-not-exist.toml");

        let err = load(Some(&config_path)).expect_err("missing file is an error, not a silent default");
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
