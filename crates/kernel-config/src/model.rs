// crates/kernel-config/src/model.rs
// ============================================================================
// Module: Installation Config Model
// Description: The kernel's global, run-immutable installation settings.
// Purpose: Give every crate one canonical source for the installation root,
//          the model-price table path, the budget fuse, and the microloop
//          and stall defaults, instead of scattering constants per crate.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`KernelConfig`] is read once at process start, validated, and then
//! snapshotted into a run's metadata so the rest of that run's lifetime sees
//! an immutable view even if the installation's on-disk config changes
//! underneath it.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;

/// Global installation configuration.
///
/// # Invariants
/// - `hard_budget_cap_usd` is strictly positive.
/// - `default_microloop_max_iterations` and `default_stall_window` are at least 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Root directory runs and flow artifacts are written under.
    pub install_root: PathBuf,
    /// Path to the model-tier price table used by the cost tracker.
    pub price_table_path: PathBuf,
    /// Hard budget cap in USD; a run aborts once cumulative cost crosses it.
    pub hard_budget_cap_usd: f64,
    /// Default maximum iterations for a microloop-edge step.
    pub default_microloop_max_iterations: u32,
    /// Default number of repeated identical failure signatures before a stall is declared.
    pub default_stall_window: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            install_root: PathBuf::from("."),
            price_table_path: PathBuf::from("prices.toml"),
            hard_budget_cap_usd: 50.0,
            default_microloop_max_iterations: 3,
            default_stall_window: 3,
        }
    }
}

impl KernelConfig {
    /// Validates that every field is within its documented range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first field out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.hard_budget_cap_usd.is_finite() && self.hard_budget_cap_usd > 0.0) {
            return Err(ConfigError::Invalid("hard_budget_cap_usd must be greater than zero".to_string()));
        }
        if self.default_microloop_max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "default_microloop_max_iterations must be at least 1".to_string(),
            ));
        }
        if self.default_stall_window == 0 {
            return Err(ConfigError::Invalid("default_stall_window must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Resolves `relative` against [`KernelConfig::install_root`].
    #[must_use]
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.install_root.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        KernelConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn a_zero_budget_cap_is_rejected() {
        let mut config = KernelConfig::default();
        config.hard_budget_cap_usd = 0.0;
        let err = config.validate().expect_err("rejected");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn a_zero_microloop_max_is_rejected() {
        let mut config = KernelConfig::default();
        config.default_microloop_max_iterations = 0;
        config.validate().expect_err("rejected");
    }

    #[test]
    fn a_zero_stall_window_is_rejected() {
        let mut config = KernelConfig::default();
        config.default_stall_window = 0;
        config.validate().expect_err("rejected");
    }

    #[test]
    fn resolve_joins_against_the_install_root() {
        let mut config = KernelConfig::default();
        config.install_root = PathBuf::from("/var/kernel");
        assert_eq!(config.resolve("runs/r-1"), PathBuf::from("/var/kernel/runs/r-1"));
    }
}
