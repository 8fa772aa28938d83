// crates/kernel-config/src/error.rs
// ============================================================================
// Module: Config Errors
// Description: Fail-closed error type for config loading and validation.
// Purpose: Reject malformed or out-of-range installation config before it
//          reaches a run, with messages specific enough to test against.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Errors produced while loading or validating installation configuration.
///
/// # Invariants
/// - Variants are stable for programmatic handling and message matching.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config path exceeds the maximum accepted length.
    #[error("config path exceeds max length")]
    PathTooLong,
    /// A single path component exceeds the maximum accepted length.
    #[error("config path component too long")]
    PathComponentTooLong,
    /// The config file exceeds the maximum accepted size.
    #[error("config file exceeds size limit")]
    FileTooLarge,
    /// The config file's bytes are not valid UTF-8.
    #[error("config file must be utf-8")]
    NotUtf8,
    /// Reading the config file failed.
    #[error("config io error: {0}")]
    Io(String),
    /// The config file's TOML could not be parsed.
    #[error("config parse error: {0}")]
    Parse(String),
    /// An environment variable override could not be parsed.
    #[error("invalid environment override {variable}: {detail}")]
    InvalidEnvOverride {
        /// The environment variable name.
        variable: &'static str,
        /// What was wrong with its value.
        detail: String,
    },
    /// The loaded config failed a validation rule.
    #[error("invalid config: {0}")]
    Invalid(String),
}
