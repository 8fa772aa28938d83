// crates/kernel-contract/src/version.rs
// ============================================================================
// Module: Schema Versioning
// Description: Semver-style schema_version parsing and reader compatibility.
// Purpose: Let the kernel accept the current and previous major version of
//          each persisted wire record without code drifting out of lockstep
//          with what is actually on disk.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every persisted record (event, envelope, routing decision) carries a
//! `schema_version` field. A reader built against major version `N` accepts
//! records at major `N` and `N-1` (any minor/patch); anything older or newer
//! is rejected so a silent behavior change from an unreadable field layout
//! never slips through. Major-version migrations are handled by
//! [`crate::migrate`]; minor/patch differences are always backward compatible
//! by construction and need no migration.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Schema Version
// ============================================================================

/// A parsed `major.minor.patch` schema version.
///
/// # Invariants
/// - Renders back to exactly the `major.minor.patch` form it was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion {
    /// Major version; a bump here may require a migration.
    pub major: u32,
    /// Minor version; additive, backward-compatible changes.
    pub minor: u32,
    /// Patch version; no shape changes.
    pub patch: u32,
}

impl SchemaVersion {
    /// Constructs a version directly from its components.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Parses a `major.minor.patch` string.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::MalformedVersion`] when `raw` is not three
    /// dot-separated non-negative integers.
    pub fn parse(raw: &str) -> Result<Self, ContractError> {
        let parts: Vec<&str> = raw.split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(ContractError::MalformedVersion(raw.to_string()));
        };
        let parse_component = |component: &str| component.parse::<u32>().map_err(|_| ContractError::MalformedVersion(raw.to_string()));
        Ok(Self { major: parse_component(major)?, minor: parse_component(minor)?, patch: parse_component(patch)? })
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = ContractError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SchemaVersion> for String {
    fn from(value: SchemaVersion) -> Self {
        value.to_string()
    }
}

// ============================================================================
// SECTION: Record Kind
// ============================================================================

/// Which persisted wire record a version or schema applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// One line of `events.jsonl`.
    Event,
    /// A `<step_id>.json` handoff envelope.
    Envelope,
    /// One line of `routing/decisions.jsonl`.
    RoutingDecision,
}

impl RecordKind {
    /// The current schema version this build writes for `self`.
    #[must_use]
    pub const fn current_version(self) -> SchemaVersion {
        match self {
            Self::Event => SchemaVersion::new(1, 0, 0),
            Self::Envelope => SchemaVersion::new(1, 0, 0),
            Self::RoutingDecision => SchemaVersion::new(1, 0, 0),
        }
    }

    /// A short, stable label for error messages and artifact file names.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Envelope => "envelope",
            Self::RoutingDecision => "routing_decision",
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while validating or versioning a persisted record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractError {
    /// A `schema_version` field was not a well-formed `major.minor.patch` string.
    #[error("malformed schema_version: {0}")]
    MalformedVersion(String),
    /// A record's major version is neither the current nor the previous major.
    #[error("unsupported {kind} schema_version {found}: this build reads {current} and {current}-1.x.x")]
    UnsupportedVersion {
        /// Which record kind was being read.
        kind: &'static str,
        /// The version found on the record.
        found: SchemaVersion,
        /// The current major version this build writes.
        current: u32,
    },
    /// A record failed structural (JSON Schema) validation.
    #[error("{kind} record failed schema validation: {detail}")]
    SchemaViolation {
        /// Which record kind was being validated.
        kind: &'static str,
        /// Human-readable validation failure detail.
        detail: String,
    },
    /// A major-version migration was required but none is registered.
    #[error("no migration registered to bring a {kind} record from major {from} to {to}")]
    MigrationUnavailable {
        /// Which record kind needed migrating.
        kind: &'static str,
        /// The record's major version.
        from: u32,
        /// The build's current major version.
        to: u32,
    },
}

/// Validates that `found` is readable by a build whose current version for
/// `kind` is [`RecordKind::current_version`]: same major, or exactly one
/// major behind.
///
/// # Errors
///
/// Returns [`ContractError::UnsupportedVersion`] when `found`'s major version
/// is neither the current major nor `current_major - 1`.
pub fn validate_version(kind: RecordKind, found: SchemaVersion) -> Result<(), ContractError> {
    let current = kind.current_version();
    let is_current_major = found.major == current.major;
    let is_previous_major = current.major > 0 && found.major == current.major - 1;
    if is_current_major || is_previous_major {
        Ok(())
    } else {
        Err(ContractError::UnsupportedVersion { kind: kind.label(), found, current: current.major })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_version() {
        assert_eq!(SchemaVersion::parse("1.2.3").expect("parse"), SchemaVersion::new(1, 2, 3));
    }

    #[test]
    fn rejects_a_version_with_the_wrong_arity() {
        assert!(SchemaVersion::parse("1.2").is_err());
        assert!(SchemaVersion::parse("1.2.3.4").is_err());
    }

    #[test]
    fn current_major_is_always_accepted() {
        let current = RecordKind::Event.current_version();
        assert!(validate_version(RecordKind::Event, current).is_ok());
    }

    #[test]
    fn previous_major_is_accepted_regardless_of_minor_patch() {
        let previous = SchemaVersion::new(RecordKind::Event.current_version().major.saturating_sub(1).max(0), 9, 9);
        if RecordKind::Event.current_version().major > 0 {
            assert!(validate_version(RecordKind::Event, previous).is_ok());
        }
    }

    #[test]
    fn two_majors_behind_is_rejected() {
        let current = RecordKind::Event.current_version();
        let ancient = SchemaVersion::new(current.major.wrapping_add(2), 0, 0);
        assert!(validate_version(RecordKind::Event, ancient).is_err());
    }

    #[test]
    fn a_future_major_is_rejected() {
        let current = RecordKind::Event.current_version();
        let future = SchemaVersion::new(current.major + 1, 0, 0);
        assert!(validate_version(RecordKind::Event, future).is_err());
    }
}
