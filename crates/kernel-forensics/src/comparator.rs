// crates/kernel-forensics/src/comparator.rs
// ============================================================================
// Module: Scan Comparator Logic
// Description: Comparator evaluation for forensic scan findings.
// Purpose: Convert raw scan findings into the tri-state condition outcomes a
//          flow guard can evaluate.
// Dependencies: kernel_logic, bigdecimal, time, serde_json
// ============================================================================

//! ## Overview
//! A scanner (diff scanner, test parser) produces raw findings; a
//! [`ScanCheck`] names a condition key and the comparator used to turn a
//! finding into a tri-state outcome. Missing or unparseable findings yield
//! `Unknown` to preserve fail-closed behavior. Numeric ordering is
//! decimal-aware and deterministic so guard evaluation never depends on
//! floating-point rounding.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use kernel_logic::TriState;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Number;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::Date;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Comparator
// ============================================================================

/// How a scan finding is compared against an expected value to produce a
/// condition outcome.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// True when the finding produced a value at all.
    Exists,
    /// True when the finding produced no value.
    NotExists,
    /// Decimal- or structure-aware equality.
    Equals,
    /// Decimal- or structure-aware inequality.
    NotEquals,
    /// Numeric or temporal greater-than.
    GreaterThan,
    /// Numeric or temporal greater-than-or-equal.
    GreaterThanOrEqual,
    /// Numeric or temporal less-than.
    LessThan,
    /// Numeric or temporal less-than-or-equal.
    LessThanOrEqual,
    /// Lexicographic string greater-than.
    LexGreaterThan,
    /// Lexicographic string greater-than-or-equal.
    LexGreaterThanOrEqual,
    /// Lexicographic string less-than.
    LexLessThan,
    /// Lexicographic string less-than-or-equal.
    LexLessThanOrEqual,
    /// Substring or array-containment check.
    Contains,
    /// Set-membership check.
    InSet,
    /// Deep structural equality for arrays and objects.
    DeepEquals,
    /// Deep structural inequality for arrays and objects.
    DeepNotEquals,
}

// ============================================================================
// SECTION: Finding
// ============================================================================

/// The raw value a scanner produced for one condition key.
///
/// # Invariants
/// - `None` represents a finding that could not be produced at all.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanValue {
    /// A JSON-representable finding value.
    Json(Value),
    /// A raw-byte finding value, for content comparisons that bypass JSON.
    Bytes(Vec<u8>),
}

/// A single scan finding for one condition key.
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::derive_partial_eq_without_eq, reason = "ScanValue wraps serde_json::Value, which has no Eq impl")]
pub struct ScanFinding {
    /// The finding's value, or `None` if it could not be produced.
    pub value: Option<ScanValue>,
}

/// Names a condition and the comparator used to evaluate its finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanCheck {
    /// Guard condition key this check feeds.
    pub condition_key: String,
    /// Comparator applied to the finding.
    pub comparator: Comparator,
    /// Expected value the finding is compared against, when the comparator needs one.
    pub expected: Option<Value>,
}

// ============================================================================
// SECTION: Comparator Evaluation
// ============================================================================

/// Evaluates a comparator against a scan finding.
#[must_use]
pub fn evaluate_comparator(comparator: Comparator, expected: Option<&Value>, finding: &ScanFinding) -> TriState {
    match comparator {
        Comparator::Exists => {
            if finding.value.is_some() {
                TriState::True
            } else {
                TriState::False
            }
        }
        Comparator::NotExists => {
            if finding.value.is_some() {
                TriState::False
            } else {
                TriState::True
            }
        }
        _ => evaluate_value_comparator(comparator, expected, finding),
    }
}

/// Evaluates comparators against a finding's value.
fn evaluate_value_comparator(comparator: Comparator, expected: Option<&Value>, finding: &ScanFinding) -> TriState {
    let Some(value) = &finding.value else {
        return TriState::Unknown;
    };

    match value {
        ScanValue::Json(json) => evaluate_json_comparator(comparator, expected, json),
        ScanValue::Bytes(bytes) => evaluate_bytes_comparator(comparator, expected, bytes),
    }
}

/// Evaluates JSON comparators against a JSON value.
fn evaluate_json_comparator(comparator: Comparator, expected: Option<&Value>, finding: &Value) -> TriState {
    let Some(expected) = expected else {
        return TriState::Unknown;
    };

    match comparator {
        Comparator::Equals => compare_equals(finding, expected),
        Comparator::NotEquals => compare_not_equals(finding, expected),
        Comparator::GreaterThan | Comparator::GreaterThanOrEqual | Comparator::LessThan | Comparator::LessThanOrEqual => {
            compare_ordering(comparator, finding, expected)
        }
        Comparator::LexGreaterThan | Comparator::LexGreaterThanOrEqual | Comparator::LexLessThan | Comparator::LexLessThanOrEqual => {
            compare_lexicographic(comparator, finding, expected)
        }
        Comparator::Contains => compare_contains(finding, expected),
        Comparator::InSet => compare_in_set(finding, expected),
        Comparator::DeepEquals => compare_deep_equals(finding, expected),
        Comparator::DeepNotEquals => compare_deep_not_equals(finding, expected),
        Comparator::Exists | Comparator::NotExists => TriState::Unknown,
    }
}

/// Evaluates byte-array comparators against finding bytes.
fn evaluate_bytes_comparator(comparator: Comparator, expected: Option<&Value>, bytes: &[u8]) -> TriState {
    let Some(expected) = expected else {
        return TriState::Unknown;
    };

    let expected_bytes = match expected {
        Value::Array(values) => {
            let mut out = Vec::with_capacity(values.len());
            for value in values {
                let Some(byte) = value.as_u64() else {
                    return TriState::Unknown;
                };
                let Ok(byte) = u8::try_from(byte) else {
                    return TriState::Unknown;
                };
                out.push(byte);
            }
            out
        }
        _ => return TriState::Unknown,
    };

    match comparator {
        Comparator::Equals => TriState::from(bytes == expected_bytes.as_slice()),
        Comparator::NotEquals => TriState::from(bytes != expected_bytes.as_slice()),
        _ => TriState::Unknown,
    }
}

/// Compares JSON values for equality, with decimal-aware numeric handling.
fn compare_equals(left: &Value, right: &Value) -> TriState {
    match (left, right) {
        (Value::Number(left_num), Value::Number(right_num)) => compare_decimal_equality(left_num, right_num, true),
        _ => TriState::from(left == right),
    }
}

/// Compares JSON values for inequality, with decimal-aware numeric handling.
fn compare_not_equals(left: &Value, right: &Value) -> TriState {
    match (left, right) {
        (Value::Number(left_num), Value::Number(right_num)) => compare_decimal_equality(left_num, right_num, false),
        _ => TriState::from(left != right),
    }
}

/// Compares numeric or temporal JSON values using ordering comparators.
fn compare_ordering(comparator: Comparator, left: &Value, right: &Value) -> TriState {
    if let (Some(left_num), Some(right_num)) = (left.as_number(), right.as_number()) {
        return match decimal_cmp(left_num, right_num) {
            Some(ordering) => TriState::from(ordering_matches(comparator, ordering)),
            None => TriState::Unknown,
        };
    }

    if let (Value::String(left), Value::String(right)) = (left, right)
        && let Some(ordering) = temporal_cmp(left, right)
    {
        return TriState::from(ordering_matches(comparator, ordering));
    }

    TriState::Unknown
}

/// Maps an ordering result onto the requested ordering comparator.
fn ordering_matches(comparator: Comparator, ordering: Ordering) -> bool {
    match comparator {
        Comparator::GreaterThan => ordering.is_gt(),
        Comparator::GreaterThanOrEqual => ordering.is_ge(),
        Comparator::LessThan => ordering.is_lt(),
        Comparator::LessThanOrEqual => ordering.is_le(),
        _ => false,
    }
}

/// Compares string values using lexicographic ordering.
fn compare_lexicographic(comparator: Comparator, left: &Value, right: &Value) -> TriState {
    let (Value::String(left), Value::String(right)) = (left, right) else {
        return TriState::Unknown;
    };
    let ordering = left.cmp(right);
    let result = match comparator {
        Comparator::LexGreaterThan => ordering.is_gt(),
        Comparator::LexGreaterThanOrEqual => ordering.is_ge(),
        Comparator::LexLessThan => ordering.is_lt(),
        Comparator::LexLessThanOrEqual => ordering.is_le(),
        _ => return TriState::Unknown,
    };
    TriState::from(result)
}

/// Compares arrays/objects using deep structural equality.
fn compare_deep_equals(left: &Value, right: &Value) -> TriState {
    match (left, right) {
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => TriState::from(left == right),
        _ => TriState::Unknown,
    }
}

/// Compares arrays/objects using deep structural inequality.
fn compare_deep_not_equals(left: &Value, right: &Value) -> TriState {
    match (left, right) {
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => TriState::from(left != right),
        _ => TriState::Unknown,
    }
}

/// Evaluates containment semantics for JSON values.
fn compare_contains(left: &Value, right: &Value) -> TriState {
    match (left, right) {
        (Value::String(haystack), Value::String(needle)) => TriState::from(haystack.contains(needle.as_str())),
        (Value::Array(haystack), Value::Array(needle)) => {
            TriState::from(needle.iter().all(|item| haystack.contains(item)))
        }
        _ => TriState::Unknown,
    }
}

/// Evaluates set membership for JSON values.
fn compare_in_set(value: &Value, expected: &Value) -> TriState {
    let Value::Array(values) = expected else {
        return TriState::Unknown;
    };
    match value {
        Value::Array(_) | Value::Object(_) => TriState::Unknown,
        _ => TriState::from(values.contains(value)),
    }
}

/// Compares numbers by parsing them into `BigDecimal` values.
fn compare_decimal_equality(left: &Number, right: &Number, equals: bool) -> TriState {
    let Some(left) = decimal_from_number(left) else {
        return TriState::Unknown;
    };
    let Some(right) = decimal_from_number(right) else {
        return TriState::Unknown;
    };
    TriState::from(if equals { left == right } else { left != right })
}

/// Orders numeric JSON values using decimal-aware comparison.
fn decimal_cmp(left: &Number, right: &Number) -> Option<Ordering> {
    let left = decimal_from_number(left)?;
    let right = decimal_from_number(right)?;
    Some(left.cmp(&right))
}

/// Parses a JSON number into `BigDecimal` with a stable string representation.
fn decimal_from_number(number: &Number) -> Option<BigDecimal> {
    BigDecimal::from_str(&number.to_string()).ok()
}

/// Compares RFC3339 date-time or date-only strings.
fn temporal_cmp(left: &str, right: &str) -> Option<Ordering> {
    if let (Ok(left), Ok(right)) = (OffsetDateTime::parse(left, &Rfc3339), OffsetDateTime::parse(right, &Rfc3339)) {
        return Some(left.cmp(&right));
    }
    let left = parse_rfc3339_date(left)?;
    let right = parse_rfc3339_date(right)?;
    Some(left.cmp(&right))
}

/// Parses an RFC3339 date-only value (YYYY-MM-DD).
fn parse_rfc3339_date(value: &str) -> Option<Date> {
    let mut parts = value.split('-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u8 = parts.next()?.parse().ok()?;
    let day: u8 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let month = time::Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::evaluate_comparator;
    use super::Comparator;
    use super::ScanFinding;
    use super::ScanValue;
    use kernel_logic::TriState;

    fn finding(value: Value) -> ScanFinding {
        ScanFinding {
            value: Some(ScanValue::Json(value)),
        }
    }

    use serde_json::Value;

    #[test]
    fn exists_is_true_when_a_value_is_present() {
        let found = finding(json!(true));
        assert_eq!(evaluate_comparator(Comparator::Exists, None, &found), TriState::True);
    }

    #[test]
    fn missing_finding_is_unknown_for_ordering_comparators() {
        let missing = ScanFinding { value: None };
        let expected = json!(1);
        assert_eq!(
            evaluate_comparator(Comparator::GreaterThan, Some(&expected), &missing),
            TriState::Unknown
        );
    }

    #[test]
    fn decimal_equality_treats_one_point_zero_as_one() {
        let found = finding(json!(1.0));
        let expected = json!(1);
        assert_eq!(evaluate_comparator(Comparator::Equals, Some(&expected), &found), TriState::True);
    }

    #[test]
    fn greater_than_or_equal_holds_at_the_threshold() {
        let found = finding(json!(80));
        let expected = json!(80);
        assert_eq!(
            evaluate_comparator(Comparator::GreaterThanOrEqual, Some(&expected), &found),
            TriState::True
        );
    }
}
