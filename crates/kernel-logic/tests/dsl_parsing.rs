// crates/kernel-logic/tests/dsl_parsing.rs
// ============================================================================
// Module: Guard Condition DSL Integration Tests
// Description: Round-trip and error-path coverage for `parse_requirement`.
// Purpose: Guard the DSL grammar and its interaction with evaluation and
//          structural validation.
// Dependencies: kernel_logic
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    missing_docs,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::collections::HashMap;

use kernel_logic::TriState;
use kernel_logic::dsl::DslError;
use kernel_logic::dsl::parse_requirement;

fn symbols() -> HashMap<String, &'static str> {
    let mut map = HashMap::new();
    map.insert("tests_passed".to_string(), "tests_passed");
    map.insert("lint_clean".to_string(), "lint_clean");
    map.insert("coverage_met".to_string(), "coverage_met");
    map
}

#[test]
fn parses_infix_and_function_forms_identically() {
    let sym = symbols();
    let infix = parse_requirement("tests_passed && lint_clean", &sym).expect("infix parses");
    let func = parse_requirement("all(tests_passed, lint_clean)", &sym).expect("func parses");
    assert_eq!(infix, func);
}

#[test]
fn parses_at_least_group() {
    let sym = symbols();
    let tree = parse_requirement(
        "at_least(2, tests_passed, lint_clean, coverage_met)",
        &sym,
    )
    .expect("group parses");

    let resolve = |leaf: &&str| -> TriState {
        match *leaf {
            "tests_passed" => TriState::True,
            "lint_clean" => TriState::True,
            "coverage_met" => TriState::False,
            _ => TriState::Unknown,
        }
    };
    assert_eq!(tree.evaluate(&resolve), TriState::True);
}

#[test]
fn unknown_condition_is_rejected_at_parse_time() {
    let sym = symbols();
    let err = parse_requirement("flaky_condition", &sym).expect_err("unresolved symbol");
    assert!(matches!(err, DslError::UnknownCondition { .. }));
}

#[test]
fn empty_input_is_rejected() {
    let sym = symbols();
    assert_eq!(parse_requirement("", &sym), Err(DslError::EmptyInput));
    assert_eq!(parse_requirement("   ", &sym), Err(DslError::EmptyInput));
}

#[test]
fn trailing_input_after_expression_is_rejected() {
    let sym = symbols();
    let err = parse_requirement("tests_passed tests_passed", &sym).expect_err("trailing input");
    assert!(matches!(err, DslError::TrailingInput { .. }));
}

#[test]
fn negation_flips_the_leaf_value() {
    let sym = symbols();
    let tree = parse_requirement("!tests_passed", &sym).expect("negation parses");
    let resolve = |_leaf: &&str| TriState::True;
    assert_eq!(tree.evaluate(&resolve), TriState::False);
}

#[test]
fn deeply_nested_parentheses_hit_the_nesting_limit() {
    let sym = symbols();
    let mut expr = "tests_passed".to_string();
    for _ in 0 .. 40 {
        expr = format!("({expr})");
    }
    let err = parse_requirement(&expr, &sym).expect_err("nesting too deep");
    assert!(matches!(err, DslError::NestingTooDeep { .. }));
}
