//! Criteria evaluation.
//!
//! Evaluation is pure and synchronous. Internally every node yields one of
//! three outcomes: true, false, or indeterminate (a malformed node was
//! reached). Combinators follow three-valued logic, so a false child decides
//! an AND and a true child decides an OR regardless of malformed siblings,
//! and `$not` of an indeterminate node stays indeterminate. At the top an
//! indeterminate result is reported as no match.

use crate::criteria::{Comparison, Criterion, Operator};
use crate::facts::FactSnapshot;
use engage_codec::Value;
use tracing::warn;

/// Result of a traced evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Evaluation {
    /// Whether the criterion matched.
    pub matched: bool,
    /// Reasons of the malformed nodes that were reached.
    pub malformed: Vec<String>,
}

/// Evaluates `criterion` against `facts`.
///
/// Malformed nodes never match; reaching one logs a warning.
pub fn evaluate(criterion: &Criterion, facts: &FactSnapshot) -> bool {
    let evaluation = evaluate_traced(criterion, facts);
    for reason in &evaluation.malformed {
        warn!(reason = %reason, "malformed criteria node evaluated as no match");
    }
    evaluation.matched
}

/// Evaluates `criterion` and returns the malformed nodes it reached.
pub fn evaluate_traced(criterion: &Criterion, facts: &FactSnapshot) -> Evaluation {
    let mut malformed = Vec::new();
    let matched = eval(criterion, facts, &mut malformed) == Some(true);
    Evaluation { matched, malformed }
}

fn eval(node: &Criterion, facts: &FactSnapshot, malformed: &mut Vec<String>) -> Option<bool> {
    match node {
        Criterion::Compare(cmp) => Some(compare(cmp, facts)),
        Criterion::And(children) => {
            let mut result = Some(true);
            for child in children {
                match eval(child, facts, malformed) {
                    Some(false) => return Some(false),
                    None => result = None,
                    Some(true) => {}
                }
            }
            result
        }
        Criterion::Or(children) => {
            let mut result = Some(false);
            for child in children {
                match eval(child, facts, malformed) {
                    Some(true) => return Some(true),
                    None => result = None,
                    Some(false) => {}
                }
            }
            result
        }
        Criterion::Not(inner) => eval(inner, facts, malformed).map(|b| !b),
        Criterion::Malformed(reason) => {
            malformed.push(reason.clone());
            None
        }
    }
}

fn compare(cmp: &Comparison, facts: &FactSnapshot) -> bool {
    let actual = facts.lookup(cmp.path());
    let operand = cmp.operand();

    if cmp.op() == Operator::Exists {
        return actual.is_some() == operand.as_bool().unwrap_or(true);
    }

    let Some(actual) = actual else {
        return false;
    };

    match cmp.op() {
        Operator::Eq => values_equal(&actual, operand),
        Operator::Ne => !values_equal(&actual, operand),
        Operator::Gt => numeric(&actual, operand, |a, b| a > b),
        Operator::Gte => numeric(&actual, operand, |a, b| a >= b),
        Operator::Lt => numeric(&actual, operand, |a, b| a < b),
        Operator::Lte => numeric(&actual, operand, |a, b| a <= b),
        Operator::Contains => match (&actual, operand) {
            (Value::Text(haystack), Value::Text(needle)) => haystack.contains(needle.as_str()),
            (Value::Array(items), needle) => items.iter().any(|item| values_equal(item, needle)),
            _ => false,
        },
        Operator::StartsWith => text_pair(&actual, operand, |a, b| a.starts_with(b)),
        Operator::EndsWith => text_pair(&actual, operand, |a, b| a.ends_with(b)),
        Operator::EqNormalized => text_pair(&actual, operand, |a, b| normalize(a) == normalize(b)),
        Operator::Matches => match (actual.as_str(), cmp.pattern()) {
            (Some(text), Some(pattern)) => pattern.is_match(text),
            _ => false,
        },
        Operator::Exists => false,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn numeric(a: &Value, b: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => cmp(x, y),
        _ => false,
    }
}

fn text_pair(a: &Value, b: &Value, cmp: impl Fn(&str, &str) -> bool) -> bool {
    match (a.as_str(), b.as_str()) {
        (Some(x), Some(y)) => cmp(x, y),
        _ => false,
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}
