//! Criteria trees and their wire form.
//!
//! On the wire a criteria object is an implicit AND of its keys. `$and` and
//! `$or` take arrays of criteria objects, `$not` takes one criteria object,
//! and every other key is a fact path whose value is either a literal
//! (implicit `$eq`) or an object of operators:
//!
//! ```json
//! {
//!   "code_point/local#app#launch/invokes/total": { "$gte": 3 },
//!   "$or": [ { "person.name": { "$exists": true } }, { "custom_data.beta": true } ]
//! }
//! ```
//!
//! Parsing never fails. Anything that cannot be understood becomes a
//! [`Criterion::Malformed`] node, which never matches.

use crate::facts::FactPath;
use engage_codec::{from_json_value, Value};
use regex_lite::Regex;
use serde_json::Value as Json;
use std::fmt;

/// Comparison operator of a leaf node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Equal (numbers compare numerically).
    Eq,
    /// Not equal; false when the field is missing.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Substring, or array membership.
    Contains,
    /// String prefix.
    StartsWith,
    /// String suffix.
    EndsWith,
    /// Field presence (operand is a boolean).
    Exists,
    /// Equality after trimming and lowercasing both strings.
    EqNormalized,
    /// Regular expression match.
    Matches,
}

impl Operator {
    /// Parses a wire operator name such as `$gte`.
    pub fn from_wire(name: &str) -> Option<Self> {
        Some(match name {
            "$eq" => Operator::Eq,
            "$ne" => Operator::Ne,
            "$gt" => Operator::Gt,
            "$gte" => Operator::Gte,
            "$lt" => Operator::Lt,
            "$lte" => Operator::Lte,
            "$contains" => Operator::Contains,
            "$starts_with" => Operator::StartsWith,
            "$ends_with" => Operator::EndsWith,
            "$exists" => Operator::Exists,
            "$eq_normalized" => Operator::EqNormalized,
            "$matches" => Operator::Matches,
            _ => return None,
        })
    }

    /// The wire name of the operator.
    pub fn wire_name(self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::Contains => "$contains",
            Operator::StartsWith => "$starts_with",
            Operator::EndsWith => "$ends_with",
            Operator::Exists => "$exists",
            Operator::EqNormalized => "$eq_normalized",
            Operator::Matches => "$matches",
        }
    }

    fn check_operand(self, operand: &Value) -> Result<(), String> {
        let ok = match self {
            Operator::Eq | Operator::Ne => true,
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                operand.as_f64().is_some()
            }
            Operator::Contains => !operand.is_null(),
            Operator::StartsWith | Operator::EndsWith | Operator::EqNormalized => {
                operand.as_str().is_some()
            }
            Operator::Exists => operand.as_bool().is_some(),
            Operator::Matches => operand.as_str().is_some(),
        };
        if ok {
            Ok(())
        } else {
            Err(format!(
                "{} does not accept a {} operand",
                self.wire_name(),
                operand.type_name()
            ))
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A leaf comparison against one fact path.
#[derive(Debug, Clone)]
pub struct Comparison {
    path: FactPath,
    op: Operator,
    operand: Value,
    pattern: Option<Regex>,
}

impl Comparison {
    /// The fact path compared.
    pub fn path(&self) -> &FactPath {
        &self.path
    }

    /// The operator.
    pub fn op(&self) -> Operator {
        self.op
    }

    /// The literal operand.
    pub fn operand(&self) -> &Value {
        &self.operand
    }

    /// The compiled pattern of a [`Operator::Matches`] node.
    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }
}

impl PartialEq for Comparison {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.op == other.op && self.operand == other.operand
    }
}

/// A node of a criteria tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// Leaf comparison.
    Compare(Comparison),
    /// True when every child is true. An empty list is true.
    And(Vec<Criterion>),
    /// True when any child is true. An empty list is false.
    Or(Vec<Criterion>),
    /// Negation.
    Not(Box<Criterion>),
    /// A fragment that could not be understood, with the reason.
    Malformed(String),
}

impl Criterion {
    /// A criterion that always matches.
    pub fn always() -> Self {
        Criterion::And(Vec::new())
    }

    /// Builds a comparison node.
    ///
    /// Returns [`Criterion::Malformed`] if the operand does not suit the
    /// operator or a `$matches` pattern does not compile.
    pub fn compare(path: &str, op: Operator, operand: impl Into<Value>) -> Self {
        let operand = operand.into();
        if let Err(reason) = op.check_operand(&operand) {
            return Criterion::Malformed(format!("{path}: {reason}"));
        }
        let pattern = if op == Operator::Matches {
            match Regex::new(operand.as_str().unwrap_or_default()) {
                Ok(regex) => Some(regex),
                Err(e) => return Criterion::Malformed(format!("{path}: bad pattern: {e}")),
            }
        } else {
            None
        };
        Criterion::Compare(Comparison {
            path: FactPath::parse(path),
            op,
            operand,
            pattern,
        })
    }

    /// Negates a criterion.
    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Criterion) -> Self {
        Criterion::Not(Box::new(inner))
    }

    /// Parses a wire criteria object.
    pub fn from_json(json: &Json) -> Self {
        let Json::Object(object) = json else {
            return Criterion::Malformed(format!("criteria must be an object, got {json}"));
        };

        let mut clauses = Vec::with_capacity(object.len());
        for (key, value) in object {
            clauses.push(match key.as_str() {
                "$and" => parse_list(key, value).map_or_else(Criterion::Malformed, Criterion::And),
                "$or" => parse_list(key, value).map_or_else(Criterion::Malformed, Criterion::Or),
                "$not" => Criterion::not(Criterion::from_json(value)),
                other if other.starts_with('$') => {
                    Criterion::Malformed(format!("unknown combinator {other}"))
                }
                path => parse_field(path, value),
            });
        }

        if clauses.len() == 1 {
            clauses.pop().unwrap_or_else(Criterion::always)
        } else {
            Criterion::And(clauses)
        }
    }

    /// Collects the reasons of every malformed node in the tree.
    pub fn malformed_reasons(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_malformed(&mut out);
        out
    }

    fn collect_malformed<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Criterion::Compare(_) => {}
            Criterion::And(children) | Criterion::Or(children) => {
                for child in children {
                    child.collect_malformed(out);
                }
            }
            Criterion::Not(inner) => inner.collect_malformed(out),
            Criterion::Malformed(reason) => out.push(reason),
        }
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        match self {
            Criterion::Compare(_) | Criterion::Malformed(_) => 1,
            Criterion::And(children) | Criterion::Or(children) => {
                1 + children.iter().map(Criterion::node_count).sum::<usize>()
            }
            Criterion::Not(inner) => 1 + inner.node_count(),
        }
    }
}

fn parse_list(key: &str, value: &Json) -> Result<Vec<Criterion>, String> {
    match value {
        Json::Array(items) => Ok(items.iter().map(Criterion::from_json).collect()),
        other => Err(format!("{key} expects an array, got {other}")),
    }
}

fn parse_field(path: &str, value: &Json) -> Criterion {
    let Json::Object(ops) = value else {
        return Criterion::compare(path, Operator::Eq, from_json_value(value.clone()));
    };

    if ops.is_empty() {
        return Criterion::Malformed(format!("{path}: empty operator object"));
    }

    let mut nodes = Vec::with_capacity(ops.len());
    for (name, operand) in ops {
        let node = match Operator::from_wire(name) {
            Some(op) => Criterion::compare(path, op, from_json_value(operand.clone())),
            None => Criterion::Malformed(format!("{path}: unknown operator {name}")),
        };
        nodes.push(node);
    }

    if nodes.len() == 1 {
        nodes.pop().unwrap_or_else(Criterion::always)
    } else {
        Criterion::And(nodes)
    }
}
