//! Operator and aggregator tables.
//!
//! Both tables are closed enums: dispatch is a `match`, there is nothing to
//! register at runtime and nothing shared between engines.

use std::fmt;

use serde_json::Value;

use crate::abac::errors::{AbacError, Result};

/// Value that makes `eq` match anything.
pub const WILDCARD: &str = "*";

/// Scalar operators: compare one resolved operand with one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Not,
    Lt,
    Gt,
}

/// Aggregators: `in` works on a list of values, `and`/`or` on a list of
/// nested conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregator {
    In,
    And,
    Or,
}

impl Operator {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(Operator::Eq),
            "not" => Some(Operator::Not),
            "lt" => Some(Operator::Lt),
            "gt" => Some(Operator::Gt),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Not => "not",
            Operator::Lt => "lt",
            Operator::Gt => "gt",
        }
    }

    /// Evaluate `operand <op> value`.
    ///
    /// `lt`/`gt` read as `attribute < rule value` for subject attributes and
    /// record attributes alike. Older rule sets that compared the other way
    /// round on the subject side need their operators flipped.
    pub fn apply(self, operand: &Value, value: &Value) -> Result<bool> {
        match self {
            Operator::Eq => Ok(exact(operand, value)),
            Operator::Not => negate(operand, value),
            Operator::Lt => {
                let (l, r) = numeric_pair(self, operand, value)?;
                Ok(l < r)
            }
            Operator::Gt => {
                let (l, r) = numeric_pair(self, operand, value)?;
                Ok(l > r)
            }
        }
    }
}

impl Aggregator {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "in" => Some(Aggregator::In),
            "and" => Some(Aggregator::And),
            "or" => Some(Aggregator::Or),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Aggregator::In => "in",
            Aggregator::And => "and",
            Aggregator::Or => "or",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numbers compare by numeric value regardless of integer/float
/// representation, everything else by structural equality.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (normalize(a), normalize(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Numeric view of a value, if it is a number.
pub fn normalize(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// `eq`: the wildcard matches anything.
pub fn exact(operand: &Value, value: &Value) -> bool {
    if value.as_str() == Some(WILDCARD) {
        return true;
    }
    same_value(operand, value)
}

/// `in`: true iff `operand` equals one of the list elements. A missing list
/// (`null`) contains nothing.
pub fn contains(list: &Value, operand: &Value) -> Result<bool> {
    match list {
        Value::Array(items) => Ok(items.iter().any(|item| same_value(item, operand))),
        Value::Null => Ok(false),
        other => Err(AbacError::type_mismatch(
            Aggregator::In.name(),
            format!("expected a list, got {other}"),
        )),
    }
}

/// Splits a `{"<operator>": value}` object into its single pair.
pub fn operator_pair(value: &Value) -> Option<(&str, &Value)> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.iter().next().map(|(k, v)| (k.as_str(), v))
}

/// Resolves the nested operator of `{"not": {"<op>": value}}`. Only scalar
/// operators may be negated.
pub fn nested_operator(value: &Value) -> Result<Option<(Operator, &Value)>> {
    if !value.is_object() {
        return Ok(None);
    }
    let (name, inner) = operator_pair(value).ok_or_else(|| {
        AbacError::MalformedRule(format!(
            "`not` expects a scalar or a single {{\"<operator>\": value}} pair, got {value}"
        ))
    })?;
    match Operator::from_name(name) {
        Some(op) => Ok(Some((op, inner))),
        None if Aggregator::from_name(name).is_some() => Err(AbacError::UnsupportedNesting(
            format!("`not` cannot wrap the `{name}` aggregator"),
        )),
        None => Err(AbacError::UnknownOperator {
            operator: name.to_string(),
            path: "not".to_string(),
        }),
    }
}

fn negate(operand: &Value, value: &Value) -> Result<bool> {
    match nested_operator(value)? {
        Some((op, inner)) => Ok(!op.apply(operand, inner)?),
        None => Ok(!same_value(operand, value)),
    }
}

fn numeric_pair(op: Operator, operand: &Value, value: &Value) -> Result<(f64, f64)> {
    let l = normalize(operand).ok_or_else(|| {
        AbacError::type_mismatch(op.name(), format!("operand {operand} is not a number"))
    })?;
    let r = normalize(value).ok_or_else(|| {
        AbacError::type_mismatch(op.name(), format!("value {value} is not a number"))
    })?;
    Ok((l, r))
}
