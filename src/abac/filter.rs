//! Residual predicates over object attributes.
//!
//! Conditions that reference `obj.*` cannot be decided from the subject and
//! context alone. The engine records them as a `FilterExpression` which the data
//! layer either matches against a concrete record or renders into an RQL query.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::abac::errors::Result;
use crate::abac::operators::{self, Aggregator, Operator};
use crate::abac::path::get_attribute_by_path;

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpression {
    /// `operand <operator> value` on a record attribute.
    Compare {
        operator: Operator,
        operand: String,
        value: Value,
    },
    /// Record attribute is one of `values`.
    In { operand: String, values: Value },
    /// Negation of a nested predicate, built from `{"not": {"<op>": value}}`.
    Negate(Box<FilterExpression>),
    And(Vec<FilterExpression>),
    Or(Vec<FilterExpression>),
}

impl FilterExpression {
    /// Build a leaf for `operand <operator> value`. A `not` around a nested
    /// operator pair becomes a negation node.
    pub fn leaf(operator: Operator, operand: impl Into<String>, value: Value) -> Result<Self> {
        let operand = operand.into();
        if operator == Operator::Not {
            if let Some((inner, inner_value)) = operators::nested_operator(&value)? {
                let nested = FilterExpression::leaf(inner, operand, inner_value.clone())?;
                return Ok(FilterExpression::Negate(Box::new(nested)));
            }
        }
        Ok(FilterExpression::Compare {
            operator,
            operand,
            value,
        })
    }

    pub fn operator(&self) -> &'static str {
        match self {
            FilterExpression::Compare { operator, .. } => operator.name(),
            FilterExpression::In { .. } => Aggregator::In.name(),
            FilterExpression::Negate(_) => Operator::Not.name(),
            FilterExpression::And(_) => Aggregator::And.name(),
            FilterExpression::Or(_) => Aggregator::Or.name(),
        }
    }

    /// Record attribute path of a leaf; empty for combinators.
    pub fn operand(&self) -> &str {
        match self {
            FilterExpression::Compare { operand, .. } | FilterExpression::In { operand, .. } => {
                operand
            }
            _ => "",
        }
    }

    /// Child expressions of `and`/`or` nodes.
    pub fn children(&self) -> &[FilterExpression] {
        match self {
            FilterExpression::And(children) | FilterExpression::Or(children) => children,
            _ => &[],
        }
    }

    /// Match the expression against a record's own data.
    ///
    /// `and` stops at the first failing child, `or` evaluates every child.
    pub fn matches(&self, data: &Value) -> Result<bool> {
        match self {
            FilterExpression::Compare {
                operator,
                operand,
                value,
            } => operator.apply(resolve(data, operand), value),
            FilterExpression::In { operand, values } => {
                operators::contains(values, resolve(data, operand))
            }
            FilterExpression::Negate(inner) => Ok(!inner.matches(data)?),
            FilterExpression::And(children) => {
                for child in children {
                    if !child.matches(data)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            FilterExpression::Or(children) => {
                let mut matched = false;
                for child in children {
                    matched |= child.matches(data)?;
                }
                Ok(matched)
            }
        }
    }

    /// Every record attribute the expression reads, in evaluation order.
    pub fn referenced_attributes(&self) -> Vec<String> {
        let mut attributes = Vec::new();
        self.collect_attributes(&mut attributes);
        attributes
    }

    fn collect_attributes(&self, out: &mut Vec<String>) {
        match self {
            FilterExpression::Compare { operand, .. } | FilterExpression::In { operand, .. } => {
                out.push(operand.clone())
            }
            FilterExpression::Negate(inner) => inner.collect_attributes(out),
            FilterExpression::And(children) | FilterExpression::Or(children) => {
                for child in children {
                    child.collect_attributes(out);
                }
            }
        }
    }
}

/// Attribute lookup inside record data: dotted path first, then the operand
/// as a literal flat key.
fn resolve<'a>(data: &'a Value, operand: &str) -> &'a Value {
    get_attribute_by_path(data, operand)
        .or_else(|| data.get(operand))
        .unwrap_or(&Value::Null)
}

/// RQL rendering, e.g. `and(eq(owner.role,ADMIN),in(owner.company,(topline,velitto)))`.
impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpression::Compare {
                operator: Operator::Not,
                operand,
                value,
            } => write!(f, "not(eq({},{}))", operand, RqlValue(value)),
            FilterExpression::Compare {
                operator,
                operand,
                value,
            } => write!(f, "{}({},{})", operator, operand, RqlValue(value)),
            FilterExpression::In { operand, values } => {
                write!(f, "in({},({}))", operand, RqlValue(values))
            }
            FilterExpression::Negate(inner) => write!(f, "not({inner})"),
            FilterExpression::And(children) | FilterExpression::Or(children) => {
                write!(f, "{}(", self.operator())?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
        }
    }
}

struct RqlValue<'a>(&'a Value);

impl fmt::Display for RqlValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::String(s) => f.write_str(s),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", RqlValue(item))?;
                }
                Ok(())
            }
            other => write!(f, "{other}"),
        }
    }
}

impl Serialize for FilterExpression {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("operator", self.operator())?;
        map.serialize_entry("operand", self.operand())?;
        match self {
            FilterExpression::Compare { value, .. } => map.serialize_entry("value", value)?,
            FilterExpression::In { values, .. } => map.serialize_entry("value", values)?,
            FilterExpression::Negate(inner) => map.serialize_entry("value", inner)?,
            FilterExpression::And(children) | FilterExpression::Or(children) => {
                map.serialize_entry("value", children)?
            }
        }
        map.end()
    }
}
