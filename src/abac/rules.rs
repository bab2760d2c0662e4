//! Typed rule documents.
//!
//! The rule document arrives as JSON:
//!
//! ```json
//! { "t_client": { "data_GET": [
//!     { "result": "allow", "rule": { "sbj.role": "admin" }, "mask": ["total"] }
//! ] } }
//! ```
//!
//! It is compiled once into a [`RuleTree`]; shape errors surface here and never
//! during a request. Object iteration follows the document order.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::abac::engine::is_attribute_reference;
use crate::abac::errors::{AbacError, Result};
use crate::abac::operators::{self, Aggregator, Operator};

/// Outcome of a rule, and the engine-wide fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Allow,
    #[default]
    Deny,
}

impl Resolution {
    pub fn is_allow(self) -> bool {
        self == Resolution::Allow
    }
}

impl FromStr for Resolution {
    type Err = AbacError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "allow" => Ok(Resolution::Allow),
            "deny" => Ok(Resolution::Deny),
            other => Err(AbacError::InvalidResolution(other.to_string())),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Allow => f.write_str("allow"),
            Resolution::Deny => f.write_str("deny"),
        }
    }
}

/// What to do with operators outside the `eq/not/lt/gt/in/and/or` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownOperatorPolicy {
    /// Reject the rule document.
    #[default]
    Strict,
    /// Keep the entry; it always passes and contributes no filter.
    Permissive,
}

/// One `operand: value` pair of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// `{"sbj.role": "admin"}`, `{"obj.total": {"gt": 10}}`
    Compare {
        operand: String,
        operator: Operator,
        value: Value,
    },
    /// `{"sbj.role": {"in": ["manager", "admin"]}}`
    In { operand: String, values: Value },
    /// `{"and": [...]}`
    All(Vec<Condition>),
    /// `{"or": [...]}`
    Any(Vec<Condition>),
    /// Only present under [`UnknownOperatorPolicy::Permissive`].
    Unknown {
        operand: String,
        operator: String,
        value: Value,
    },
}

/// Conjunction of entries, in document order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Condition {
    entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub condition: Condition,
    pub mask: Vec<String>,
    pub result: Resolution,
}

/// `resource -> action -> rules`, immutable once compiled. Rule lists keep
/// document order.
#[derive(Debug, Clone, Default)]
pub struct RuleTree {
    resources: HashMap<String, HashMap<String, Vec<Rule>>>,
}

impl Condition {
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compile a condition object.
    pub fn compile(value: &Value, policy: UnknownOperatorPolicy) -> Result<Self> {
        compile_condition(value, "rule", policy)
    }
}

impl Rule {
    /// Compile one `{"result", "rule", "mask"}` object.
    pub fn compile(value: &Value, policy: UnknownOperatorPolicy) -> Result<Self> {
        compile_rule(value, "rule", policy)
    }
}

impl RuleTree {
    /// Compile a rule document, rejecting unknown operators.
    pub fn from_document(document: &Value) -> Result<Self> {
        Self::compile(document, UnknownOperatorPolicy::Strict)
    }

    pub fn compile(document: &Value, policy: UnknownOperatorPolicy) -> Result<Self> {
        let resources_doc = as_object(document, "rule document")?;
        let mut resources = HashMap::with_capacity(resources_doc.len());

        for (resource, actions_value) in resources_doc {
            let actions_doc = as_object(actions_value, resource)?;
            let mut actions = HashMap::with_capacity(actions_doc.len());

            for (action, rules_value) in actions_doc {
                let path = format!("{resource}.{action}");
                let rules_doc = rules_value.as_array().ok_or_else(|| {
                    AbacError::MalformedRule(format!("`{path}` must be a list of rules"))
                })?;
                let rules = rules_doc
                    .iter()
                    .enumerate()
                    .map(|(i, rule)| compile_rule(rule, &format!("{path}[{i}]"), policy))
                    .collect::<Result<Vec<_>>>()?;
                actions.insert(action.clone(), rules);
            }

            resources.insert(resource.clone(), actions);
        }

        let tree = RuleTree { resources };
        tracing::info!(
            resources = tree.resources.len(),
            rules = tree.rule_count(),
            ?policy,
            "Compiled ABAC rule tree"
        );
        Ok(tree)
    }

    /// Rules registered under exactly `resource.action` (wildcards are literal keys).
    pub fn get(&self, resource: &str, action: &str) -> Option<&[Rule]> {
        self.resources
            .get(resource)
            .and_then(|actions| actions.get(action))
            .map(Vec::as_slice)
    }

    pub fn rule_count(&self) -> usize {
        self.resources
            .values()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rule_count() == 0
    }
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| AbacError::MalformedRule(format!("`{what}` must be an object, got {value}")))
}

fn compile_rule(value: &Value, path: &str, policy: UnknownOperatorPolicy) -> Result<Rule> {
    let doc = as_object(value, path)?;

    let condition_value = doc
        .get("rule")
        .ok_or_else(|| AbacError::MalformedRule(format!("`{path}` is missing `rule`")))?;
    let condition = compile_condition(condition_value, &format!("{path}.rule"), policy)?;

    let result = doc
        .get("result")
        .and_then(Value::as_str)
        .ok_or_else(|| AbacError::MalformedRule(format!("`{path}` is missing a string `result`")))?
        .parse::<Resolution>()
        .map_err(|e| AbacError::MalformedRule(format!("`{path}.result`: {e}")))?;

    let mask = match doc.get("mask") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(fields)) => fields
            .iter()
            .map(|f| {
                f.as_str().map(str::to_string).ok_or_else(|| {
                    AbacError::MalformedRule(format!("`{path}.mask` entries must be strings, got {f}"))
                })
            })
            .collect::<Result<Vec<_>>>()?,
        Some(other) => {
            return Err(AbacError::MalformedRule(format!(
                "`{path}.mask` must be a list, got {other}"
            )))
        }
    };

    Ok(Rule {
        condition,
        mask,
        result,
    })
}

fn compile_condition(value: &Value, path: &str, policy: UnknownOperatorPolicy) -> Result<Condition> {
    let doc = as_object(value, path)?;
    let entries = doc
        .iter()
        .map(|(key, raw)| compile_entry(key, raw, &format!("{path}.{key}"), policy))
        .collect::<Result<Vec<_>>>()?;
    Ok(Condition { entries })
}

fn compile_entry(
    key: &str,
    raw: &Value,
    path: &str,
    policy: UnknownOperatorPolicy,
) -> Result<Entry> {
    match raw {
        // `{"and": [...]}`: the key is the operator
        Value::Array(items) => match Aggregator::from_name(key) {
            Some(Aggregator::And) => Ok(Entry::All(compile_group(items, path, policy)?)),
            Some(Aggregator::Or) => Ok(Entry::Any(compile_group(items, path, policy)?)),
            Some(Aggregator::In) => Ok(Entry::In {
                operand: key.to_string(),
                values: raw.clone(),
            }),
            None => unknown(key, key, raw, path, policy),
        },
        Value::Object(_) => {
            let (name, value) = operators::operator_pair(raw).ok_or_else(|| {
                AbacError::MalformedRule(format!(
                    "`{path}` must hold a single {{\"<operator>\": value}} pair, got {raw}"
                ))
            })?;

            if let Some(operator) = Operator::from_name(name) {
                check_operator_value(operator, value, path, false)?;
                return Ok(Entry::Compare {
                    operand: key.to_string(),
                    operator,
                    value: value.clone(),
                });
            }

            match Aggregator::from_name(name) {
                Some(Aggregator::In) => {
                    if !(value.is_array() || is_attribute_reference(value)) {
                        return Err(AbacError::MalformedRule(format!(
                            "`{path}`: `in` expects a list or a `sbj.`/`ctx.` reference, got {value}"
                        )));
                    }
                    Ok(Entry::In {
                        operand: key.to_string(),
                        values: value.clone(),
                    })
                }
                Some(aggregator) => Err(AbacError::MalformedRule(format!(
                    "`{path}`: `{aggregator}` must be used as a key, e.g. {{\"{aggregator}\": [...]}}"
                ))),
                None => unknown(key, name, value, path, policy),
            }
        }
        scalar => {
            if matches!(Aggregator::from_name(key), Some(Aggregator::And | Aggregator::Or)) {
                return Err(AbacError::MalformedRule(format!(
                    "`{path}` must be a list of conditions, got {scalar}"
                )));
            }
            Ok(Entry::Compare {
                operand: key.to_string(),
                operator: Operator::Eq,
                value: scalar.clone(),
            })
        }
    }
}

/// Literal checks for scalar operators. `lt`/`gt` need a number, or a
/// reference at the top level; references nested under `not` are not resolved.
fn check_operator_value(operator: Operator, value: &Value, path: &str, nested: bool) -> Result<()> {
    match operator {
        Operator::Lt | Operator::Gt => {
            if value.is_number() || (!nested && is_attribute_reference(value)) {
                return Ok(());
            }
            let expected = if nested {
                "a number"
            } else {
                "a number or a `sbj.`/`ctx.` reference"
            };
            Err(AbacError::MalformedRule(format!(
                "`{path}`: `{operator}` expects {expected}, got {value}"
            )))
        }
        Operator::Not => match operators::nested_operator(value).map_err(|e| at_path(e, path))? {
            Some((inner, inner_value)) => check_operator_value(inner, inner_value, path, true),
            None => Ok(()),
        },
        Operator::Eq => Ok(()),
    }
}

fn compile_group(
    items: &[Value],
    path: &str,
    policy: UnknownOperatorPolicy,
) -> Result<Vec<Condition>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| compile_condition(item, &format!("{path}[{i}]"), policy))
        .collect()
}

fn unknown(
    operand: &str,
    operator: &str,
    value: &Value,
    path: &str,
    policy: UnknownOperatorPolicy,
) -> Result<Entry> {
    match policy {
        UnknownOperatorPolicy::Strict => Err(AbacError::UnknownOperator {
            operator: operator.to_string(),
            path: path.to_string(),
        }),
        UnknownOperatorPolicy::Permissive => {
            tracing::warn!(operator, path, "keeping unknown operator, it will always pass");
            Ok(Entry::Unknown {
                operand: operand.to_string(),
                operator: operator.to_string(),
                value: value.clone(),
            })
        }
    }
}

fn at_path(err: AbacError, path: &str) -> AbacError {
    match err {
        AbacError::UnknownOperator { operator, .. } => AbacError::UnknownOperator {
            operator,
            path: path.to_string(),
        },
        AbacError::UnsupportedNesting(msg) => AbacError::UnsupportedNesting(format!("`{path}`: {msg}")),
        AbacError::MalformedRule(msg) => AbacError::MalformedRule(format!("`{path}`: {msg}")),
        other => other,
    }
}
