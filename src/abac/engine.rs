use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::abac::errors::Result;
use crate::abac::filter::FilterExpression;
use crate::abac::operators;
use crate::abac::path::get_attribute_by_path;
use crate::abac::record::{FieldType, FieldValue, Record};
use crate::abac::rules::{Condition, Entry, Resolution, Rule, RuleTree};
use crate::settings::EngineSettings;

const SUBJECT: &str = "sbj";
const CONTEXT: &str = "ctx";
const OBJECT: &str = "obj";

/// The value that replaces masked fields and denied records.
pub fn access_denied() -> Value {
    json!({ "access": "denied" })
}

/// Whether `value` is a `sbj.`/`ctx.` string that resolves against the data source.
pub fn is_attribute_reference(value: &Value) -> bool {
    matches!(
        value.as_str().and_then(|s| s.split_once('.')),
        Some((SUBJECT | CONTEXT, _))
    )
}

/// Subject and context attributes, resolved eagerly during evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSource {
    pub sbj: Value,
    pub ctx: Value,
}

impl DataSource {
    pub fn new(sbj: Value) -> Self {
        Self {
            sbj,
            ctx: Value::Null,
        }
    }

    pub fn with_context(mut self, ctx: Value) -> Self {
        self.ctx = ctx;
        self
    }

    /// Build a data source from any serializable subject.
    pub fn from_subject<T: Serialize>(subject: &T) -> serde_json::Result<Self> {
        Ok(Self::new(serde_json::to_value(subject)?))
    }

    /// Look up `path` in the `sbj` or `ctx` bag. Unknown prefixes and missing
    /// paths resolve to `None`.
    pub fn resolve(&self, prefix: &str, path: &str) -> Option<&Value> {
        let bag = match prefix {
            SUBJECT => &self.sbj,
            CONTEXT => &self.ctx,
            _ => return None,
        };
        get_attribute_by_path(bag, path)
    }

    fn resolve_value(&self, value: &Value) -> Value {
        let reference = value.as_str().and_then(|s| s.split_once('.'));
        match reference {
            Some((prefix @ (SUBJECT | CONTEXT), path)) => {
                self.resolve(prefix, path).cloned().unwrap_or(Value::Null)
            }
            _ => value.clone(),
        }
    }
}

/// An operand/value pair after attribute resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Revealed {
    /// The resolved attribute, or the record path (as a string) when `is_filter`.
    pub operand: Value,
    pub value: Value,
    /// The operand names an object attribute and must be deferred to a filter.
    pub is_filter: bool,
}

/// Outcome of the rule that decided a check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleDecision {
    pub mask: Vec<String>,
    pub filter: Option<FilterExpression>,
    pub result: Resolution,
}

/// Result of [`Engine::mask_record`].
#[derive(Debug, Clone, PartialEq)]
pub enum Masked {
    Allowed(Record),
    Denied,
}

impl Masked {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Masked::Allowed(_))
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            Masked::Allowed(record) => Some(record),
            Masked::Denied => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Masked::Allowed(record) => record.to_value(),
            Masked::Denied => access_denied(),
        }
    }
}

impl Serialize for Masked {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

/// Decision engine for one subject and context.
///
/// Immutable after construction; every operation takes `&self`, so one engine
/// can be shared across threads.
#[derive(Debug, Clone)]
pub struct Engine {
    data_source: DataSource,
    rules: Arc<RuleTree>,
    default_resolution: Resolution,
}

impl Engine {
    pub fn new(
        data_source: DataSource,
        rules: impl Into<Arc<RuleTree>>,
        default_resolution: Resolution,
    ) -> Self {
        Self {
            data_source,
            rules: rules.into(),
            default_resolution,
        }
    }

    pub fn with_settings(
        data_source: DataSource,
        rules: impl Into<Arc<RuleTree>>,
        settings: &EngineSettings,
    ) -> Self {
        Self::new(data_source, rules, settings.default_resolution)
    }

    pub fn data_source(&self) -> &DataSource {
        &self.data_source
    }

    pub fn default_resolution(&self) -> Resolution {
        self.default_resolution
    }

    /// Candidate rules in priority order: `resource.action`, `resource.base_*`,
    /// `resource.*`, `*.action`, `*.base_*`, `*.*`, where `base` is the part of
    /// the action before its first `_`.
    pub fn find_rules(&self, resource: &str, action: &str) -> Vec<&Rule> {
        let base = action.split('_').next().unwrap_or(action);
        let base_wildcard = format!("{base}_*");
        let paths = [
            (resource, action),
            (resource, base_wildcard.as_str()),
            (resource, "*"),
            ("*", action),
            ("*", base_wildcard.as_str()),
            ("*", "*"),
        ];

        let rules: Vec<&Rule> = paths
            .iter()
            .filter_map(|(r, a)| self.rules.get(r, a))
            .flatten()
            .collect();
        tracing::debug!(resource, action, candidates = rules.len(), "Found candidate rules");
        rules
    }

    /// Resolve the operand and value of one condition entry.
    ///
    /// `obj.` operands become filter paths. `sbj.` and `ctx.` operands are
    /// looked up in the data source; any other operand, prefixed or not,
    /// resolves to `null` rather than to its own text.
    pub fn reveal(&self, operand: &str, value: &Value) -> Revealed {
        let value = self.data_source.resolve_value(value);
        match operand.split_once('.') {
            Some((OBJECT, path)) => Revealed {
                operand: Value::String(path.to_string()),
                value,
                is_filter: true,
            },
            Some((prefix, path)) => Revealed {
                operand: self
                    .data_source
                    .resolve(prefix, path)
                    .cloned()
                    .unwrap_or(Value::Null),
                value,
                is_filter: false,
            },
            None => Revealed {
                operand: Value::Null,
                value,
                is_filter: false,
            },
        }
    }

    /// Evaluate a condition, collecting the filters of object-side entries.
    pub fn evaluate_condition(&self, condition: &Condition) -> Result<(bool, Vec<FilterExpression>)> {
        let mut passed = true;
        let mut filters = Vec::new();
        for entry in condition.entries() {
            let (ok, filter) = self.evaluate_entry(entry)?;
            passed &= ok;
            filters.extend(filter);
        }
        Ok((passed, filters))
    }

    fn evaluate_entry(&self, entry: &Entry) -> Result<(bool, Option<FilterExpression>)> {
        match entry {
            Entry::Compare {
                operand,
                operator,
                value,
            } => {
                let revealed = self.reveal(operand, value);
                tracing::debug!(%operand, %operator, resolved = %revealed.operand, value = %revealed.value, "Evaluating entry");
                if revealed.is_filter {
                    let path = operand_path(&revealed);
                    let filter = FilterExpression::leaf(*operator, path, revealed.value)?;
                    return Ok((true, Some(filter)));
                }
                Ok((operator.apply(&revealed.operand, &revealed.value)?, None))
            }
            Entry::In { operand, values } => {
                let revealed = self.reveal(operand, values);
                tracing::debug!(%operand, operator = "in", resolved = %revealed.operand, value = %revealed.value, "Evaluating entry");
                if revealed.is_filter {
                    let filter = FilterExpression::In {
                        operand: operand_path(&revealed),
                        values: revealed.value,
                    };
                    return Ok((true, Some(filter)));
                }
                Ok((operators::contains(&revealed.value, &revealed.operand)?, None))
            }
            Entry::All(conditions) => {
                let mut filters = Vec::new();
                for condition in conditions {
                    let (ok, nested) = self.evaluate_condition(condition)?;
                    if !ok {
                        // filters collected so far are dropped with the failed group
                        return Ok((false, None));
                    }
                    filters.extend(nested);
                }
                Ok((true, group(filters, FilterExpression::And)))
            }
            Entry::Any(conditions) => {
                let mut passed = false;
                let mut filters = Vec::new();
                for condition in conditions {
                    let (ok, nested) = self.evaluate_condition(condition)?;
                    passed |= ok;
                    filters.extend(nested);
                }
                Ok((passed, group(filters, FilterExpression::Or)))
            }
            Entry::Unknown {
                operand, operator, ..
            } => {
                tracing::warn!(%operand, %operator, "Unknown operator treated as passing");
                Ok((true, None))
            }
        }
    }

    pub fn evaluate_rule(&self, rule: &Rule) -> Result<(bool, RuleDecision)> {
        let (passed, filters) = self.evaluate_condition(&rule.condition)?;
        let decision = RuleDecision {
            mask: rule.mask.clone(),
            filter: group(filters, FilterExpression::And),
            result: rule.result,
        };
        Ok((passed, decision))
    }

    /// Decide `action` on `resource`. The first passing candidate rule wins;
    /// otherwise the default resolution applies and no decision is returned.
    pub fn check(&self, resource: &str, action: &str) -> Result<(bool, Option<RuleDecision>)> {
        for rule in self.find_rules(resource, action) {
            let (passed, decision) = self.evaluate_rule(rule)?;
            if passed {
                tracing::debug!(resource, action, result = %decision.result, "Rule matched");
                return Ok((decision.result.is_allow(), Some(decision)));
            }
        }
        Ok((self.default_resolution.is_allow(), None))
    }

    /// [`check`](Self::check) against a concrete record. When the decision
    /// carries a filter that the record does not satisfy, the outcome falls
    /// back to the default resolution.
    pub fn check_record(&self, record: &Record, action: &str) -> Result<(bool, Option<RuleDecision>)> {
        let (allowed, decision) = self.check(record.name(), action)?;

        if let Some(filter) = decision.as_ref().and_then(|d| d.filter.as_ref()) {
            let data = record.project(&filter.referenced_attributes());
            let matched = filter.matches(&data).unwrap_or_else(|err| {
                tracing::warn!(object = record.name(), action, %filter, error = %err, "Filter match failed");
                false
            });
            if !matched {
                return Ok((self.default_resolution.is_allow(), decision));
            }
        }
        Ok((allowed, decision))
    }

    /// Apply the decision to a record: a denied record collapses to the
    /// denial sentinel; an allowed one has its masked fields redacted and its
    /// linked records masked recursively.
    pub fn mask_record(&self, mut record: Record, action: &str) -> Result<Masked> {
        if self.mask_in_place(&mut record, action)? {
            Ok(Masked::Allowed(record))
        } else {
            Ok(Masked::Denied)
        }
    }

    fn mask_in_place(&self, record: &mut Record, action: &str) -> Result<bool> {
        let (allowed, decision) = self.check_record(record, action)?;
        if !allowed {
            return Ok(false);
        }
        let mask = decision.map(|d| d.mask).unwrap_or_default();

        // 1. Redact masked paths that exist in the record
        let present: Vec<&String> = mask.iter().filter(|path| record.contains_path(path)).collect();
        for path in present {
            record.set_by_path(path, access_denied());
        }

        // 2. Walk links: to-one slots keep the sub-record or the sentinel,
        //    to-many slots keep only allowed elements
        let meta = record.shared_meta();
        for (key, slot) in record.fields_mut() {
            if mask.iter().any(|m| m == key) {
                continue;
            }
            let Some(field) = meta.find_field(key) else {
                continue;
            };
            let denied = match (field.field_type, &mut *slot) {
                (FieldType::Object | FieldType::Generic, FieldValue::ToOne(nested)) => {
                    !self.mask_in_place(nested, action)?
                }
                (FieldType::Array, FieldValue::ToMany(items)) => {
                    let mut kept = Vec::with_capacity(items.len());
                    for mut item in std::mem::take(items) {
                        if self.mask_in_place(&mut item, action)? {
                            kept.push(item);
                        }
                    }
                    *items = kept;
                    false
                }
                _ => false,
            };
            if denied {
                *slot = FieldValue::Scalar(access_denied());
            }
        }
        Ok(true)
    }
}

fn operand_path(revealed: &Revealed) -> String {
    revealed.operand.as_str().unwrap_or_default().to_string()
}

fn group(
    filters: Vec<FilterExpression>,
    node: fn(Vec<FilterExpression>) -> FilterExpression,
) -> Option<FilterExpression> {
    if filters.is_empty() {
        None
    } else {
        Some(node(filters))
    }
}
