//! The record shape the engine works on.
//!
//! Storage belongs to the data layer; the engine only needs an object name, a
//! per-field type lookup, and field values that may be nested records.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::abac::errors::{AbacError, Result};
use crate::abac::path::{get_attribute_by_path, set_attribute_by_path};

/// Key that names the target object of a generic link value.
pub const GENERIC_OBJECT_KEY: &str = "_object";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Number,
    String,
    Bool,
    Date,
    Time,
    DateTime,
    Enum,
    /// To-one link.
    Object,
    /// To-many link.
    Array,
    /// Link whose target object is named by the value itself.
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Target object of `object` and `array` links.
    #[serde(default, alias = "linkMeta", skip_serializing_if = "Option::is_none")]
    pub link_meta: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl Meta {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            link_meta: None,
        }
    }

    pub fn link(name: impl Into<String>, field_type: FieldType, link_meta: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type,
            link_meta: Some(link_meta.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(Value),
    ToOne(Box<Record>),
    ToMany(Vec<Record>),
}

impl FieldValue {
    pub fn to_value(&self) -> Value {
        match self {
            FieldValue::Scalar(v) => v.clone(),
            FieldValue::ToOne(record) => record.to_value(),
            FieldValue::ToMany(records) => Value::Array(records.iter().map(Record::to_value).collect()),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Scalar(value)
    }
}

impl From<Record> for FieldValue {
    fn from(record: Record) -> Self {
        FieldValue::ToOne(Box::new(record))
    }
}

impl From<Vec<Record>> for FieldValue {
    fn from(records: Vec<Record>) -> Self {
        FieldValue::ToMany(records)
    }
}

/// An object instance: its meta plus field values in field order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    meta: Arc<Meta>,
    data: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new(meta: Arc<Meta>) -> Self {
        Self {
            meta,
            data: Vec::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Shared handle to the meta, for walking fields while mutating data.
    pub fn shared_meta(&self) -> Arc<Meta> {
        Arc::clone(&self.meta)
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.data.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut FieldValue> {
        self.data.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Set a field, keeping its position if it already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        let key = key.into();
        let value = value.into();
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.data.push((key, value));
                None
            }
        }
    }

    /// Fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn fields_mut(&mut self) -> impl Iterator<Item = (&str, &mut FieldValue)> {
        self.data.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// Plain JSON view of the record, nested records included.
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.to_value()))
            .collect();
        Value::Object(map)
    }

    /// JSON view restricted to the fields that `paths` read. A field is kept
    /// when a path names it directly or descends into it.
    pub fn project(&self, paths: &[String]) -> Value {
        let map: Map<String, Value> = self
            .data
            .iter()
            .filter(|(k, _)| {
                paths.iter().any(|p| {
                    p.strip_prefix(k.as_str())
                        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
                })
            })
            .map(|(k, v)| (k.clone(), v.to_value()))
            .collect();
        Value::Object(map)
    }

    /// Whether a dotted path resolves inside the record, nested records included.
    pub fn contains_path(&self, path: &str) -> bool {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        match (self.get(head), rest) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(FieldValue::Scalar(inner)), Some(rest)) => get_attribute_by_path(inner, rest).is_some(),
            (Some(FieldValue::ToOne(record)), Some(rest)) => record.contains_path(rest),
            (Some(FieldValue::ToMany(_)), Some(_)) => false,
        }
    }

    /// Overwrite the value at a dotted path. The first segment must be an
    /// existing field; deeper segments descend into nested records or JSON
    /// objects. Returns `false` when the path cannot be reached.
    pub fn set_by_path(&mut self, path: &str, value: Value) -> bool {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let Some(slot) = self.get_mut(head) else {
            return false;
        };
        match (rest, slot) {
            (None, slot) => {
                *slot = FieldValue::Scalar(value);
                true
            }
            (Some(rest), FieldValue::Scalar(inner)) => set_attribute_by_path(inner, rest, value),
            (Some(rest), FieldValue::ToOne(record)) => record.set_by_path(rest, value),
            (Some(_), FieldValue::ToMany(_)) => false,
        }
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

/// Registry of metas, used to lift plain JSON into linked [`Record`]s.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    metas: HashMap<String, Arc<Meta>>,
}

impl Schema {
    pub fn new(metas: impl IntoIterator<Item = Meta>) -> Self {
        Self {
            metas: metas
                .into_iter()
                .map(|m| (m.name.clone(), Arc::new(m)))
                .collect(),
        }
    }

    /// Parse a JSON list of metas.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        let metas: Vec<Meta> = serde_json::from_value(value)?;
        Ok(Self::new(metas))
    }

    pub fn meta(&self, name: &str) -> Option<Arc<Meta>> {
        self.metas.get(name).cloned()
    }

    /// Build a record of object `name` from JSON. Link fields holding objects
    /// (or lists of objects) become nested records of their linked meta;
    /// everything else is kept as a scalar.
    pub fn record(&self, name: &str, value: &Value) -> Result<Record> {
        let meta = self
            .meta(name)
            .ok_or_else(|| AbacError::InvalidRecord(format!("unknown object `{name}`")))?;
        let fields = value.as_object().ok_or_else(|| {
            AbacError::InvalidRecord(format!("`{name}` record must be an object, got {value}"))
        })?;

        let mut record = Record::new(meta.clone());
        for (key, field_value) in fields {
            let lifted = match meta.find_field(key) {
                Some(field) => self.lift(field, field_value)?,
                None => FieldValue::Scalar(field_value.clone()),
            };
            record.insert(key.clone(), lifted);
        }
        Ok(record)
    }

    fn lift(&self, field: &FieldDescriptor, value: &Value) -> Result<FieldValue> {
        let link_meta = field.link_meta.as_deref();
        let lifted = match (field.field_type, value, link_meta) {
            (FieldType::Object, Value::Object(_), Some(target)) => {
                FieldValue::ToOne(Box::new(self.record(target, value)?))
            }
            (FieldType::Array, Value::Array(items), Some(target))
                if items.iter().all(Value::is_object) =>
            {
                FieldValue::ToMany(
                    items
                        .iter()
                        .map(|item| self.record(target, item))
                        .collect::<Result<Vec<_>>>()?,
                )
            }
            (FieldType::Generic, Value::Object(inner), _) => {
                match inner.get(GENERIC_OBJECT_KEY).and_then(Value::as_str) {
                    Some(target) => FieldValue::ToOne(Box::new(self.record(target, value)?)),
                    None => FieldValue::Scalar(value.clone()),
                }
            }
            _ => FieldValue::Scalar(value.clone()),
        };
        Ok(lifted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::from_value(json!([
            {"name": "t_employee", "fields": [
                {"name": "id", "type": "number"},
                {"name": "total", "type": "number"}
            ]},
            {"name": "t_payment", "fields": [
                {"name": "id", "type": "number"},
                {"name": "responsible", "type": "number"}
            ]},
            {"name": "t_client", "fields": [
                {"name": "id", "type": "number"},
                {"name": "name", "type": "string"},
                {"name": "address", "type": "string"},
                {"name": "employee", "type": "object", "linkMeta": "t_employee"},
                {"name": "payments", "type": "array", "link_meta": "t_payment"},
                {"name": "target", "type": "generic"}
            ]}
        ]))
        .unwrap()
    }

    #[test]
    fn test_find_field() {
        let schema = schema();
        let meta = schema.meta("t_client").unwrap();
        assert_eq!(meta.find_field("employee").unwrap().field_type, FieldType::Object);
        assert_eq!(
            meta.find_field("payments").unwrap().link_meta.as_deref(),
            Some("t_payment")
        );
        assert!(meta.find_field("nope").is_none());
    }

    #[test]
    fn test_record_lifts_links() {
        let schema = schema();
        let record = schema
            .record(
                "t_client",
                &json!({
                    "id": 1,
                    "employee": {"id": 7, "total": 3},
                    "payments": [{"id": 1, "responsible": 1}, {"id": 2, "responsible": 2}],
                    "target": {"_object": "t_employee", "id": 8}
                }),
            )
            .unwrap();

        assert_eq!(record.name(), "t_client");
        assert!(matches!(record.get("id"), Some(FieldValue::Scalar(v)) if v == &json!(1)));
        match record.get("employee") {
            Some(FieldValue::ToOne(employee)) => assert_eq!(employee.name(), "t_employee"),
            other => panic!("expected nested employee, got {other:?}"),
        }
        match record.get("payments") {
            Some(FieldValue::ToMany(payments)) => assert_eq!(payments.len(), 2),
            other => panic!("expected payments list, got {other:?}"),
        }
        match record.get("target") {
            Some(FieldValue::ToOne(target)) => assert_eq!(target.name(), "t_employee"),
            other => panic!("expected generic link, got {other:?}"),
        }
    }

    #[test]
    fn test_unexpanded_links_stay_scalar() {
        let record = schema()
            .record("t_client", &json!({"employee": 7, "payments": [1, 2]}))
            .unwrap();
        assert!(matches!(record.get("employee"), Some(FieldValue::Scalar(_))));
        assert!(matches!(record.get("payments"), Some(FieldValue::Scalar(_))));
    }

    #[test]
    fn test_record_errors() {
        let schema = schema();
        assert!(matches!(
            schema.record("t_unknown", &json!({})).unwrap_err(),
            AbacError::InvalidRecord(_)
        ));
        assert!(matches!(
            schema.record("t_client", &json!([1])).unwrap_err(),
            AbacError::InvalidRecord(_)
        ));
    }

    #[test]
    fn test_to_value_round_trips_shape() {
        let input = json!({
            "id": 1,
            "name": "client_1",
            "employee": {"id": 7, "total": 3},
            "payments": [{"id": 1, "responsible": 1}]
        });
        let record = schema().record("t_client", &input).unwrap();
        assert_eq!(record.to_value(), input);
        assert_eq!(serde_json::to_value(&record).unwrap(), input);
    }

    #[test]
    fn test_set_by_path() {
        let mut record = schema()
            .record(
                "t_client",
                &json!({
                    "name": "client_1",
                    "address": {"city": "Oslo", "zip": "0150"},
                    "employee": {"id": 7, "total": 3}
                }),
            )
            .unwrap();

        assert!(record.set_by_path("name", json!("x")));
        assert!(record.set_by_path("address.city", json!("x")));
        assert!(record.set_by_path("employee.total", json!("x")));
        assert!(!record.set_by_path("missing", json!("x")));
        assert!(!record.set_by_path("missing.deeper", json!("x")));

        assert_eq!(
            record.to_value(),
            json!({
                "name": "x",
                "address": {"city": "x", "zip": "0150"},
                "employee": {"id": 7, "total": "x"}
            })
        );
    }

    #[test]
    fn test_contains_path() {
        let record = schema()
            .record(
                "t_client",
                &json!({
                    "name": "client_1",
                    "address": {"city": "Oslo"},
                    "employee": {"id": 7, "total": 3},
                    "payments": [{"id": 1, "responsible": 1}]
                }),
            )
            .unwrap();

        assert!(record.contains_path("name"));
        assert!(record.contains_path("address.city"));
        assert!(record.contains_path("employee.total"));
        assert!(!record.contains_path("employee.missing"));
        assert!(!record.contains_path("payments.id"));
        assert!(!record.contains_path("missing"));
    }

    #[test]
    fn test_project_keeps_referenced_fields() {
        let record = schema()
            .record(
                "t_client",
                &json!({
                    "id": 1,
                    "name": "client_1",
                    "employee": {"id": 7, "total": 3},
                    "payments": [{"id": 1, "responsible": 1}]
                }),
            )
            .unwrap();

        let projected = record.project(&["employee.total".to_string(), "id".to_string()]);
        assert_eq!(projected, json!({"id": 1, "employee": {"id": 7, "total": 3}}));
        // prefix of a longer field name is not a match
        assert_eq!(record.project(&["na".to_string()]), json!({}));
    }
}
