//! Attribute-based access decisions over JSON rule documents.
//!
//! A [`RuleTree`] is compiled once from the rule document and shared; an
//! [`Engine`] pairs it with one subject/context [`DataSource`] and answers
//! `check`, `check_record` and `mask_record`.

pub mod engine;
pub mod errors;
pub mod filter;
pub mod operators;
pub mod path;
pub mod record;
pub mod rules;

pub use engine::{access_denied, DataSource, Engine, Masked, Revealed, RuleDecision};
pub use errors::{AbacError, Result};
pub use filter::FilterExpression;
pub use operators::{Aggregator, Operator};
pub use record::{FieldDescriptor, FieldType, FieldValue, Meta, Record, Schema};
pub use rules::{Condition, Entry, Resolution, Rule, RuleTree, UnknownOperatorPolicy};
