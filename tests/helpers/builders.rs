use gatekeeper::abac::{DataSource, Engine, Resolution, RuleTree, UnknownOperatorPolicy};
use serde_json::{json, Value};

/// Builder for test engines
pub struct EngineBuilder {
    subject: Value,
    context: Value,
    rules: Value,
    default_resolution: Resolution,
    policy: UnknownOperatorPolicy,
}

impl EngineBuilder {
    pub fn new(subject: Value) -> Self {
        Self {
            subject,
            context: Value::Null,
            rules: json!({}),
            default_resolution: Resolution::Deny,
            policy: UnknownOperatorPolicy::Strict,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_rules(mut self, rules: Value) -> Self {
        self.rules = rules;
        self
    }

    pub fn default_resolution(mut self, resolution: Resolution) -> Self {
        self.default_resolution = resolution;
        self
    }

    pub fn permissive(mut self) -> Self {
        self.policy = UnknownOperatorPolicy::Permissive;
        self
    }

    pub fn build(self) -> Engine {
        let tree = RuleTree::compile(&self.rules, self.policy).expect("Failed to compile rules");
        let source = DataSource::new(self.subject).with_context(self.context);
        Engine::new(source, tree, self.default_resolution)
    }
}
