use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::abac::{self, Resolution, RuleTree, UnknownOperatorPolicy};
use crate::errors::GatekeeperError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EngineSettings {
    /// Outcome when no rule is found or none passes.
    #[serde(default)]
    pub default_resolution: Resolution,
    /// How rule compilation treats operators it does not know.
    #[serde(default)]
    pub unknown_operators: UnknownOperatorPolicy,
}

impl EngineSettings {
    /// Compile a rule document under the configured unknown-operator policy.
    pub fn compile_rules(&self, document: &Value) -> abac::Result<RuleTree> {
        RuleTree::compile(document, self.unknown_operators)
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self, GatekeeperError> {
        let mut builder = config::Config::builder()
            .set_default(
                "engine.default_resolution",
                EngineSettings::default().default_resolution.to_string(),
            )?
            .set_default("engine.unknown_operators", "strict")?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: GATEKEEPER__ENGINE__DEFAULT_RESOLUTION=allow, etc.
        builder =
            builder.add_source(config::Environment::with_prefix("GATEKEEPER").separator("__"));

        let cfg = builder.build()?;
        Ok(cfg.try_deserialize()?)
    }
}
