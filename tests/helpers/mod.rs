pub mod builders;
pub mod fixtures;

pub use builders::EngineBuilder;
pub use fixtures::{crm_rules, crm_schema, subject};
