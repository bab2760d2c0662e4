use miette::Diagnostic;
use thiserror::Error;

use crate::abac::AbacError;

#[derive(Debug, Error, Diagnostic)]
pub enum GatekeeperError {
    #[error("I/O error on `{path}`: {source}")]
    #[diagnostic(code(gatekeeper::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Config error: {0}")]
    #[diagnostic(
        code(gatekeeper::config),
        help("Settings come from the config file and GATEKEEPER__* environment variables")
    )]
    Config(#[from] config::ConfigError),

    #[error("Invalid JSON in `{path}`: {source}")]
    #[diagnostic(code(gatekeeper::json))]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Abac(#[from] AbacError),
}
