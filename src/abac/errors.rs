use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AbacError>;

#[derive(Debug, Error, Diagnostic)]
pub enum AbacError {
    #[error("Malformed rule: {0}")]
    #[diagnostic(
        code(gatekeeper::abac::malformed_rule),
        help("Rules look like {{\"result\": \"allow\"|\"deny\", \"rule\": {{...}}, \"mask\": [\"field\", ...]}} and live under {{\"<resource>\": {{\"<action>\": [...]}}}}")
    )]
    MalformedRule(String),

    #[error("Unknown operator `{operator}` at `{path}`")]
    #[diagnostic(
        code(gatekeeper::abac::unknown_operator),
        help("Supported operators: eq, not, lt, gt, in, and, or. Set engine.unknown_operators = \"permissive\" to let unknown operators pass")
    )]
    UnknownOperator { operator: String, path: String },

    #[error("Type mismatch in `{operator}`: {detail}")]
    #[diagnostic(
        code(gatekeeper::abac::type_mismatch),
        help("`lt` and `gt` need numbers on both sides; `in` needs a list")
    )]
    TypeMismatch { operator: String, detail: String },

    #[error("Unsupported nesting: {0}")]
    #[diagnostic(
        code(gatekeeper::abac::unsupported_nesting),
        help("`not` may only wrap eq, not, lt or gt, e.g. {{\"sbj.age\": {{\"not\": {{\"lt\": 18}}}}}}")
    )]
    UnsupportedNesting(String),

    #[error("Invalid resolution `{0}`")]
    #[diagnostic(
        code(gatekeeper::abac::invalid_resolution),
        help("Resolutions are either \"allow\" or \"deny\"")
    )]
    InvalidResolution(String),

    #[error("Invalid record: {0}")]
    #[diagnostic(
        code(gatekeeper::abac::invalid_record),
        help("Records are JSON objects whose object name is declared in the schema")
    )]
    InvalidRecord(String),
}

impl AbacError {
    pub(crate) fn type_mismatch(operator: &str, detail: impl Into<String>) -> Self {
        AbacError::TypeMismatch {
            operator: operator.to_string(),
            detail: detail.into(),
        }
    }
}
