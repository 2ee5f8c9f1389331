//! Hard-failure error types.
//!
//! Everything below the orchestrator is exception-free on the success path:
//! the parser degrades to a skeleton, the validator returns data and the
//! repairer returns a best-effort board. Only configuration faults (and I/O,
//! which travels as `anyhow::Error`) are raised.

use thiserror::Error;

/// Configuration faults. Raised before any generator call is spent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required upstream field {field:?} is missing or empty")]
    MissingUpstreamField { field: String },

    #[error("invalid rule set: {0}")]
    InvalidRuleSet(String),

    #[error("rule set TOML parse error: {0}")]
    RuleSetToml(#[from] toml::de::Error),

    #[error("failed to read config file {path}: {source}")]
    ReadConfig {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseConfig {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}
