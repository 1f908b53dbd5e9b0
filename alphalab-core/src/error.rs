//! Error types shared across the engine.
//!
//! `ConfigError` is fatal and raised before a simulation starts. `StrategyError` is what a
//! strategy callback returns when it cannot answer; the simulator isolates it to one
//! symbol/step and records it as a diagnostic instead of aborting the run.

use thiserror::Error;

/// Invalid or unresolvable configuration. Always surfaced before simulation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid config value {field} = {value}: {reason}")]
    Invalid {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("no strategies configured")]
    NoStrategies,

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("cannot read config {path}: {message}")]
    Io { path: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, value: impl ToString, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure inside a strategy callback.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    #[error("missing feature column '{0}'")]
    MissingFeature(String),

    #[error("insufficient history: need {required} rows, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("strategy failure: {0}")]
    Failed(String),
}
