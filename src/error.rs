//! Error types for statemeter
//!
//! Instrumentation never surfaces these to the observed program. They are
//! returned only from the explicit, user-driven operations: loading options,
//! reading event logs, exporting summaries.

use thiserror::Error;

/// Errors that can occur in statemeter's fallible operations
#[derive(Error, Debug)]
pub enum PerfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse perf options: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid perf option {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("Malformed event on line {line}: {source}")]
    EventLog {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to measure state size: {0}")]
    StateSize(String),
}

/// Result type for statemeter operations
pub type Result<T> = std::result::Result<T, PerfError>;
