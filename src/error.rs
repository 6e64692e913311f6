//! Error types for Habit Flux

use thiserror::Error;

/// Errors that can occur while loading configuration or computing scores
#[derive(Debug, Error)]
pub enum ScoringError {
    /// An activity name that the rubric does not define
    #[error("Unknown activity: {0}")]
    UnknownActivity(String),

    /// Rubric or adaptation policy data is unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Daily entries and bad-event flags must be parallel sequences
    #[error("Daily entries and bad-event flags length mismatch: {entries} entries, {flags} flags")]
    LengthMismatch { entries: usize, flags: usize },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScoringError {
    /// Stable machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            ScoringError::UnknownActivity(_) => "LOOKUP_ERROR",
            ScoringError::Configuration(_) => "CONFIGURATION_ERROR",
            ScoringError::LengthMismatch { .. } => "CONTRACT_VIOLATION",
            ScoringError::Json(_) => "JSON_ERROR",
            ScoringError::Yaml(_) => "YAML_ERROR",
            ScoringError::Io(_) => "IO_ERROR",
        }
    }
}
