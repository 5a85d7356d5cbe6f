use thiserror::Error;

/// Reasons a solve request is rejected before any search runs.
///
/// Conflicts are never errors; they are reported on the schedule itself.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolveError {
    #[error("invalid optimizer configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidSetting { key: &'static str, value: String },
}
