//! Error types for policy validation and configuration loading.

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A scaling policy violated one of its invariants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("min_replicas must be at least 1")]
    MinReplicasZero,

    #[error("max_replicas ({max}) must be >= min_replicas ({min})")]
    MaxBelowMin { min: u32, max: u32 },

    #[error("target utilization must be a positive percentage, got {0}")]
    InvalidTarget(f64),
}

/// A namespace or name that can't be part of a store key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid target {0:?}: namespace and name must be non-empty without '/', ':' or ';'")]
pub struct TargetNameError(pub String);

/// Errors raised while loading or resolving `surge.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid duration for {field}: {value:?} ({source})")]
    InvalidDuration {
        field: String,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("invalid policy for target {target}: {source}")]
    InvalidPolicy {
        target: String,
        #[source]
        source: PolicyError,
    },

    #[error("target {0} is declared more than once")]
    DuplicateTarget(String),

    #[error("target name must not be empty")]
    EmptyTargetName,

    #[error(transparent)]
    InvalidTargetName(#[from] TargetNameError),

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: String },
}
