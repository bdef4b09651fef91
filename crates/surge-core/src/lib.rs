//! surge-core — shared types and configuration for Surge.
//!
//! Holds the vocabulary every other crate speaks: the workload being
//! scaled ([`ScalingTarget`]), the validated [`ScalingPolicy`], the
//! [`UtilizationSample`] read from a metrics source, and the
//! `surge.toml` configuration that produces them.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ControllerSettings, ResolvedConfig, ResolvedTarget, SurgeConfig};
pub use error::{ConfigError, ConfigResult, PolicyError, TargetNameError};
pub use types::*;
