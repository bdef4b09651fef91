//! Controller error types.

use std::time::Duration;

use thiserror::Error;

use surge_core::ScaleReason;

use crate::contracts::{MetricsError, OrchestratorError};

/// Why a controller tick (or the controller itself) failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("metrics fetch for {target} timed out after {timeout:?}")]
    MetricsTimeout { target: String, timeout: Duration },

    #[error("scaling {target} to {desired} ({reason}) failed: {source}")]
    Apply {
        target: String,
        desired: u32,
        reason: ScaleReason,
        #[source]
        source: OrchestratorError,
    },

    #[error("scaling {target} to {desired} ({reason}) timed out after {timeout:?}")]
    ApplyTimeout {
        target: String,
        desired: u32,
        reason: ScaleReason,
        timeout: Duration,
    },

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

impl ControllerError {
    /// The target is gone; its loop must stop.
    pub fn is_terminal(&self) -> bool {
        match self {
            ControllerError::Apply { source, .. } => source.is_terminal(),
            ControllerError::Orchestrator(e) => e.is_terminal(),
            _ => false,
        }
    }

    /// The tick was skipped because no usable sample was obtained.
    pub fn is_metrics_failure(&self) -> bool {
        matches!(
            self,
            ControllerError::Metrics(_) | ControllerError::MetricsTimeout { .. }
        )
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;
