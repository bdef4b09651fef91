//! Contracts between a controller and the two services it talks to.
//!
//! Both traits return boxed futures so controllers can hold them as
//! `Arc<dyn _>` and share one client across every target's loop.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use surge_core::{ScalingTarget, UtilizationSample};

/// A boxed, `Send` future borrowed for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failures reading utilization.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    /// No fresh reading exists for the target. Transient.
    #[error("metrics unavailable for {target}: {reason}")]
    Unavailable { target: String, reason: String },

    /// The source returned a reading that can't be evaluated.
    #[error("invalid sample for {target}: {reason}")]
    InvalidSample { target: String, reason: String },
}

/// Failures talking to the orchestrator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestratorError {
    /// The orchestrator could not be reached or failed internally. Transient.
    #[error("orchestrator unavailable: {0}")]
    Unavailable(String),

    /// The workload was modified concurrently. Transient.
    #[error("conflict scaling {0}: workload was modified concurrently")]
    Conflict(String),

    /// The workload no longer exists. Terminal for its controller.
    #[error("workload not found: {0}")]
    NotFound(String),
}

impl OrchestratorError {
    /// Whether the controller for this target should stop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrchestratorError::NotFound(_))
    }
}

/// Source of per-target utilization readings.
pub trait MetricsSource: Send + Sync {
    fn get_utilization<'a>(
        &'a self,
        target: &'a ScalingTarget,
    ) -> BoxFuture<'a, Result<UtilizationSample, MetricsError>>;
}

/// The system that actually runs replicas.
///
/// Implementations must be safe for concurrent use by many controllers.
pub trait Orchestrator: Send + Sync {
    /// Set the replica count. A single atomic call: it either happens or it doesn't.
    fn set_replicas<'a>(
        &'a self,
        target: &'a ScalingTarget,
        count: u32,
    ) -> BoxFuture<'a, Result<(), OrchestratorError>>;

    fn get_current_replicas<'a>(
        &'a self,
        target: &'a ScalingTarget,
    ) -> BoxFuture<'a, Result<u32, OrchestratorError>>;
}
