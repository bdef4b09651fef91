//! surge-autoscale — utilization-driven replica control loop.
//!
//! Each [`Controller`] owns one [`ScalingTarget`](surge_core::ScalingTarget):
//! on every tick it reads a `UtilizationSample` from a [`MetricsSource`],
//! computes a decision with [`evaluate`], and, when the replica count
//! should change and the cooldown window is closed, asks the
//! [`Orchestrator`] to set it. The [`Supervisor`] runs one controller per
//! target, each failing independently.
//!
//! # Scaling Algorithm
//!
//! ```text
//! raw     = ceil(replicas * utilization / target_utilization)
//! desired = clamp(raw, min_replicas, max_replicas)
//!
//! reason  = ClampedToMin / ClampedToMax   if clamping moved raw
//!         = ScaleUp / ScaleDown / NoChange otherwise
//!
//! apply   = desired != replicas && now - last_applied >= cooldown
//! ```
//!
//! A decision held back by the cooldown is still computed and reported
//! (`suppressed_by_cooldown`), which is distinct from `NoChange`.
//! A failed or timed-out apply leaves the cooldown window untouched.

pub mod contracts;
pub mod controller;
pub mod error;
pub mod scaler;
pub mod store;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use contracts::{BoxFuture, MetricsError, MetricsSource, Orchestrator, OrchestratorError};
pub use controller::{Controller, ControllerPhase};
pub use error::{ControllerError, ControllerResult};
pub use scaler::{ControllerState, ScalingDecision, evaluate};
pub use store::{StoreMetricsSource, StoreOrchestrator};
pub use supervisor::Supervisor;
