//! Scaling decisions — the pure part of the autoscaler.
//!
//! [`evaluate`] turns one utilization sample into a [`ScalingDecision`]
//! without side effects. Enacting the decision, and updating
//! [`ControllerState`], is the controller's job.

use tokio::time::Instant;

use surge_core::{ScaleReason, ScalingPolicy, UtilizationSample};

/// Absorbs float noise so that e.g. `3 * (0.1 / 0.1)` doesn't ceil to 4.
const RATIO_EPSILON: f64 = 1e-9;

/// Per-target controller bookkeeping. Process-local, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerState {
    /// When the last replica change was successfully applied.
    pub last_decision_time: Option<Instant>,
    /// The replica count that change set.
    pub last_applied_replicas: Option<u32>,
}

impl ControllerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully applied change. Opens a new cooldown window.
    pub fn record_applied(&mut self, now: Instant, replicas: u32) {
        self.last_decision_time = Some(now);
        self.last_applied_replicas = Some(replicas);
    }
}

/// The outcome of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingDecision {
    /// Replicas reported by the sample.
    pub current_replicas: u32,
    /// Desired count before clamping.
    pub raw_desired: u32,
    /// Desired count after clamping to the policy bounds.
    pub desired_replicas: u32,
    pub reason: ScaleReason,
    pub utilization_percent: f64,
    pub timestamp: Instant,
    /// A change is wanted but the cooldown window is still open.
    pub suppressed_by_cooldown: bool,
    /// Set by the controller once the orchestrator accepted the change.
    pub applied: bool,
}

impl ScalingDecision {
    /// The desired count differs from the current one.
    pub fn is_change(&self) -> bool {
        self.desired_replicas != self.current_replicas
    }

    /// The controller should call the orchestrator for this decision.
    pub fn should_apply(&self) -> bool {
        self.is_change() && !self.suppressed_by_cooldown
    }
}

/// Compute the decision for one sample.
///
/// Pure: identical inputs always give identical decisions, and `state`
/// is only read.
pub fn evaluate(
    sample: &UtilizationSample,
    policy: &ScalingPolicy,
    state: &ControllerState,
    now: Instant,
) -> ScalingDecision {
    let current = sample.replica_count;
    let raw = raw_desired(
        current,
        sample.average_utilization_percent,
        policy.target_utilization_percent(),
    );
    let desired = raw.clamp(policy.min_replicas(), policy.max_replicas());

    let reason = if desired != raw {
        if raw < policy.min_replicas() {
            ScaleReason::ClampedToMin
        } else {
            ScaleReason::ClampedToMax
        }
    } else if desired > current {
        ScaleReason::ScaleUp
    } else if desired < current {
        ScaleReason::ScaleDown
    } else {
        ScaleReason::NoChange
    };

    let in_cooldown = state
        .last_decision_time
        .is_some_and(|last| now.saturating_duration_since(last) < policy.cooldown_period());

    ScalingDecision {
        current_replicas: current,
        raw_desired: raw,
        desired_replicas: desired,
        reason,
        utilization_percent: sample.average_utilization_percent,
        timestamp: now,
        suppressed_by_cooldown: desired != current && in_cooldown,
        applied: false,
    }
}

/// `ceil(current * utilization / target)`, saturating at `u32::MAX`.
///
/// A non-finite or negative utilization yields `current` (hold).
fn raw_desired(current: u32, utilization: f64, target: f64) -> u32 {
    if !utilization.is_finite() || utilization < 0.0 {
        return current;
    }
    let ratio = utilization / target;
    let raw = (current as f64 * ratio - RATIO_EPSILON).ceil();
    // Float-to-int `as` saturates.
    raw.max(0.0) as u32
}
