//! Controller — the per-target autoscaling loop.
//!
//! One controller owns one target, its policy and its [`ControllerState`].
//! Each tick samples, decides and (maybe) applies; ticks never overlap,
//! so a slow orchestrator call delays the next tick instead of racing it.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use surge_core::{ControllerSettings, ScalingPolicy, ScalingTarget, UtilizationSample};
use surge_metrics::{AutoscaleMetrics, EvaluationOutcome};
use surge_state::{DecisionRecord, StateStore};

use crate::contracts::{MetricsError, MetricsSource, Orchestrator, OrchestratorError};
use crate::error::{ControllerError, ControllerResult};
use crate::scaler::{ControllerState, ScalingDecision, evaluate};

/// Where a controller is in its tick cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Idle,
    Sampling,
    Deciding,
    Applying,
    Stopped,
}

pub struct Controller {
    target: ScalingTarget,
    key: String,
    policy: ScalingPolicy,
    settings: ControllerSettings,
    metrics_source: Arc<dyn MetricsSource>,
    orchestrator: Arc<dyn Orchestrator>,
    state: ControllerState,
    phase: ControllerPhase,
    /// Decision history sink.
    history: Option<StateStore>,
    metrics: Option<Arc<AutoscaleMetrics>>,
}

impl Controller {
    pub fn new(
        target: ScalingTarget,
        policy: ScalingPolicy,
        settings: ControllerSettings,
        metrics_source: Arc<dyn MetricsSource>,
        orchestrator: Arc<dyn Orchestrator>,
    ) -> Self {
        let key = target.key();
        Self {
            target,
            key,
            policy,
            settings,
            metrics_source,
            orchestrator,
            state: ControllerState::new(),
            phase: ControllerPhase::Idle,
            history: None,
            metrics: None,
        }
    }

    /// Record every decision into the store's decision history.
    pub fn with_history(mut self, store: StateStore) -> Self {
        self.history = Some(store);
        self
    }

    /// Report counters and gauges into a shared registry.
    pub fn with_metrics(mut self, metrics: Arc<AutoscaleMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn target(&self) -> &ScalingTarget {
        &self.target
    }

    pub fn policy(&self) -> &ScalingPolicy {
        &self.policy
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn phase(&self) -> ControllerPhase {
        self.phase
    }

    /// Run one sample → decide → apply cycle.
    ///
    /// Returns the decision (with `applied` set if the orchestrator accepted
    /// it). Metrics failures skip the tick; apply failures leave
    /// `ControllerState` untouched so no cooldown window starts.
    pub async fn tick(&mut self, now: Instant) -> ControllerResult<ScalingDecision> {
        self.phase = ControllerPhase::Sampling;
        let sample = match self.fetch_sample().await {
            Ok(sample) => sample,
            Err(e) => {
                self.phase = ControllerPhase::Idle;
                warn!(target = %self.key, error = %e, "skipping tick: no usable sample");
                if let Some(m) = &self.metrics {
                    m.record_metrics_unavailable(&self.key).await;
                }
                // No sample may mean the workload is gone.
                if let Err(check) = self.check_target().await
                    && check.is_terminal()
                {
                    return Err(check);
                }
                return Err(e);
            }
        };

        self.phase = ControllerPhase::Deciding;
        let mut decision = evaluate(&sample, &self.policy, &self.state, now);

        if !decision.should_apply() {
            self.phase = ControllerPhase::Idle;
            let outcome = if decision.suppressed_by_cooldown {
                debug!(
                    target = %self.key,
                    reason = %decision.reason,
                    current = decision.current_replicas,
                    desired = decision.desired_replicas,
                    "change suppressed by cooldown"
                );
                EvaluationOutcome::SuppressedByCooldown
            } else {
                debug!(
                    target = %self.key,
                    reason = %decision.reason,
                    replicas = decision.current_replicas,
                    utilization = decision.utilization_percent,
                    "no change"
                );
                EvaluationOutcome::Hold
            };
            self.observe(&decision, outcome, None).await;
            return Ok(decision);
        }

        self.phase = ControllerPhase::Applying;
        let result = self.apply(&decision).await;
        self.phase = ControllerPhase::Idle;

        match result {
            Ok(()) => {
                self.state.record_applied(now, decision.desired_replicas);
                decision.applied = true;
                info!(
                    target = %self.key,
                    reason = %decision.reason,
                    from = decision.current_replicas,
                    to = decision.desired_replicas,
                    utilization = decision.utilization_percent,
                    target_utilization = self.policy.target_utilization_percent(),
                    "scaled"
                );
                self.observe(&decision, EvaluationOutcome::Applied, None).await;
                Ok(decision)
            }
            Err(e) => {
                warn!(
                    target = %self.key,
                    reason = %decision.reason,
                    desired = decision.desired_replicas,
                    error = %e,
                    "scale request failed"
                );
                let msg = e.to_string();
                self.observe(&decision, EvaluationOutcome::ApplyFailed, Some(msg)).await;
                Err(e)
            }
        }
    }

    /// Run the control loop until shutdown or a terminal error.
    ///
    /// A shutdown signal never interrupts a tick in progress: the in-flight
    /// orchestrator call completes (or times out) before the loop returns.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> ControllerResult<()> {
        info!(
            target = %self.key,
            interval_secs = self.settings.evaluation_interval.as_secs_f64(),
            min = self.policy.min_replicas(),
            max = self.policy.max_replicas(),
            target_utilization = self.policy.target_utilization_percent(),
            "controller started"
        );

        if let Err(e) = self.check_target().await {
            if e.is_terminal() {
                self.phase = ControllerPhase::Stopped;
                error!(target = %self.key, error = %e, "controller stopping: target not found");
                return Err(e);
            }
            warn!(target = %self.key, error = %e, "could not read current replicas");
        }

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.settings.evaluation_interval) => {
                    if let Err(e) = self.tick(Instant::now()).await
                        && e.is_terminal()
                    {
                        self.phase = ControllerPhase::Stopped;
                        error!(
                            target = %self.key,
                            error = %e,
                            "controller stopping: target not found"
                        );
                        return Err(e);
                    }
                }
                // A dropped sender counts as shutdown too.
                _ = shutdown.changed() => break,
            }
        }

        self.phase = ControllerPhase::Stopped;
        info!(target = %self.key, "controller stopped");
        Ok(())
    }

    async fn check_target(&self) -> ControllerResult<()> {
        let replicas = tokio::time::timeout(
            self.settings.apply_timeout,
            self.orchestrator.get_current_replicas(&self.target),
        )
        .await
        .map_err(|_| {
            ControllerError::Orchestrator(OrchestratorError::Unavailable(format!(
                "get replicas timed out after {:?}",
                self.settings.apply_timeout
            )))
        })??;
        debug!(target = %self.key, replicas, "target found");
        Ok(())
    }

    async fn fetch_sample(&self) -> ControllerResult<UtilizationSample> {
        let timeout = self.settings.metrics_timeout;
        let fetch = self.metrics_source.get_utilization(&self.target);
        let sample = tokio::time::timeout(timeout, fetch)
            .await
            .map_err(|_| ControllerError::MetricsTimeout {
                target: self.key.clone(),
                timeout,
            })??;

        let util = sample.average_utilization_percent;
        if !util.is_finite() || util < 0.0 {
            return Err(MetricsError::InvalidSample {
                target: self.key.clone(),
                reason: format!("utilization {util} is not a non-negative number"),
            }
            .into());
        }
        Ok(sample)
    }

    async fn apply(&self, decision: &ScalingDecision) -> ControllerResult<()> {
        let timeout = self.settings.apply_timeout;
        let result = tokio::time::timeout(
            timeout,
            self.orchestrator
                .set_replicas(&self.target, decision.desired_replicas),
        )
        .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(ControllerError::Apply {
                target: self.key.clone(),
                desired: decision.desired_replicas,
                reason: decision.reason,
                source,
            }),
            Err(_) => Err(ControllerError::ApplyTimeout {
                target: self.key.clone(),
                desired: decision.desired_replicas,
                reason: decision.reason,
                timeout,
            }),
        }
    }

    /// Report a decision to the metrics registry and the decision history.
    async fn observe(
        &self,
        decision: &ScalingDecision,
        outcome: EvaluationOutcome,
        error: Option<String>,
    ) {
        if let Some(m) = &self.metrics {
            m.record_evaluation(
                &self.key,
                decision.current_replicas,
                decision.desired_replicas,
                decision.utilization_percent,
                decision.reason,
                outcome,
            )
            .await;
        }

        if let Some(store) = &self.history {
            let record = DecisionRecord {
                workload: self.key.clone(),
                recorded_at_ms: surge_core::epoch_millis(),
                current_replicas: decision.current_replicas,
                raw_desired: decision.raw_desired,
                desired_replicas: decision.desired_replicas,
                reason: decision.reason,
                utilization_percent: decision.utilization_percent,
                suppressed_by_cooldown: decision.suppressed_by_cooldown,
                applied: decision.applied,
                error,
            };
            if let Err(e) = store.put_decision(&record) {
                warn!(
                    target = %self.key,
                    reason = %decision.reason,
                    error = %e,
                    "failed to record decision"
                );
            }
        }
    }
}
