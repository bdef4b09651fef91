//! Store-backed metrics source and orchestrator.
//!
//! `surged` scales workloads recorded in its own [`StateStore`]: samples
//! are pushed over the REST API, and "setting replicas" means updating
//! the workload record. Both adapters share one store handle.

use std::time::Duration;

use tracing::debug;

use surge_core::{ScalingTarget, UtilizationSample};
use surge_state::{StateError, StateStore};

use crate::contracts::*;

/// Reads the newest pushed sample for a workload.
pub struct StoreMetricsSource {
    store: StateStore,
    max_sample_age: Duration,
}

impl StoreMetricsSource {
    pub fn new(store: StateStore, max_sample_age: Duration) -> Self {
        Self {
            store,
            max_sample_age,
        }
    }

    fn latest(&self, target: &ScalingTarget) -> Result<UtilizationSample, MetricsError> {
        let key = target.key();
        let unavailable = |reason: String| MetricsError::Unavailable {
            target: key.clone(),
            reason,
        };

        let workload = self
            .store
            .get_workload(&key)
            .map_err(|e| unavailable(e.to_string()))?
            .ok_or_else(|| unavailable("workload not registered".into()))?;
        let record = self
            .store
            .latest_sample(&key)
            .map_err(|e| unavailable(e.to_string()))?
            .ok_or_else(|| unavailable("no samples".into()))?;

        let sample = record.sample;
        let now_ms = surge_core::epoch_millis();
        if sample.is_from_future(now_ms) {
            return Err(unavailable(format!(
                "newest sample is {}ms in the future",
                sample.observed_at_ms - now_ms
            )));
        }
        let age = sample.age(now_ms);
        if age > self.max_sample_age {
            return Err(unavailable(format!(
                "newest sample is {}s old (limit {}s)",
                age.as_secs(),
                self.max_sample_age.as_secs()
            )));
        }

        // Utilization is an average over the replicas that were running
        // when it was measured. After a scale it no longer describes the
        // workload, and reusing it would scale again on the same reading.
        if sample.replica_count != workload.replicas
            || sample.observed_at_ms < workload.updated_at_ms
        {
            return Err(unavailable(format!(
                "newest sample predates the last scale ({} replicas, now {})",
                sample.replica_count, workload.replicas
            )));
        }

        Ok(sample)
    }
}

impl MetricsSource for StoreMetricsSource {
    fn get_utilization<'a>(
        &'a self,
        target: &'a ScalingTarget,
    ) -> BoxFuture<'a, Result<UtilizationSample, MetricsError>> {
        Box::pin(async move { self.latest(target) })
    }
}

/// Applies replica counts to workload records with compare-and-set.
pub struct StoreOrchestrator {
    store: StateStore,
}

impl StoreOrchestrator {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    fn scale(&self, target: &ScalingTarget, count: u32) -> Result<(), OrchestratorError> {
        let key = target.key();
        let workload = self
            .store
            .get_workload(&key)
            .map_err(|e| map_state_error(&key, e))?
            .ok_or_else(|| OrchestratorError::NotFound(key.clone()))?;

        let updated = self
            .store
            .set_replicas(&key, count, Some(workload.generation))
            .map_err(|e| map_state_error(&key, e))?;
        debug!(
            target = %key,
            replicas = updated.replicas,
            generation = updated.generation,
            "workload scaled"
        );
        Ok(())
    }

    fn current(&self, target: &ScalingTarget) -> Result<u32, OrchestratorError> {
        let key = target.key();
        self.store
            .get_workload(&key)
            .map_err(|e| map_state_error(&key, e))?
            .map(|w| w.replicas)
            .ok_or(OrchestratorError::NotFound(key))
    }
}

impl Orchestrator for StoreOrchestrator {
    fn set_replicas<'a>(
        &'a self,
        target: &'a ScalingTarget,
        count: u32,
    ) -> BoxFuture<'a, Result<(), OrchestratorError>> {
        Box::pin(async move { self.scale(target, count) })
    }

    fn get_current_replicas<'a>(
        &'a self,
        target: &'a ScalingTarget,
    ) -> BoxFuture<'a, Result<u32, OrchestratorError>> {
        Box::pin(async move { self.current(target) })
    }
}

fn map_state_error(key: &str, e: StateError) -> OrchestratorError {
    match e {
        StateError::NotFound(_) => OrchestratorError::NotFound(key.to_string()),
        StateError::Conflict { .. } => OrchestratorError::Conflict(key.to_string()),
        other => OrchestratorError::Unavailable(other.to_string()),
    }
}
