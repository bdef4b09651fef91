//! Metrics collector — tracks per-target controller activity.
//!
//! Counters and gauges are atomics; the target map sits behind an async
//! `RwLock` and is only write-locked when a new target first reports.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use surge_core::ScaleReason;

/// What happened to a decision after it was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationOutcome {
    /// Desired equals current; nothing to do.
    Hold,
    /// The orchestrator accepted the new replica count.
    Applied,
    /// A change was wanted but the cooldown window was still open.
    SuppressedByCooldown,
    /// The orchestrator call failed or timed out.
    ApplyFailed,
}

/// Per-target counters and gauges.
#[derive(Default)]
struct TargetMetrics {
    evaluations: AtomicU64,
    scale_ups: AtomicU64,
    scale_downs: AtomicU64,
    suppressed_by_cooldown: AtomicU64,
    apply_failures: AtomicU64,
    metrics_unavailable: AtomicU64,
    current_replicas: AtomicU64,
    desired_replicas: AtomicU64,
    /// f64 bit pattern.
    utilization_percent: AtomicU64,
    last_reason: std::sync::Mutex<Option<ScaleReason>>,
}

/// Point-in-time copy of one target's metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetMetricsSnapshot {
    pub target: String,
    pub evaluations: u64,
    pub scale_ups: u64,
    pub scale_downs: u64,
    pub suppressed_by_cooldown: u64,
    pub apply_failures: u64,
    pub metrics_unavailable: u64,
    pub current_replicas: u64,
    pub desired_replicas: u64,
    pub utilization_percent: f64,
    pub last_reason: Option<ScaleReason>,
}

/// Shared registry of controller metrics, keyed by target key.
#[derive(Default)]
pub struct AutoscaleMetrics {
    targets: RwLock<HashMap<String, Arc<TargetMetrics>>>,
}

impl AutoscaleMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, target: &str) -> Arc<TargetMetrics> {
        if let Some(m) = self.targets.read().await.get(target) {
            return Arc::clone(m);
        }
        let mut targets = self.targets.write().await;
        let slot = targets.entry(target.to_string()).or_insert_with(|| {
            debug!(%target, "registered for controller metrics");
            Arc::new(TargetMetrics::default())
        });
        Arc::clone(slot)
    }

    /// Record one completed evaluation.
    pub async fn record_evaluation(
        &self,
        target: &str,
        current: u32,
        desired: u32,
        utilization_percent: f64,
        reason: ScaleReason,
        outcome: EvaluationOutcome,
    ) {
        let m = self.slot(target).await;
        m.evaluations.fetch_add(1, Ordering::Relaxed);
        m.desired_replicas.store(desired as u64, Ordering::Relaxed);
        m.utilization_percent
            .store(utilization_percent.to_bits(), Ordering::Relaxed);
        if let Ok(mut last) = m.last_reason.lock() {
            *last = Some(reason);
        }

        match outcome {
            EvaluationOutcome::Applied => {
                if desired > current {
                    m.scale_ups.fetch_add(1, Ordering::Relaxed);
                } else if desired < current {
                    m.scale_downs.fetch_add(1, Ordering::Relaxed);
                }
                m.current_replicas.store(desired as u64, Ordering::Relaxed);
            }
            EvaluationOutcome::SuppressedByCooldown => {
                m.suppressed_by_cooldown.fetch_add(1, Ordering::Relaxed);
                m.current_replicas.store(current as u64, Ordering::Relaxed);
            }
            EvaluationOutcome::ApplyFailed => {
                m.apply_failures.fetch_add(1, Ordering::Relaxed);
                m.current_replicas.store(current as u64, Ordering::Relaxed);
            }
            EvaluationOutcome::Hold => {
                m.current_replicas.store(current as u64, Ordering::Relaxed);
            }
        }
    }

    /// Record a tick skipped because no fresh sample was available.
    pub async fn record_metrics_unavailable(&self, target: &str) {
        let m = self.slot(target).await;
        m.metrics_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop a target's metrics (e.g. after its controller stopped for good).
    pub async fn remove(&self, target: &str) {
        self.targets.write().await.remove(target);
    }

    /// Copy out every target's metrics, sorted by target key.
    pub async fn snapshot(&self) -> Vec<TargetMetricsSnapshot> {
        let targets = self.targets.read().await;
        let mut out: Vec<TargetMetricsSnapshot> = targets
            .iter()
            .map(|(target, m)| TargetMetricsSnapshot {
                target: target.clone(),
                evaluations: m.evaluations.load(Ordering::Relaxed),
                scale_ups: m.scale_ups.load(Ordering::Relaxed),
                scale_downs: m.scale_downs.load(Ordering::Relaxed),
                suppressed_by_cooldown: m.suppressed_by_cooldown.load(Ordering::Relaxed),
                apply_failures: m.apply_failures.load(Ordering::Relaxed),
                metrics_unavailable: m.metrics_unavailable.load(Ordering::Relaxed),
                current_replicas: m.current_replicas.load(Ordering::Relaxed),
                desired_replicas: m.desired_replicas.load(Ordering::Relaxed),
                utilization_percent: f64::from_bits(m.utilization_percent.load(Ordering::Relaxed)),
                last_reason: m.last_reason.lock().ok().and_then(|r| *r),
            })
            .collect();
        out.sort_by(|a, b| a.target.cmp(&b.target));
        out
    }

    /// Snapshot for a single target, if it has reported.
    pub async fn target(&self, target: &str) -> Option<TargetMetricsSnapshot> {
        self.snapshot().await.into_iter().find(|s| s.target == target)
    }
}
