//! Persisted records for the Surge state store.
//!
//! All types are serializable to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};
use surge_core::{ScaleReason, UtilizationSample};

/// Composite `{namespace}/{name}` key of a workload.
pub type WorkloadKey = String;

// ── Workload ──────────────────────────────────────────────────────

/// A scalable workload and its current replica count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workload {
    pub namespace: String,
    pub name: String,
    pub replicas: u32,
    /// Bumped on every replica change; used for compare-and-set.
    pub generation: u64,
    /// Unix millis of the last change.
    pub updated_at_ms: u64,
}

impl Workload {
    pub fn new(namespace: &str, name: &str, replicas: u32) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            replicas,
            generation: 0,
            updated_at_ms: surge_core::epoch_millis(),
        }
    }

    /// Build the composite key for the workloads table.
    pub fn table_key(&self) -> WorkloadKey {
        format!("{}/{}", self.namespace, self.name)
    }
}

// ── Samples ───────────────────────────────────────────────────────

/// A utilization sample as stored for one workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleRecord {
    pub workload: WorkloadKey,
    #[serde(flatten)]
    pub sample: UtilizationSample,
}

impl SampleRecord {
    pub fn new(workload: &str, sample: UtilizationSample) -> Self {
        Self {
            workload: workload.to_string(),
            sample,
        }
    }

    /// Build the composite key for the samples table.
    pub fn table_key(&self) -> String {
        format!("{}:{:020}", self.workload, self.sample.observed_at_ms)
    }
}

// ── Decisions ─────────────────────────────────────────────────────

/// One evaluation of a workload, as recorded in the decision history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionRecord {
    pub workload: WorkloadKey,
    /// Unix millis when the decision was recorded.
    pub recorded_at_ms: u64,
    pub current_replicas: u32,
    pub raw_desired: u32,
    pub desired_replicas: u32,
    pub reason: ScaleReason,
    pub utilization_percent: f64,
    /// The desired count differed from current but cooldown held it back.
    pub suppressed_by_cooldown: bool,
    /// The orchestrator accepted the new replica count.
    pub applied: bool,
    /// Apply failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DecisionRecord {
    /// Build the composite key for the decisions table.
    pub fn table_key(&self, seq: u64) -> String {
        format!("{}:{:020}:{:010}", self.workload, self.recorded_at_ms, seq)
    }
}

/// Key range `[start, end)` covering every child record of a workload.
pub(crate) fn child_range(workload: &str) -> (String, String) {
    // ';' sorts immediately after ':'.
    (format!("{workload}:"), format!("{workload};"))
}
