//! Shared types used across Surge crates.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, TargetNameError};

/// The workload a controller scales, identified by namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScalingTarget {
    pub namespace: String,
    pub name: String,
}

impl ScalingTarget {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Composite `{namespace}/{name}` key used by the store and the API.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Both parts end up inside sample and decision keys, so neither may
    /// be empty or carry a key separator.
    pub fn validate(&self) -> Result<(), TargetNameError> {
        for part in [&self.namespace, &self.name] {
            if part.is_empty() || part.contains(['/', ':', ';']) {
                return Err(TargetNameError(self.key()));
            }
        }
        Ok(())
    }

    /// Parse a `{namespace}/{name}` key. A bare name lands in `default`.
    pub fn from_key(key: &str) -> Self {
        match key.split_once('/') {
            Some((namespace, name)) => Self::new(namespace, name),
            None => Self::new("default", key),
        }
    }
}

impl fmt::Display for ScalingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// How far ahead of the local clock a sample timestamp may be.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(5);

/// A point-in-time utilization reading for one workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSample {
    /// Replicas running when the sample was taken.
    pub replica_count: u32,
    /// Average CPU utilization across replicas, as a percentage of request.
    pub average_utilization_percent: f64,
    /// Wall-clock time of the observation (unix millis).
    pub observed_at_ms: u64,
}

impl UtilizationSample {
    /// A sample observed now.
    pub fn new(replica_count: u32, average_utilization_percent: f64) -> Self {
        Self {
            replica_count,
            average_utilization_percent,
            observed_at_ms: epoch_millis(),
        }
    }

    /// Age of the sample relative to `now_ms`, zero for a future sample.
    /// Check [`is_from_future`](Self::is_from_future) first.
    pub fn age(&self, now_ms: u64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.observed_at_ms))
    }

    /// Observed more than [`MAX_CLOCK_SKEW`] after `now_ms`.
    pub fn is_from_future(&self, now_ms: u64) -> bool {
        self.observed_at_ms > now_ms.saturating_add(MAX_CLOCK_SKEW.as_millis() as u64)
    }
}

/// Replica bounds, utilization target and cooldown for one workload.
///
/// Only constructible through [`ScalingPolicy::new`], which enforces
/// `1 <= min <= max`, a positive finite target, and is immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingPolicy {
    min_replicas: u32,
    max_replicas: u32,
    target_utilization_percent: f64,
    #[serde(with = "duration_secs")]
    cooldown_period: Duration,
}

impl ScalingPolicy {
    pub fn new(
        min_replicas: u32,
        max_replicas: u32,
        target_utilization_percent: f64,
        cooldown_period: Duration,
    ) -> Result<Self, PolicyError> {
        if min_replicas == 0 {
            return Err(PolicyError::MinReplicasZero);
        }
        if max_replicas < min_replicas {
            return Err(PolicyError::MaxBelowMin {
                min: min_replicas,
                max: max_replicas,
            });
        }
        if !target_utilization_percent.is_finite() || target_utilization_percent <= 0.0 {
            return Err(PolicyError::InvalidTarget(target_utilization_percent));
        }
        Ok(Self {
            min_replicas,
            max_replicas,
            target_utilization_percent,
            cooldown_period,
        })
    }

    pub fn min_replicas(&self) -> u32 {
        self.min_replicas
    }

    pub fn max_replicas(&self) -> u32 {
        self.max_replicas
    }

    pub fn target_utilization_percent(&self) -> f64 {
        self.target_utilization_percent
    }

    pub fn cooldown_period(&self) -> Duration {
        self.cooldown_period
    }
}

/// Why a decision landed on its desired replica count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleReason {
    NoChange,
    ScaleUp,
    ScaleDown,
    ClampedToMin,
    ClampedToMax,
}

impl ScaleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleReason::NoChange => "no_change",
            ScaleReason::ScaleUp => "scale_up",
            ScaleReason::ScaleDown => "scale_down",
            ScaleReason::ClampedToMin => "clamped_to_min",
            ScaleReason::ClampedToMax => "clamped_to_max",
        }
    }
}

impl fmt::Display for ScaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current wall-clock time in unix milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}
