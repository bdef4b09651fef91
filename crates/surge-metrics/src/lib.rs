//! surge-metrics — observability for Surge controllers.
//!
//! Tracks per-target evaluation counters and replica gauges, and renders
//! them in Prometheus text exposition format.
//!
//! # Architecture
//!
//! ```text
//! AutoscaleMetrics
//!   ├── record_evaluation()          ← called by the controller every tick
//!   ├── record_metrics_unavailable() ← called when a sample can't be read
//!   └── snapshot() → Vec<TargetMetricsSnapshot>
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{AutoscaleMetrics, EvaluationOutcome, TargetMetricsSnapshot};
pub use prometheus::render_prometheus;
