//! Prometheus text exposition format.
//!
//! Renders controller metrics snapshots for scraping by a Prometheus
//! server or compatible agent.

use std::fmt::Write;

use crate::collector::TargetMetricsSnapshot;

type Field = fn(&TargetMetricsSnapshot) -> String;

const SERIES: &[(&str, &str, &str, Field)] = &[
    (
        "surge_evaluations_total",
        "counter",
        "Controller evaluations performed.",
        |s: &TargetMetricsSnapshot| s.evaluations.to_string(),
    ),
    (
        "surge_scale_ups_total",
        "counter",
        "Scale-up changes applied.",
        |s: &TargetMetricsSnapshot| s.scale_ups.to_string(),
    ),
    (
        "surge_scale_downs_total",
        "counter",
        "Scale-down changes applied.",
        |s: &TargetMetricsSnapshot| s.scale_downs.to_string(),
    ),
    (
        "surge_suppressed_by_cooldown_total",
        "counter",
        "Changes computed but held back by the cooldown window.",
        |s: &TargetMetricsSnapshot| s.suppressed_by_cooldown.to_string(),
    ),
    (
        "surge_apply_failures_total",
        "counter",
        "Failed or timed-out orchestrator calls.",
        |s: &TargetMetricsSnapshot| s.apply_failures.to_string(),
    ),
    (
        "surge_metrics_unavailable_total",
        "counter",
        "Ticks skipped because no fresh utilization sample was available.",
        |s: &TargetMetricsSnapshot| s.metrics_unavailable.to_string(),
    ),
    (
        "surge_current_replicas",
        "gauge",
        "Replica count observed at the last evaluation.",
        |s: &TargetMetricsSnapshot| s.current_replicas.to_string(),
    ),
    (
        "surge_desired_replicas",
        "gauge",
        "Replica count computed at the last evaluation.",
        |s: &TargetMetricsSnapshot| s.desired_replicas.to_string(),
    ),
    (
        "surge_utilization_percent",
        "gauge",
        "Average CPU utilization at the last evaluation.",
        |s: &TargetMetricsSnapshot| format!("{:.2}", s.utilization_percent),
    ),
];

/// Render controller snapshots into Prometheus text format.
///
/// Every series carries a `target` label (`namespace/name`).
pub fn render_prometheus(snapshots: &[TargetMetricsSnapshot]) -> String {
    let mut out = String::new();

    for (name, kind, help, field) in SERIES {
        let _ = writeln!(out, "# HELP {name} {help}");
        let _ = writeln!(out, "# TYPE {name} {kind}");
        for s in snapshots {
            let _ = writeln!(out, "{name}{{target=\"{}\"}} {}", escape_label(&s.target), field(s));
        }
    }

    out
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
