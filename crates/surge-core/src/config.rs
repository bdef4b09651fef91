//! surge.toml configuration parser.
//!
//! The raw sections mirror the file one-to-one and keep every field
//! optional; [`SurgeConfig::resolve`] applies defaults, parses durations
//! and turns each `[[targets]]` entry into a validated [`ScalingPolicy`].

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{ScalingPolicy, ScalingTarget};

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_EVALUATION_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_METRICS_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_APPLY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_SAMPLE_AGE: Duration = Duration::from_secs(60);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SurgeConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub evaluation_interval: Option<String>,
    pub metrics_timeout: Option<String>,
    pub apply_timeout: Option<String>,
    pub max_sample_age: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub namespace: Option<String>,
    pub name: String,
    pub min_replicas: Option<u32>,
    pub max_replicas: u32,
    pub target_cpu_percent: f64,
    pub cooldown_period: Option<String>,
    /// Registers the workload with this replica count if the store lacks it.
    pub initial_replicas: Option<u32>,
}

/// Loop cadence and per-call timeouts shared by every controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub evaluation_interval: Duration,
    pub metrics_timeout: Duration,
    pub apply_timeout: Duration,
    pub max_sample_age: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            evaluation_interval: DEFAULT_EVALUATION_INTERVAL,
            metrics_timeout: DEFAULT_METRICS_TIMEOUT,
            apply_timeout: DEFAULT_APPLY_TIMEOUT,
            max_sample_age: DEFAULT_MAX_SAMPLE_AGE,
        }
    }
}

/// A target with its validated policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub target: ScalingTarget,
    pub policy: ScalingPolicy,
    pub initial_replicas: Option<u32>,
}

/// Fully validated configuration, ready to drive controllers.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub settings: ControllerSettings,
    pub targets: Vec<ResolvedTarget>,
}

impl SurgeConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply defaults and validate every section.
    pub fn resolve(&self) -> ConfigResult<ResolvedConfig> {
        let settings = self.controller.resolve()?;

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(self.targets.len());
        for t in &self.targets {
            let resolved = t.resolve()?;
            if !seen.insert(resolved.target.key()) {
                return Err(ConfigError::DuplicateTarget(resolved.target.key()));
            }
            targets.push(resolved);
        }

        Ok(ResolvedConfig { settings, targets })
    }
}

impl ControllerConfig {
    fn resolve(&self) -> ConfigResult<ControllerSettings> {
        let settings = ControllerSettings {
            evaluation_interval: parse_or(
                "controller.evaluation_interval",
                self.evaluation_interval.as_deref(),
                DEFAULT_EVALUATION_INTERVAL,
            )?,
            metrics_timeout: parse_or(
                "controller.metrics_timeout",
                self.metrics_timeout.as_deref(),
                DEFAULT_METRICS_TIMEOUT,
            )?,
            apply_timeout: parse_or(
                "controller.apply_timeout",
                self.apply_timeout.as_deref(),
                DEFAULT_APPLY_TIMEOUT,
            )?,
            max_sample_age: parse_or(
                "controller.max_sample_age",
                self.max_sample_age.as_deref(),
                DEFAULT_MAX_SAMPLE_AGE,
            )?,
        };

        for (field, value) in [
            ("controller.evaluation_interval", settings.evaluation_interval),
            ("controller.metrics_timeout", settings.metrics_timeout),
            ("controller.apply_timeout", settings.apply_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration {
                    field: field.to_string(),
                });
            }
        }

        Ok(settings)
    }
}

impl TargetConfig {
    fn resolve(&self) -> ConfigResult<ResolvedTarget> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyTargetName);
        }
        let namespace = self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
        let target = ScalingTarget::new(namespace, self.name.as_str());
        target.validate()?;

        let cooldown = parse_or(
            &format!("{target}.cooldown_period"),
            self.cooldown_period.as_deref(),
            DEFAULT_COOLDOWN,
        )?;

        let policy = ScalingPolicy::new(
            self.min_replicas.unwrap_or(1),
            self.max_replicas,
            self.target_cpu_percent,
            cooldown,
        )
        .map_err(|source| ConfigError::InvalidPolicy {
            target: target.key(),
            source,
        })?;

        Ok(ResolvedTarget {
            target,
            policy,
            initial_replicas: self.initial_replicas,
        })
    }
}

/// Parse a humantime duration ("30s", "5m", "1h 30m").
pub fn parse_duration(field: &str, value: &str) -> ConfigResult<Duration> {
    humantime::parse_duration(value.trim()).map_err(|source| ConfigError::InvalidDuration {
        field: field.to_string(),
        value: value.to_string(),
        source,
    })
}

fn parse_or(field: &str, value: Option<&str>, default: Duration) -> ConfigResult<Duration> {
    match value {
        Some(v) => parse_duration(field, v),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[controller]
evaluation_interval = "10s"
metrics_timeout = "2s"
apply_timeout = "3s"
max_sample_age = "1m"

[[targets]]
namespace = "prod"
name = "flask-app"
min_replicas = 2
max_replicas = 10
target_cpu_percent = 50.0
cooldown_period = "2m"
initial_replicas = 3

[[targets]]
name = "worker"
max_replicas = 4
target_cpu_percent = 80
"#;

    #[test]
    fn test_parse_and_resolve_full() {
        let config = SurgeConfig::from_toml_str(FULL).unwrap();
        let resolved = config.resolve().unwrap();

        assert_eq!(resolved.settings.evaluation_interval, Duration::from_secs(10));
        assert_eq!(resolved.settings.metrics_timeout, Duration::from_secs(2));
        assert_eq!(resolved.settings.apply_timeout, Duration::from_secs(3));
        assert_eq!(resolved.settings.max_sample_age, Duration::from_secs(60));

        assert_eq!(resolved.targets.len(), 2);
        let app = &resolved.targets[0];
        assert_eq!(app.target.key(), "prod/flask-app");
        assert_eq!(app.policy.min_replicas(), 2);
        assert_eq!(app.policy.cooldown_period(), Duration::from_secs(120));
        assert_eq!(app.initial_replicas, Some(3));

        let worker = &resolved.targets[1];
        assert_eq!(worker.target.key(), "default/worker");
        assert_eq!(worker.policy.min_replicas(), 1);
        assert_eq!(worker.policy.target_utilization_percent(), 80.0);
        assert_eq!(worker.policy.cooldown_period(), DEFAULT_COOLDOWN);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let resolved = SurgeConfig::from_toml_str("").unwrap().resolve().unwrap();
        assert_eq!(resolved.settings, ControllerSettings::default());
        assert!(resolved.targets.is_empty());
    }

    #[test]
    fn test_invalid_policy_names_target() {
        let toml_str = r#"
[[targets]]
name = "api"
min_replicas = 5
max_replicas = 2
target_cpu_percent = 50
"#;
        let err = SurgeConfig::from_toml_str(toml_str).unwrap().resolve().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidPolicy { ref target, .. } if target == "default/api"
        ));
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let toml_str = r#"
[controller]
evaluation_interval = "soon"
"#;
        let err = SurgeConfig::from_toml_str(toml_str).unwrap().resolve().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration { .. }));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let toml_str = r#"
[controller]
evaluation_interval = "0s"
"#;
        let err = SurgeConfig::from_toml_str(toml_str).unwrap().resolve().unwrap_err();
        assert!(matches!(err, ConfigError::ZeroDuration { .. }));
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let toml_str = r#"
[[targets]]
name = "api"
max_replicas = 3
target_cpu_percent = 50

[[targets]]
namespace = "default"
name = "api"
max_replicas = 5
target_cpu_percent = 60
"#;
        let err = SurgeConfig::from_toml_str(toml_str).unwrap().resolve().unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateTarget(ref k) if k == "default/api"));
    }

    #[test]
    fn test_key_separators_in_name_rejected() {
        let toml_str = r#"
[[targets]]
name = "api:v2"
max_replicas = 3
target_cpu_percent = 50
"#;
        let err = SurgeConfig::from_toml_str(toml_str).unwrap().resolve().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTargetName(ref e) if e.0 == "default/api:v2"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surge.toml");
        std::fs::write(&path, FULL).unwrap();

        let config = SurgeConfig::from_file(&path).unwrap();
        assert_eq!(config.targets.len(), 2);

        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("flask-app"));
    }

    #[test]
    fn test_demo_config_resolves() {
        let config = SurgeConfig::from_toml_str(include_str!("../../../demos/surge.toml")).unwrap();
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.targets.len(), 2);
        assert_eq!(resolved.targets[1].target.key(), "batch/worker");
    }

    #[test]
    fn test_parse_duration_values() {
        assert_eq!(parse_duration("x", "30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("x", "5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("x", "500ms").unwrap(), Duration::from_millis(500));
        assert!(parse_duration("x", "invalid").is_err());
    }
}
