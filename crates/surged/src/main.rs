//! surged — the Surge autoscaler daemon.
//!
//! Single binary that assembles all Surge subsystems:
//! - State store (redb)
//! - Store-backed metrics source and orchestrator
//! - One autoscaling controller per target
//! - Controller metrics
//! - REST API
//!
//! # Usage
//!
//! ```text
//! surged run --config surge.toml --port 8080 --data-dir /var/lib/surge
//! surged autoscale --name flask-app --cpu-percent 50 --min 1 --max 10
//! surged validate --config surge.toml
//! ```

mod daemon;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use surge_core::config::{DEFAULT_COOLDOWN, parse_duration};
use surge_core::{
    ControllerSettings, ResolvedConfig, ResolvedTarget, ScalingPolicy, ScalingTarget, SurgeConfig,
};

use crate::daemon::DaemonOptions;

const DEFAULT_LOG_FILTER: &str = "info,surged=debug,surge=debug";

#[derive(Parser)]
#[command(name = "surged", about = "Surge autoscaler daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Where the daemon keeps state and serves its API.
#[derive(clap::Args)]
struct ServeArgs {
    /// Port to listen on.
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Data directory for persistent state.
    #[arg(long, default_value = "/var/lib/surge")]
    data_dir: PathBuf,

    /// Keep state in memory only.
    #[arg(long)]
    ephemeral: bool,

    /// Override the evaluation interval (e.g. "15s").
    #[arg(long)]
    interval: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run controllers for every target in a config file.
    Run {
        /// Path to surge.toml.
        #[arg(long, default_value = "surge.toml")]
        config: PathBuf,

        #[command(flatten)]
        serve: ServeArgs,
    },

    /// Autoscale a single workload without a config file.
    Autoscale {
        #[arg(long, default_value = "default")]
        namespace: String,

        #[arg(long)]
        name: String,

        #[arg(long, default_value = "1")]
        min: u32,

        #[arg(long)]
        max: u32,

        /// Target average CPU utilization, in percent.
        #[arg(long)]
        cpu_percent: f64,

        /// Minimum time between applied changes (e.g. "5m").
        #[arg(long)]
        cooldown: Option<String>,

        /// Register the workload with this many replicas if it is unknown.
        #[arg(long)]
        initial_replicas: Option<u32>,

        #[command(flatten)]
        serve: ServeArgs,
    },

    /// Check a config file and print the resolved policies.
    Validate {
        #[arg(long, default_value = "surge.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run { config, serve } => {
            let mut resolved = load_config(&config)?;
            apply_interval_override(&mut resolved.settings, serve.interval.as_deref())?;
            daemon::run(resolved, serve.into()).await
        }
        Command::Autoscale {
            namespace,
            name,
            min,
            max,
            cpu_percent,
            cooldown,
            initial_replicas,
            serve,
        } => {
            let target = ScalingTarget::new(namespace, name);
            let mut resolved = single_target(
                target,
                min,
                max,
                cpu_percent,
                cooldown.as_deref(),
                initial_replicas,
            )?;
            apply_interval_override(&mut resolved.settings, serve.interval.as_deref())?;
            daemon::run(resolved, serve.into()).await
        }
        Command::Validate { config } => {
            let resolved = load_config(&config)?;
            print_resolved(&resolved);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: &Path) -> anyhow::Result<ResolvedConfig> {
    let config = SurgeConfig::from_file(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let resolved = config
        .resolve()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(resolved)
}

/// Build the config for `surged autoscale` from its flags.
fn single_target(
    target: ScalingTarget,
    min: u32,
    max: u32,
    cpu_percent: f64,
    cooldown: Option<&str>,
    initial_replicas: Option<u32>,
) -> anyhow::Result<ResolvedConfig> {
    target.validate()?;
    let cooldown = match cooldown {
        Some(s) => parse_duration("cooldown", s)?,
        None => DEFAULT_COOLDOWN,
    };
    let policy = ScalingPolicy::new(min, max, cpu_percent, cooldown)
        .with_context(|| format!("invalid policy for {target}"))?;
    Ok(ResolvedConfig {
        settings: ControllerSettings::default(),
        targets: vec![ResolvedTarget {
            target,
            policy,
            initial_replicas,
        }],
    })
}

fn apply_interval_override(
    settings: &mut ControllerSettings,
    interval: Option<&str>,
) -> anyhow::Result<()> {
    if let Some(s) = interval {
        let d = parse_duration("interval", s)?;
        if d == Duration::ZERO {
            bail!("--interval must be greater than zero");
        }
        settings.evaluation_interval = d;
    }
    Ok(())
}

fn print_resolved(resolved: &ResolvedConfig) {
    let s = &resolved.settings;
    println!(
        "controller: interval={} metrics_timeout={} apply_timeout={} max_sample_age={}",
        humanize(s.evaluation_interval),
        humanize(s.metrics_timeout),
        humanize(s.apply_timeout),
        humanize(s.max_sample_age),
    );
    for t in &resolved.targets {
        let p = &t.policy;
        println!(
            "target {}: replicas {}..={} cpu {}% cooldown {}",
            t.target,
            p.min_replicas(),
            p.max_replicas(),
            p.target_utilization_percent(),
            humanize(p.cooldown_period()),
        );
    }
    println!("{} target(s) OK", resolved.targets.len());
}

fn humanize(d: Duration) -> String {
    humantime::format_duration(d).to_string()
}

impl From<ServeArgs> for DaemonOptions {
    fn from(args: ServeArgs) -> Self {
        DaemonOptions {
            port: args.port,
            data_dir: (!args.ephemeral).then_some(args.data_dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_target_rejects_key_separators() {
        for name in ["a:1", "x/y", ""] {
            let target = ScalingTarget::new("default", name);
            assert!(single_target(target, 1, 10, 50.0, None, None).is_err(), "name={name:?}");
        }
    }

    #[test]
    fn single_target_builds_policy() {
        let target = ScalingTarget::new("prod", "flask-app");
        let resolved = single_target(target, 2, 8, 60.0, Some("1m"), Some(3)).unwrap();

        assert_eq!(resolved.settings, ControllerSettings::default());
        let t = &resolved.targets[0];
        assert_eq!(t.target.key(), "prod/flask-app");
        assert_eq!(t.policy.min_replicas(), 2);
        assert_eq!(t.policy.cooldown_period(), Duration::from_secs(60));
        assert_eq!(t.initial_replicas, Some(3));
    }

    #[test]
    fn single_target_rejects_bad_policy() {
        let target = ScalingTarget::new("default", "api");
        assert!(single_target(target, 5, 2, 50.0, None, None).is_err());
    }

    #[test]
    fn interval_override_rejects_zero() {
        let mut settings = ControllerSettings::default();
        assert!(apply_interval_override(&mut settings, Some("0s")).is_err());
        apply_interval_override(&mut settings, Some("30s")).unwrap();
        assert_eq!(settings.evaluation_interval, Duration::from_secs(30));
    }
}
