//! Daemon assembly — wires the store, controllers and API together.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use surge_autoscale::{StoreMetricsSource, StoreOrchestrator, Supervisor};
use surge_core::{ControllerSettings, ResolvedConfig, ResolvedTarget};
use surge_metrics::AutoscaleMetrics;
use surge_state::{StateStore, Workload};

pub struct DaemonOptions {
    pub port: u16,
    /// `None` keeps all state in memory.
    pub data_dir: Option<PathBuf>,
}

pub async fn run(config: ResolvedConfig, opts: DaemonOptions) -> anyhow::Result<()> {
    info!(targets = config.targets.len(), "Surge daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let store = open_store(opts.data_dir.as_ref())?;
    register_workloads(&store, &config.targets)?;

    let metrics = Arc::new(AutoscaleMetrics::new());
    let supervisor = build_supervisor(store.clone(), config.settings, Arc::clone(&metrics));
    info!(
        interval_secs = config.settings.evaluation_interval.as_secs_f64(),
        "supervisor initialized"
    );

    for t in &config.targets {
        supervisor.start(t.target.clone(), t.policy.clone()).await;
    }

    // ── Start API server ───────────────────────────────────────

    let router = surge_api::build_router(store, metrics);
    let addr = SocketAddr::from(([0, 0, 0, 0], opts.port));
    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight scale calls finish before the loops exit.
    supervisor.stop_all().await;

    info!("Surge daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "failed to install Ctrl-C handler; shutting down"),
    }
}

fn open_store(data_dir: Option<&PathBuf>) -> anyhow::Result<StateStore> {
    match data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let db_path = dir.join("surge.redb");
            let store = StateStore::open(&db_path)?;
            info!(path = ?db_path, "state store opened");
            Ok(store)
        }
        None => {
            let store = StateStore::open_in_memory()?;
            warn!("state store is in memory; state is lost on exit");
            Ok(store)
        }
    }
}

/// Make sure every configured target has a workload record.
///
/// Existing records are left alone so a restart doesn't undo scaling.
/// Unknown workloads start at `initial_replicas`, or the policy floor.
pub(crate) fn register_workloads(
    store: &StateStore,
    targets: &[ResolvedTarget],
) -> anyhow::Result<()> {
    for t in targets {
        let replicas = t
            .initial_replicas
            .unwrap_or_else(|| t.policy.min_replicas());
        let workload = Workload::new(&t.target.namespace, &t.target.name, replicas);
        if store.insert_workload_if_absent(&workload)? {
            info!(target = %t.target, replicas, "workload registered");
        }
    }
    Ok(())
}

pub(crate) fn build_supervisor(
    store: StateStore,
    settings: ControllerSettings,
    metrics: Arc<AutoscaleMetrics>,
) -> Supervisor {
    let source = Arc::new(StoreMetricsSource::new(store.clone(), settings.max_sample_age));
    let orchestrator = Arc::new(StoreOrchestrator::new(store.clone()));
    Supervisor::new(settings, source, orchestrator)
        .with_history(store)
        .with_metrics(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use surge_core::{ScalingPolicy, ScalingTarget, UtilizationSample};
    use surge_state::SampleRecord;

    fn target(name: &str, initial: Option<u32>) -> ResolvedTarget {
        ResolvedTarget {
            target: ScalingTarget::new("default", name),
            policy: ScalingPolicy::new(2, 10, 50.0, Duration::from_secs(60)).unwrap(),
            initial_replicas: initial,
        }
    }

    #[test]
    fn register_uses_initial_or_floor() {
        let store = StateStore::open_in_memory().unwrap();
        register_workloads(&store, &[target("web", Some(4)), target("api", None)]).unwrap();

        assert_eq!(store.get_workload("default/web").unwrap().unwrap().replicas, 4);
        assert_eq!(store.get_workload("default/api").unwrap().unwrap().replicas, 2);
    }

    #[test]
    fn register_keeps_existing_records() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_workload(&Workload::new("default", "web", 7)).unwrap();

        register_workloads(&store, &[target("web", Some(1))]).unwrap();
        assert_eq!(store.get_workload("default/web").unwrap().unwrap().replicas, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_scales_stored_workload() {
        let store = StateStore::open_in_memory().unwrap();
        let t = target("web", Some(3));
        register_workloads(&store, std::slice::from_ref(&t)).unwrap();
        store
            .put_sample(&SampleRecord::new("default/web", UtilizationSample::new(3, 80.0)))
            .unwrap();

        let settings = ControllerSettings {
            evaluation_interval: Duration::from_secs(5),
            ..ControllerSettings::default()
        };
        let metrics = Arc::new(AutoscaleMetrics::new());
        let supervisor = build_supervisor(store.clone(), settings, Arc::clone(&metrics));
        supervisor.start(t.target.clone(), t.policy.clone()).await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        supervisor.stop_all().await;

        assert_eq!(store.get_workload("default/web").unwrap().unwrap().replicas, 5);
        let decisions = store.list_decisions("default/web", 10).unwrap();
        assert_eq!(decisions.len(), 1);
        assert!(decisions[0].applied);
        assert_eq!(metrics.target("default/web").await.unwrap().scale_ups, 1);
    }
}
