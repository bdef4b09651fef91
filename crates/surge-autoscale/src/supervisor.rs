//! Supervisor — runs one controller task per scaling target.
//!
//! Controllers share the metrics source and orchestrator but nothing
//! else: a target whose workload disappears stops on its own and
//! removes itself, while every other target keeps scaling.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use surge_core::{ControllerSettings, ScalingPolicy, ScalingTarget};
use surge_metrics::AutoscaleMetrics;
use surge_state::StateStore;

use crate::contracts::{MetricsSource, Orchestrator};
use crate::controller::Controller;

/// A running controller task.
struct ControllerSlot {
    /// Distinguishes a replacement from the slot it replaced.
    id: u64,
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

type Slots = Arc<RwLock<HashMap<String, ControllerSlot>>>;

pub struct Supervisor {
    settings: ControllerSettings,
    metrics_source: Arc<dyn MetricsSource>,
    orchestrator: Arc<dyn Orchestrator>,
    history: Option<StateStore>,
    metrics: Option<Arc<AutoscaleMetrics>>,
    /// Active controllers: target key → slot.
    slots: Slots,
    next_id: AtomicU64,
}

impl Supervisor {
    pub fn new(
        settings: ControllerSettings,
        metrics_source: Arc<dyn MetricsSource>,
        orchestrator: Arc<dyn Orchestrator>,
    ) -> Self {
        Self {
            settings,
            metrics_source,
            orchestrator,
            history: None,
            metrics: None,
            slots: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Record every controller's decisions in the store.
    pub fn with_history(mut self, store: StateStore) -> Self {
        self.history = Some(store);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<AutoscaleMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Start a controller for `target`, replacing any running one.
    ///
    /// The replaced controller finishes its in-flight tick before it exits.
    pub async fn start(&self, target: ScalingTarget, policy: ScalingPolicy) {
        let key = target.key();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut controller = Controller::new(
            target,
            policy,
            self.settings,
            Arc::clone(&self.metrics_source),
            Arc::clone(&self.orchestrator),
        );
        if let Some(store) = &self.history {
            controller = controller.with_history(store.clone());
        }
        if let Some(metrics) = &self.metrics {
            controller = controller.with_metrics(Arc::clone(metrics));
        }

        let old = {
            let mut slots = self.slots.write().await;
            let slots_ref = Arc::clone(&self.slots);
            let metrics = self.metrics.clone();
            let task_key = key.clone();

            let handle = tokio::spawn(async move {
                if controller.run(shutdown_rx).await.is_err() {
                    // Terminal: drop our own slot unless we've been replaced.
                    let mut slots = slots_ref.write().await;
                    if slots.get(&task_key).is_some_and(|s| s.id == id) {
                        slots.remove(&task_key);
                        info!(target = %task_key, "controller removed");
                    }
                    drop(slots);
                    if let Some(m) = metrics {
                        m.remove(&task_key).await;
                    }
                }
            });

            slots.insert(
                key.clone(),
                ControllerSlot {
                    id,
                    handle,
                    shutdown_tx,
                },
            )
        };

        if let Some(old) = old {
            debug!(target = %key, "replacing running controller");
            shut_down(&key, old).await;
        }
        info!(target = %key, "controller scheduled");
    }

    /// Stop the controller for `key`. Returns `false` if none was running.
    pub async fn stop(&self, key: &str) -> bool {
        let slot = self.slots.write().await.remove(key);
        match slot {
            Some(slot) => {
                shut_down(key, slot).await;
                if let Some(m) = &self.metrics {
                    m.remove(key).await;
                }
                true
            }
            None => false,
        }
    }

    /// Stop every controller, waiting for in-flight ticks to finish.
    pub async fn stop_all(&self) {
        let drained: Vec<(String, ControllerSlot)> = self.slots.write().await.drain().collect();
        for (key, slot) in drained {
            shut_down(&key, slot).await;
        }
        info!("all controllers stopped");
    }

    /// Keys of targets with a running controller, sorted.
    pub async fn active_targets(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.slots.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn is_running(&self, key: &str) -> bool {
        self.slots.read().await.contains_key(key)
    }
}

async fn shut_down(key: &str, slot: ControllerSlot) {
    // The receiver may already be gone if the task exited on its own.
    let _ = slot.shutdown_tx.send(true);
    if let Err(e) = slot.handle.await {
        warn!(target = %key, error = %e, "controller task ended abnormally");
    }
    debug!(target = %key, "controller stopped");
}
