//! In-memory metrics source and orchestrator for controller tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use surge_core::{ScalingTarget, UtilizationSample};

use crate::contracts::*;

pub fn sample(replicas: u32, util: f64) -> UtilizationSample {
    UtilizationSample {
        replica_count: replicas,
        average_utilization_percent: util,
        observed_at_ms: surge_core::epoch_millis(),
    }
}

pub struct MockMetrics {
    next: Mutex<Result<UtilizationSample, MetricsError>>,
    delay: Mutex<Option<Duration>>,
    pub calls: AtomicUsize,
}

impl MockMetrics {
    pub fn returning(sample: UtilizationSample) -> Self {
        Self {
            next: Mutex::new(Ok(sample)),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        let me = Self::returning(sample(0, 0.0));
        me.fail();
        me
    }

    pub fn set(&self, sample: UtilizationSample) {
        *self.next.lock().unwrap() = Ok(sample);
    }

    pub fn fail(&self) {
        *self.next.lock().unwrap() = Err(MetricsError::Unavailable {
            target: "mock".into(),
            reason: "no fresh reading".into(),
        });
    }

    pub fn delay(&self, d: Duration) {
        *self.delay.lock().unwrap() = Some(d);
    }
}

impl MetricsSource for MockMetrics {
    fn get_utilization<'a>(
        &'a self,
        _target: &'a ScalingTarget,
    ) -> BoxFuture<'a, Result<UtilizationSample, MetricsError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().unwrap();
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            self.next.lock().unwrap().clone()
        })
    }
}

pub struct MockOrchestrator {
    current: Mutex<Option<u32>>,
    failure: Mutex<Option<OrchestratorError>>,
    delay: Mutex<Option<Duration>>,
    pub set_calls: Mutex<Vec<u32>>,
}

impl MockOrchestrator {
    pub fn with_replicas(replicas: u32) -> Self {
        Self {
            current: Mutex::new(Some(replicas)),
            failure: Mutex::new(None),
            delay: Mutex::new(None),
            set_calls: Mutex::new(Vec::new()),
        }
    }

    /// An orchestrator that doesn't know the target.
    pub fn missing() -> Self {
        let me = Self::with_replicas(0);
        *me.current.lock().unwrap() = None;
        me
    }

    pub fn fail_with(&self, err: Option<OrchestratorError>) {
        *self.failure.lock().unwrap() = err;
    }

    pub fn delay(&self, d: Duration) {
        *self.delay.lock().unwrap() = Some(d);
    }

    pub fn calls(&self) -> Vec<u32> {
        self.set_calls.lock().unwrap().clone()
    }

    pub fn replicas(&self) -> Option<u32> {
        *self.current.lock().unwrap()
    }
}

impl Orchestrator for MockOrchestrator {
    fn set_replicas<'a>(
        &'a self,
        target: &'a ScalingTarget,
        count: u32,
    ) -> BoxFuture<'a, Result<(), OrchestratorError>> {
        Box::pin(async move {
            self.set_calls.lock().unwrap().push(count);
            let delay = *self.delay.lock().unwrap();
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            if let Some(err) = self.failure.lock().unwrap().clone() {
                return Err(err);
            }
            let mut current = self.current.lock().unwrap();
            match current.as_mut() {
                Some(r) => {
                    *r = count;
                    Ok(())
                }
                None => Err(OrchestratorError::NotFound(target.key())),
            }
        })
    }

    fn get_current_replicas<'a>(
        &'a self,
        target: &'a ScalingTarget,
    ) -> BoxFuture<'a, Result<u32, OrchestratorError>> {
        Box::pin(async move {
            if let Some(err) = self.failure.lock().unwrap().clone() {
                return Err(err);
            }
            self.current
                .lock()
                .unwrap()
                .ok_or_else(|| OrchestratorError::NotFound(target.key()))
        })
    }
}
