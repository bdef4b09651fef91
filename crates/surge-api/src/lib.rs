//! surge-api — REST API for Surge.
//!
//! Provides axum route handlers for registering workloads, pushing
//! utilization samples for the autoscaler to read, and inspecting the
//! resulting decisions.
//!
//! Workload ids are `{namespace}/{name}` keys, percent-encoded in the
//! path (`default%2Fweb`); a bare name refers to the `default` namespace.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/workloads` | List workloads |
//! | POST | `/api/v1/workloads` | Register a workload |
//! | GET | `/api/v1/workloads/:id` | Get a workload |
//! | DELETE | `/api/v1/workloads/:id` | Delete a workload and its history |
//! | POST | `/api/v1/workloads/:id/scale` | Set replicas manually |
//! | POST | `/api/v1/workloads/:id/utilization` | Ingest a utilization sample |
//! | GET | `/api/v1/workloads/:id/samples` | Recent samples |
//! | GET | `/api/v1/workloads/:id/decisions` | Recent scaling decisions |
//! | GET | `/healthz` | Liveness |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use surge_metrics::AutoscaleMetrics;
use surge_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub metrics: Arc<AutoscaleMetrics>,
}

/// Build the complete API router (REST + health + metrics).
pub fn build_router(store: StateStore, metrics: Arc<AutoscaleMetrics>) -> Router {
    let api_state = ApiState { store, metrics };

    let api_routes = Router::new()
        .route("/workloads", get(handlers::list_workloads).post(handlers::create_workload))
        .route("/workloads/{id}", get(handlers::get_workload).delete(handlers::delete_workload))
        .route("/workloads/{id}/scale", post(handlers::scale_workload))
        .route("/workloads/{id}/utilization", post(handlers::ingest_utilization))
        .route("/workloads/{id}/samples", get(handlers::list_samples))
        .route("/workloads/{id}/decisions", get(handlers::list_decisions))
        .with_state(api_state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::prometheus_metrics).with_state(api_state))
}
