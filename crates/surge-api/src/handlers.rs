//! REST API handlers.
//!
//! Each handler reads/writes via `StateStore` and returns JSON responses.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::{debug, info};

use surge_core::{ScalingTarget, UtilizationSample};
use surge_state::*;

use crate::ApiState;

/// Samples kept per workload; older ones are pruned on ingest.
pub const SAMPLE_RETENTION: usize = 120;

const DEFAULT_SAMPLE_LIMIT: usize = 60;
const DEFAULT_DECISION_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 1000;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn internal_error(e: StateError) -> axum::response::Response {
    error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
}

fn not_found() -> axum::response::Response {
    error_response("workload not found", StatusCode::NOT_FOUND).into_response()
}

/// Normalize a path id to the `{namespace}/{name}` store key.
fn workload_key(id: &str) -> String {
    ScalingTarget::from_key(id).key()
}

// ── Workloads ──────────────────────────────────────────────────

/// GET /api/v1/workloads
pub async fn list_workloads(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_workloads() {
        Ok(workloads) => ApiResponse::ok(workloads).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/workloads/:id
pub async fn get_workload(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_workload(&workload_key(&id)) {
        Ok(Some(workload)) => ApiResponse::ok(workload).into_response(),
        Ok(None) => not_found(),
        Err(e) => internal_error(e),
    }
}

/// Workload registration body.
#[derive(Deserialize)]
pub struct CreateWorkloadRequest {
    #[serde(default)]
    pub namespace: Option<String>,
    pub name: String,
    pub replicas: u32,
}

/// POST /api/v1/workloads
pub async fn create_workload(
    State(state): State<ApiState>,
    Json(req): Json<CreateWorkloadRequest>,
) -> impl IntoResponse {
    let namespace = req.namespace.as_deref().unwrap_or("default");
    if let Err(e) = ScalingTarget::new(namespace, req.name.as_str()).validate() {
        return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response();
    }

    let workload = Workload::new(namespace, &req.name, req.replicas);
    match state.store.insert_workload_if_absent(&workload) {
        Ok(true) => {
            info!(
                workload = %workload.table_key(),
                replicas = workload.replicas,
                "workload registered"
            );
            (StatusCode::CREATED, ApiResponse::ok(workload)).into_response()
        }
        Ok(false) => {
            error_response("workload already exists", StatusCode::CONFLICT).into_response()
        }
        Err(e) => internal_error(e),
    }
}

/// DELETE /api/v1/workloads/:id
pub async fn delete_workload(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let key = workload_key(&id);
    match state.store.delete_workload(&key) {
        Ok(true) => {
            info!(workload = %key, "workload deleted");
            ApiResponse::ok("deleted").into_response()
        }
        Ok(false) => not_found(),
        Err(e) => internal_error(e),
    }
}

// ── Scaling ────────────────────────────────────────────────────

/// Scale request body.
#[derive(Deserialize)]
pub struct ScaleRequest {
    pub replicas: u32,
}

/// POST /api/v1/workloads/:id/scale
///
/// A manual change bumps the generation, so a controller racing it gets a
/// conflict instead of overwriting it.
pub async fn scale_workload(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<ScaleRequest>,
) -> impl IntoResponse {
    let key = workload_key(&id);
    match state.store.set_replicas(&key, req.replicas, None) {
        Ok(workload) => {
            info!(workload = %key, replicas = workload.replicas, "workload scaled manually");
            ApiResponse::ok(workload).into_response()
        }
        Err(StateError::NotFound(_)) => not_found(),
        Err(e) => internal_error(e),
    }
}

// ── Samples ────────────────────────────────────────────────────

/// Utilization sample body. Missing fields are filled from the workload
/// record and the receive time.
#[derive(Deserialize)]
pub struct UtilizationRequest {
    pub average_utilization_percent: f64,
    #[serde(default)]
    pub replica_count: Option<u32>,
    #[serde(default)]
    pub observed_at_ms: Option<u64>,
}

/// POST /api/v1/workloads/:id/utilization
pub async fn ingest_utilization(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<UtilizationRequest>,
) -> impl IntoResponse {
    let util = req.average_utilization_percent;
    if !util.is_finite() || util < 0.0 {
        return error_response(
            "average_utilization_percent must be a non-negative number",
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    }

    let key = workload_key(&id);
    let workload = match state.store.get_workload(&key) {
        Ok(Some(w)) => w,
        Ok(None) => return not_found(),
        Err(e) => return internal_error(e),
    };

    let now_ms = surge_core::epoch_millis();
    let sample = UtilizationSample {
        replica_count: req.replica_count.unwrap_or(workload.replicas),
        average_utilization_percent: util,
        observed_at_ms: req.observed_at_ms.unwrap_or(now_ms),
    };
    // A future timestamp would sort after every real sample for good.
    if sample.is_from_future(now_ms) {
        return error_response(
            "observed_at_ms is ahead of the server clock",
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    }
    let record = SampleRecord::new(&key, sample);
    if let Err(e) = state.store.put_sample(&record) {
        return internal_error(e);
    }
    if let Err(e) = state.store.prune_samples(&key, SAMPLE_RETENTION) {
        return internal_error(e);
    }
    debug!(workload = %key, utilization = util, "sample ingested");

    (StatusCode::ACCEPTED, ApiResponse::ok(record)).into_response()
}

/// `?limit=` for history listings.
#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

impl HistoryQuery {
    fn limit_or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).min(MAX_LIST_LIMIT)
    }
}

/// GET /api/v1/workloads/:id/samples
pub async fn list_samples(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> impl IntoResponse {
    match state
        .store
        .list_samples(&workload_key(&id), q.limit_or(DEFAULT_SAMPLE_LIMIT))
    {
        Ok(samples) => ApiResponse::ok(samples).into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Decisions ──────────────────────────────────────────────────

/// GET /api/v1/workloads/:id/decisions
pub async fn list_decisions(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> impl IntoResponse {
    match state
        .store
        .list_decisions(&workload_key(&id), q.limit_or(DEFAULT_DECISION_LIMIT))
    {
        Ok(decisions) => ApiResponse::ok(decisions).into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Health / Prometheus ────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshots = state.metrics.snapshot().await;
    let body = surge_metrics::render_prometheus(&snapshots);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use surge_core::ScaleReason;
    use surge_metrics::{AutoscaleMetrics, EvaluationOutcome};

    fn test_state() -> ApiState {
        let store = StateStore::open_in_memory().unwrap();
        ApiState {
            store,
            metrics: Arc::new(AutoscaleMetrics::new()),
        }
    }

    fn with_workload(replicas: u32) -> ApiState {
        let state = test_state();
        state
            .store
            .put_workload(&Workload::new("default", "api", replicas))
            .unwrap();
        state
    }

    fn util(percent: f64) -> UtilizationRequest {
        UtilizationRequest {
            average_utilization_percent: percent,
            replica_count: None,
            observed_at_ms: None,
        }
    }

    fn no_limit() -> Query<HistoryQuery> {
        Query(HistoryQuery { limit: None })
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn list_workloads_empty() {
        let state = test_state();
        let resp = list_workloads(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_and_get_workload() {
        let state = test_state();
        let req = CreateWorkloadRequest {
            namespace: None,
            name: "api".into(),
            replicas: 3,
        };

        let resp = create_workload(State(state.clone()), Json(req)).await.into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        // Bare name resolves to the default namespace.
        let resp = get_workload(State(state.clone()), Path("api".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["data"]["namespace"], "default");
        assert_eq!(json["data"]["replicas"], 3);

        let resp = get_workload(State(state), Path("default/api".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_duplicate_workload_conflicts() {
        let state = with_workload(2);
        let req = CreateWorkloadRequest {
            namespace: Some("default".into()),
            name: "api".into(),
            replicas: 7,
        };
        let resp = create_workload(State(state.clone()), Json(req)).await.into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        // The existing record is untouched.
        let w = state.store.get_workload("default/api").unwrap().unwrap();
        assert_eq!(w.replicas, 2);
    }

    #[tokio::test]
    async fn create_rejects_bad_names() {
        let state = test_state();
        let bad = [(None, ""), (None, "a/b"), (None, "a:1"), (Some("x;y"), "api")];
        for (namespace, name) in bad {
            let req = CreateWorkloadRequest {
                namespace: namespace.map(String::from),
                name: name.into(),
                replicas: 1,
            };
            let resp = create_workload(State(state.clone()), Json(req)).await.into_response();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "name={name:?}");
        }
    }

    #[tokio::test]
    async fn get_nonexistent_workload() {
        let state = test_state();
        let resp = get_workload(State(state), Path("nope".to_string())).await.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_workload_exists() {
        let state = with_workload(2);
        let resp = delete_workload(State(state.clone()), Path("default/api".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = delete_workload(State(state), Path("default/api".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn manual_scale_bumps_generation() {
        let state = with_workload(2);
        let resp = scale_workload(
            State(state.clone()),
            Path("default/api".to_string()),
            Json(ScaleRequest { replicas: 6 }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let w = state.store.get_workload("default/api").unwrap().unwrap();
        assert_eq!(w.replicas, 6);
        assert_eq!(w.generation, 1);
    }

    #[tokio::test]
    async fn scale_missing_workload() {
        let state = test_state();
        let resp = scale_workload(
            State(state),
            Path("ghost".to_string()),
            Json(ScaleRequest { replicas: 2 }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ingest_fills_replica_count_from_workload() {
        let state = with_workload(4);
        let resp = ingest_utilization(State(state.clone()), Path("api".into()), Json(util(72.5)))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let latest = state.store.latest_sample("default/api").unwrap().unwrap();
        assert_eq!(latest.sample.replica_count, 4);
        assert_eq!(latest.sample.average_utilization_percent, 72.5);
    }

    #[tokio::test]
    async fn ingest_rejects_negative_utilization() {
        let state = with_workload(4);
        let resp = ingest_utilization(State(state.clone()), Path("api".into()), Json(util(-5.0)))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(state.store.latest_sample("default/api").unwrap().is_none());
    }

    #[tokio::test]
    async fn ingest_for_unknown_workload() {
        let state = test_state();
        let resp = ingest_utilization(State(state), Path("api".to_string()), Json(util(50.0)))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ingest_rejects_future_timestamp() {
        let state = with_workload(2);
        let year_ahead = surge_core::epoch_millis() + 365 * 24 * 3600 * 1000;
        let req = UtilizationRequest {
            average_utilization_percent: 95.0,
            replica_count: Some(2),
            observed_at_ms: Some(year_ahead),
        };
        let resp = ingest_utilization(State(state.clone()), Path("api".to_string()), Json(req))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        // A current reading still becomes the newest sample.
        ingest_utilization(State(state.clone()), Path("api".to_string()), Json(util(10.0))).await;
        let latest = state.store.latest_sample("default/api").unwrap().unwrap();
        assert_eq!(latest.sample.average_utilization_percent, 10.0);
    }

    #[tokio::test]
    async fn ingest_prunes_old_samples() {
        let state = with_workload(1);
        for i in 0..(SAMPLE_RETENTION as u64 + 5) {
            let req = UtilizationRequest {
                average_utilization_percent: 10.0,
                replica_count: Some(1),
                observed_at_ms: Some(1_000 + i),
            };
            ingest_utilization(State(state.clone()), Path("api".to_string()), Json(req)).await;
        }

        let samples = state.store.list_samples("default/api", usize::MAX).unwrap();
        assert_eq!(samples.len(), SAMPLE_RETENTION);
        assert_eq!(samples[0].sample.observed_at_ms, 1_000 + SAMPLE_RETENTION as u64 + 4);
    }

    #[tokio::test]
    async fn samples_respect_limit() {
        let state = with_workload(1);
        for i in 0..5 {
            let record = SampleRecord::new(
                "default/api",
                UtilizationSample {
                    replica_count: 1,
                    average_utilization_percent: 40.0,
                    observed_at_ms: 1_000 + i,
                },
            );
            state.store.put_sample(&record).unwrap();
        }

        let resp = list_samples(
            State(state),
            Path("api".to_string()),
            Query(HistoryQuery { limit: Some(2) }),
        )
        .await
        .into_response();
        let json = body_json(resp).await;
        assert_eq!(json["data"].as_array().unwrap().len(), 2);
        assert_eq!(json["data"][0]["observed_at_ms"], 1_004);
    }

    #[tokio::test]
    async fn decisions_listed_newest_first() {
        let state = with_workload(3);
        for (ms, reason) in [(1_000, ScaleReason::ScaleUp), (2_000, ScaleReason::NoChange)] {
            let record = DecisionRecord {
                workload: "default/api".into(),
                recorded_at_ms: ms,
                current_replicas: 3,
                raw_desired: 5,
                desired_replicas: 5,
                reason,
                utilization_percent: 80.0,
                suppressed_by_cooldown: false,
                applied: reason == ScaleReason::ScaleUp,
                error: None,
            };
            state.store.put_decision(&record).unwrap();
        }

        let resp = list_decisions(State(state), Path("api".to_string()), no_limit())
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["data"][0]["reason"], "no_change");
        assert_eq!(json["data"][1]["reason"], "scale_up");
    }

    #[tokio::test]
    async fn healthz_ok() {
        let resp = healthz().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn prometheus_endpoint_returns_text() {
        let state = test_state();
        state
            .metrics
            .record_evaluation(
                "default/api",
                3,
                5,
                80.0,
                ScaleReason::ScaleUp,
                EvaluationOutcome::Applied,
            )
            .await;

        let resp = prometheus_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.contains("text/plain"));

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("target=\"default/api\""));
    }
}
