//! HTTP API: sample ingest, node views, health checks and Prometheus metrics

use crate::engine::{Engine, EngineStats, RegisterNode};
use crate::error::{IngestError, RegistryError};
use crate::health::{ComponentStatus, HealthRegistry};
use crate::ingest::{BatchOutcome, IngestReceipt};
use crate::models::{NodeId, NodeRecord, RawSample, Transition, UtilizationCategory};
use crate::observability::EngineMetrics;
use crate::snapshot::{ContainerNodeView, ScoredNodeView};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Default number of transitions returned by the audit endpoint
const DEFAULT_TRANSITION_LIMIT: usize = 100;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub health_registry: HealthRegistry,
    pub metrics: EngineMetrics,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, health_registry: HealthRegistry, metrics: EngineMetrics) -> Self {
        Self {
            engine,
            health_registry,
            metrics,
        }
    }
}

/// JSON error body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

/// Error returned by API handlers
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: message.into(),
                code: code.to_string(),
            },
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        let status = match err {
            IngestError::InvalidValue { .. } => StatusCode::BAD_REQUEST,
            IngestError::StaleSample { .. } => StatusCode::CONFLICT,
            IngestError::RegistryFull { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        ApiError::new(status, err.code(), err.to_string())
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::new(StatusCode::NOT_FOUND, err.code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Response of the batch ingest endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub accepted: usize,
    pub rejected: usize,
    pub results: Vec<BatchOutcome>,
}

/// Response of the decommission endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecommissionResponse {
    pub node_id: NodeId,
    pub category: UtilizationCategory,
    /// Absent when the node was already decommissioned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<Transition>,
}

#[derive(Debug, Deserialize)]
struct NodesQuery {
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransitionsQuery {
    node: Option<String>,
    limit: Option<usize>,
}

async fn submit_sample(
    State(state): State<Arc<AppState>>,
    Json(sample): Json<RawSample>,
) -> ApiResult<(StatusCode, Json<IngestReceipt>)> {
    let receipt = state.engine.submit(sample)?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

async fn submit_batch(
    State(state): State<Arc<AppState>>,
    Json(samples): Json<Vec<RawSample>>,
) -> Json<BatchResponse> {
    let results = state.engine.submit_batch(samples);
    let accepted = results.iter().filter(|r| r.is_accepted()).count();
    Json(BatchResponse {
        accepted,
        rejected: results.len() - accepted,
        results,
    })
}

async fn register_node(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterNode>,
) -> ApiResult<(StatusCode, Json<NodeRecord>)> {
    let (record, created) = state.engine.register(request)?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(record)))
}

async fn list_nodes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NodesQuery>,
) -> ApiResult<Json<Vec<ScoredNodeView>>> {
    let category = query
        .category
        .map(|c| c.parse::<UtilizationCategory>())
        .transpose()
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, "invalid_value", e))?;

    let views = state
        .engine
        .list(category)
        .iter()
        .map(ScoredNodeView::from)
        .collect();
    Ok(Json(views))
}

async fn get_node(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> ApiResult<Json<NodeRecord>> {
    state
        .engine
        .get(&node_id)
        .map(Json)
        .ok_or_else(|| RegistryError::UnknownNode(node_id).into())
}

async fn decommission_node(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> ApiResult<Json<DecommissionResponse>> {
    let transition = state.engine.decommission(&node_id)?;
    Ok(Json(DecommissionResponse {
        node_id,
        category: UtilizationCategory::Sundown,
        transition,
    }))
}

async fn list_containers(State(state): State<Arc<AppState>>) -> Json<Vec<ContainerNodeView>> {
    Json(state.engine.snapshot().containers())
}

async fn list_transitions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TransitionsQuery>,
) -> Json<Vec<Transition>> {
    let limit = query.limit.unwrap_or(DEFAULT_TRANSITION_LIMIT);
    Json(state.engine.transitions(query.node.as_deref(), limit))
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<EngineStats> {
    Json(state.engine.stats())
}

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            buffer,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/samples", post(submit_sample))
        .route("/api/v1/samples/batch", post(submit_batch))
        .route("/api/v1/nodes", get(list_nodes).post(register_node))
        .route("/api/v1/nodes/:id", get(get_node))
        .route("/api/v1/nodes/:id/decommission", post(decommission_node))
        .route("/api/v1/containers", get(list_containers))
        .route("/stats", get(list_containers))
        .route("/api/v1/transitions", get(list_transitions))
        .route("/api/v1/stats", get(stats))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
