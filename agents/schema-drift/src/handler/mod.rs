//! HTTP handler for the Schema Drift Agent
//!
//! Thin request/response boundary over [`DriftOrchestrator`].

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::contracts::*;
use crate::error::DriftError;
use crate::orchestrator::DriftOrchestrator;
use crate::telemetry::DriftMetrics;

pub const AGENT_ID: &str = "schema-drift";
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state
pub struct AppState {
    pub orchestrator: Arc<DriftOrchestrator>,
    pub metrics: Arc<DriftMetrics>,
}

impl AppState {
    pub fn new(orchestrator: Arc<DriftOrchestrator>, metrics: Arc<DriftMetrics>) -> Self {
        Self { orchestrator, metrics }
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/api/v1/drift/detect", post(detect_drift))
        .route("/api/v1/components/:name/snapshots", get(snapshot_history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        agent_id: AGENT_ID.to_string(),
        agent_version: AGENT_VERSION.to_string(),
    })
}

/// Prometheus text exposition
async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let body = state.metrics.encode_text().map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError {
                error: "MetricsError".to_string(),
                message: e.to_string(),
                request_id: None,
            }),
        )
    })?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

/// Run drift detection for one pipeline
async fn detect_drift(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DetectRequest>,
) -> Result<Json<ApiResponse<DetectDriftResponse>>, (StatusCode, Json<ApiError>)> {
    if request.pipeline_id.trim().is_empty() {
        return Err(error_response(
            &DriftError::validation("pipeline_id must not be empty"),
            request.request_id,
        ));
    }

    let mut input = DetectDriftRequest::new(request.pipeline_id);
    input.request_id = request.request_id;
    input.requested_by = request.requested_by;

    let response = state
        .orchestrator
        .detect_drift(input)
        .await
        .map_err(|e| error_response(&e, request.request_id))?;

    Ok(Json(ApiResponse {
        success: response.details.failure.is_none(),
        request_id: response.request_id,
        data: response,
    }))
}

/// Version chain of a component, newest first
async fn snapshot_history(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<SnapshotHeader>>, (StatusCode, Json<ApiError>)> {
    state
        .orchestrator
        .lineage()
        .history(&name)
        .map(Json)
        .map_err(|e| error_response(&e, None))
}

fn error_response(error: &DriftError, request_id: Option<Uuid>) -> (StatusCode, Json<ApiError>) {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error_kind = error.kind(), error = %error, "Request failed");
    }
    (
        status,
        Json(ApiError {
            error: error.kind().to_string(),
            message: error.to_string(),
            request_id,
        }),
    )
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub agent_id: String,
    pub agent_version: String,
}

/// Detect drift request body
#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    pub pipeline_id: String,
    #[serde(default)]
    pub request_id: Option<Uuid>,
    #[serde(default)]
    pub requested_by: Option<String>,
}

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub request_id: Uuid,
}

/// API error
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    pub request_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::lineage::LineageStore;
    use crate::ports::{CollaboratorResult, Connector, ConnectorRegistry};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    struct StaticConnector;

    #[async_trait]
    impl Connector for StaticConnector {
        fn id(&self) -> &str {
            "static"
        }

        fn supports(&self, _kind: ComponentKind) -> bool {
            true
        }

        async fn extract_schema(&self, _component: &Component) -> CollaboratorResult<Vec<FieldSpec>> {
            Ok(vec![
                FieldSpec::new("id", "int", false, 0),
                FieldSpec::new("name", "string", true, 1),
            ])
        }
    }

    fn router() -> Router {
        let catalog = InMemoryCatalog::new()
            .with_component(Component::new("customers", ComponentKind::File))
            .unwrap()
            .with_pipeline(Pipeline {
                id: "crm".into(),
                name: String::new(),
                schedule: None,
                sources: vec!["customers".into()],
                targets: vec![],
                mappings: vec![],
                policy: Policy::default(),
            })
            .unwrap();
        let metrics = Arc::new(DriftMetrics::new().unwrap());
        let orchestrator = DriftOrchestrator::new(
            Arc::new(catalog),
            LineageStore::in_memory(),
            ConnectorRegistry::new().with_connector(StaticConnector),
        )
        .with_metrics(Arc::clone(&metrics));
        create_router(Arc::new(AppState::new(Arc::new(orchestrator), metrics)))
    }

    fn detect(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/drift/detect")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["agent_id"], "schema-drift");
    }

    #[tokio::test]
    async fn test_detect_first_snapshot_continues() {
        let response = router().oneshot(detect(r#"{"pipeline_id":"crm"}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["decision"], "continue");
        assert_eq!(body["data"]["drift"], false);
    }

    #[tokio::test]
    async fn test_unknown_pipeline_is_404() {
        let response = router().oneshot(detect(r#"{"pipeline_id":"nope"}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json(response).await;
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_400() {
        let response = router().oneshot(detect(r#"{"pipeline_id":" "}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_metrics_after_run() {
        let app = router();
        app.clone().oneshot(detect(r#"{"pipeline_id":"crm"}"#)).await.unwrap();

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("schema_drift_runs_total"));
    }

    #[tokio::test]
    async fn test_history_lists_snapshots() {
        let app = router();
        app.clone().oneshot(detect(r#"{"pipeline_id":"crm"}"#)).await.unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/components/customers/snapshots")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body[0]["version"], "v1");
    }
}
