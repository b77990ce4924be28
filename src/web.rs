use crate::analysis::{AnalysisOutcome, Analyzer, MutualConnections};
use crate::errors::GuardError;
use crate::trust_registry::{RefreshOutcome, TrustedSetSummary};
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeParams {
    /// `text` returns the bare report instead of JSON
    pub format: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegistryStatus {
    #[serde(flatten)]
    pub summary: TrustedSetSummary,
    pub last_error: Option<String>,
}

/// Router exposing analysis, mutual connections, registry status and health checks
pub fn build_router(analyzer: Analyzer) -> Router {
    Router::new()
        .route("/api/analyze/{handle}", get(analyze))
        .route("/api/registry", get(registry_status))
        .route("/api/registry/refresh", post(refresh_registry))
        .route("/api/mutual/{first}/{second}", get(mutual))
        // versioned aliases
        .route("/v1/analyze/{handle}", get(analyze))
        .route("/v1/registry", get(registry_status))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(Extension(analyzer))
}

async fn analyze(
    Extension(analyzer): Extension<Analyzer>,
    Path(handle): Path<String>,
    Query(params): Query<AnalyzeParams>,
) -> Result<Response, GuardError> {
    let outcome: AnalysisOutcome = analyzer.analyze(&handle).await?;
    if params.format.as_deref() == Some("text") {
        return Ok(outcome.report().to_string().into_response());
    }
    Ok(Json(outcome).into_response())
}

async fn mutual(
    Extension(analyzer): Extension<Analyzer>,
    Path((first, second)): Path<(String, String)>,
) -> Result<Json<MutualConnections>, GuardError> {
    Ok(Json(analyzer.mutual_connections(&first, &second).await?))
}

async fn registry_status(Extension(analyzer): Extension<Analyzer>) -> Json<RegistryStatus> {
    let registry = analyzer.registry();
    Json(RegistryStatus {
        summary: registry.get().summary(),
        last_error: registry.last_error(),
    })
}

async fn refresh_registry(
    Extension(analyzer): Extension<Analyzer>,
) -> (StatusCode, Json<RefreshOutcome>) {
    let outcome = analyzer.registry().refresh().await;
    info!(?outcome, "manual trusted list refresh");
    let status = match outcome {
        RefreshOutcome::Retained { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::OK,
    };
    (status, Json(outcome))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Ready once a trusted list has been loaded at least once.
async fn readyz(Extension(analyzer): Extension<Analyzer>) -> (StatusCode, Json<serde_json::Value>) {
    let trusted = analyzer.registry().get();
    let ready = trusted.version() > 0;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "ready": ready,
            "trusted_version": trusted.version(),
            "trusted_members": trusted.len(),
        })),
    )
}
