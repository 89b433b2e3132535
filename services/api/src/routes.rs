use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use payout_engine::settlement::{
    settlement_router, AdvanceRepository, PayoutLedger, SettlementService, SourceFeeds,
    WorkerNotifier,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_settlement_routes<F, A, L, N>(
    service: Arc<SettlementService<F, A, L, N>>,
) -> axum::Router
where
    F: SourceFeeds + 'static,
    A: AdvanceRepository + 'static,
    L: PayoutLedger + 'static,
    N: WorkerNotifier + 'static,
{
    settlement_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
