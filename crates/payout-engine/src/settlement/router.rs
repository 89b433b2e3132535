use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{AdvanceId, PaymentMethod, WorkerId};
use super::error::{SettlementError, ValidationError};
use super::ledger::PayoutConfirmation;
use super::money::Money;
use super::repository::{AdvanceRepository, PayoutLedger, SourceFeeds, WorkerNotifier};
use super::service::SettlementService;

type SharedService<F, A, L, N> = Arc<SettlementService<F, A, L, N>>;

#[derive(Debug, Deserialize)]
pub struct SubmitAdvanceRequest {
    pub worker_id: WorkerId,
    pub amount: Money,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveAdvanceRequest {
    pub approver: String,
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub workers: Vec<WorkerId>,
}

#[derive(Debug, Deserialize)]
pub struct PayoutRequest {
    pub performed_by: String,
    pub method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
}

/// HTTP endpoints for advances, settlement previews and payouts.
pub fn settlement_router<F, A, L, N>(service: SharedService<F, A, L, N>) -> Router
where
    F: SourceFeeds + 'static,
    A: AdvanceRepository + 'static,
    L: PayoutLedger + 'static,
    N: WorkerNotifier + 'static,
{
    Router::new()
        .route("/api/v1/advances", post(submit_advance_handler::<F, A, L, N>))
        .route(
            "/api/v1/advances/pending",
            get(pending_advances_handler::<F, A, L, N>),
        )
        .route(
            "/api/v1/advances/:advance_id/approve",
            post(approve_advance_handler::<F, A, L, N>),
        )
        .route(
            "/api/v1/advances/:advance_id/reject",
            post(reject_advance_handler::<F, A, L, N>),
        )
        .route(
            "/api/v1/workers/:worker_id/advances",
            get(worker_advances_handler::<F, A, L, N>),
        )
        .route(
            "/api/v1/workers/:worker_id/settlement",
            get(worker_settlement_handler::<F, A, L, N>),
        )
        .route(
            "/api/v1/workers/:worker_id/payouts",
            get(payout_history_handler::<F, A, L, N>).post(confirm_payout_handler::<F, A, L, N>),
        )
        .route(
            "/api/v1/settlements/preview",
            post(preview_handler::<F, A, L, N>),
        )
        .with_state(service)
}

pub(crate) async fn submit_advance_handler<F, A, L, N>(
    State(service): State<SharedService<F, A, L, N>>,
    axum::Json(request): axum::Json<SubmitAdvanceRequest>,
) -> Response
where
    F: SourceFeeds + 'static,
    A: AdvanceRepository + 'static,
    L: PayoutLedger + 'static,
    N: WorkerNotifier + 'static,
{
    match service.submit_advance(request.worker_id, request.amount, request.reason) {
        Ok(advance) => (StatusCode::CREATED, axum::Json(advance)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn pending_advances_handler<F, A, L, N>(
    State(service): State<SharedService<F, A, L, N>>,
) -> Response
where
    F: SourceFeeds + 'static,
    A: AdvanceRepository + 'static,
    L: PayoutLedger + 'static,
    N: WorkerNotifier + 'static,
{
    match service.list_pending_advances() {
        Ok(advances) => (StatusCode::OK, axum::Json(advances)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn approve_advance_handler<F, A, L, N>(
    State(service): State<SharedService<F, A, L, N>>,
    Path(advance_id): Path<String>,
    axum::Json(request): axum::Json<ResolveAdvanceRequest>,
) -> Response
where
    F: SourceFeeds + 'static,
    A: AdvanceRepository + 'static,
    L: PayoutLedger + 'static,
    N: WorkerNotifier + 'static,
{
    match service.approve_advance(&AdvanceId(advance_id), &request.approver) {
        Ok(advance) => (StatusCode::OK, axum::Json(advance)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reject_advance_handler<F, A, L, N>(
    State(service): State<SharedService<F, A, L, N>>,
    Path(advance_id): Path<String>,
    axum::Json(request): axum::Json<ResolveAdvanceRequest>,
) -> Response
where
    F: SourceFeeds + 'static,
    A: AdvanceRepository + 'static,
    L: PayoutLedger + 'static,
    N: WorkerNotifier + 'static,
{
    match service.reject_advance(&AdvanceId(advance_id), &request.approver) {
        Ok(advance) => (StatusCode::OK, axum::Json(advance)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn worker_advances_handler<F, A, L, N>(
    State(service): State<SharedService<F, A, L, N>>,
    Path(worker_id): Path<String>,
) -> Response
where
    F: SourceFeeds + 'static,
    A: AdvanceRepository + 'static,
    L: PayoutLedger + 'static,
    N: WorkerNotifier + 'static,
{
    match service.advances_for_worker(&WorkerId(worker_id)) {
        Ok(advances) => (StatusCode::OK, axum::Json(advances)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn worker_settlement_handler<F, A, L, N>(
    State(service): State<SharedService<F, A, L, N>>,
    Path(worker_id): Path<String>,
) -> Response
where
    F: SourceFeeds + 'static,
    A: AdvanceRepository + 'static,
    L: PayoutLedger + 'static,
    N: WorkerNotifier + 'static,
{
    match service.compute_settlement(&WorkerId(worker_id)) {
        Ok(breakdown) => (StatusCode::OK, axum::Json(breakdown)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn preview_handler<F, A, L, N>(
    State(service): State<SharedService<F, A, L, N>>,
    axum::Json(request): axum::Json<PreviewRequest>,
) -> Response
where
    F: SourceFeeds + 'static,
    A: AdvanceRepository + 'static,
    L: PayoutLedger + 'static,
    N: WorkerNotifier + 'static,
{
    let batch = service.settle_all(&request.workers);
    (StatusCode::OK, axum::Json(batch)).into_response()
}

pub(crate) async fn confirm_payout_handler<F, A, L, N>(
    State(service): State<SharedService<F, A, L, N>>,
    Path(worker_id): Path<String>,
    axum::Json(request): axum::Json<PayoutRequest>,
) -> Response
where
    F: SourceFeeds + 'static,
    A: AdvanceRepository + 'static,
    L: PayoutLedger + 'static,
    N: WorkerNotifier + 'static,
{
    let confirmation = PayoutConfirmation {
        performed_by: request.performed_by,
        method: request.method,
        notes: request.notes,
    };
    match service.confirm_payout(&WorkerId(worker_id), confirmation) {
        Ok(entry) => (StatusCode::CREATED, axum::Json(entry)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn payout_history_handler<F, A, L, N>(
    State(service): State<SharedService<F, A, L, N>>,
    Path(worker_id): Path<String>,
) -> Response
where
    F: SourceFeeds + 'static,
    A: AdvanceRepository + 'static,
    L: PayoutLedger + 'static,
    N: WorkerNotifier + 'static,
{
    match service.payout_history(&WorkerId(worker_id)) {
        Ok(entries) => (StatusCode::OK, axum::Json(entries)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) fn status_for(err: &SettlementError) -> StatusCode {
    match err {
        SettlementError::Validation(ValidationError::StaleWindow { .. }) => StatusCode::CONFLICT,
        SettlementError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SettlementError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
        SettlementError::AdvanceNotFound(_) => StatusCode::NOT_FOUND,
        SettlementError::SourceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SettlementError::InconsistentState { .. } | SettlementError::Repository(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: SettlementError) -> Response {
    let payload = json!({
        "error": err.to_string(),
        "kind": err.kind(),
    });
    (status_for(&err), axum::Json(payload)).into_response()
}
