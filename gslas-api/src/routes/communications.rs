use crate::{error::ApiResult, extract::ApiJson, state::AppState};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use gslas_orchestrator::{BroadcastRequest, NotificationReceipt, OutboxMessage, ResetSummary};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/admin/outbox", get(list_outbox))
        .route("/api/v1/admin/communications", post(broadcast))
        .route("/api/v1/admin/semester/reset", post(reset_semester))
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResetRequest {
    /// Must be `CONFIRM`
    pub confirmation: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/outbox",
    tag = "admin",
    responses((status = 200, description = "Queued and delivered mails, newest first", body = Vec<OutboxMessage>))
)]
pub async fn list_outbox(State(state): State<AppState>) -> ApiResult<Json<Vec<OutboxMessage>>> {
    Ok(Json(state.portal.list_outbox().await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/communications",
    tag = "admin",
    request_body = BroadcastRequest,
    responses(
        (status = 200, description = "Mail queued", body = NotificationReceipt),
        (status = 400, description = "Missing subject, message or recipients")
    )
)]
pub async fn broadcast(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BroadcastRequest>,
) -> ApiResult<Json<NotificationReceipt>> {
    Ok(Json(state.portal.broadcast(req).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/semester/reset",
    tag = "admin",
    request_body = ResetRequest,
    responses(
        (status = 200, description = "Per-semester data cleared", body = ResetSummary),
        (status = 400, description = "Confirmation text did not match")
    )
)]
pub async fn reset_semester(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResetRequest>,
) -> ApiResult<Json<ResetSummary>> {
    Ok(Json(state.portal.reset_semester(&req.confirmation).await?))
}
