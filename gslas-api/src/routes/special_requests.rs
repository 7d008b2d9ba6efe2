use crate::{error::ApiResult, extract::ApiJson, state::AppState};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use gslas_orchestrator::{ReviewOutcome, ReviewRequest, SpecialRequest};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/admin/special-requests", get(list_special_requests))
        .route(
            "/api/v1/admin/special-requests/{id}/review",
            post(review_special_request),
        )
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/special-requests",
    tag = "admin",
    responses((status = 200, description = "All special requests, newest first", body = Vec<SpecialRequest>))
)]
pub async fn list_special_requests(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<SpecialRequest>>> {
    Ok(Json(state.portal.list_special_requests().await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/special-requests/{id}/review",
    tag = "admin",
    params(("id" = i64, Path, description = "Special request id")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Review recorded", body = ReviewOutcome),
        (status = 404, description = "Special request not found")
    )
)]
pub async fn review_special_request(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(review): ApiJson<ReviewRequest>,
) -> ApiResult<Json<ReviewOutcome>> {
    Ok(Json(state.portal.review_special_request(id, review).await?))
}
