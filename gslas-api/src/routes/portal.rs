use crate::{error::ApiResult, state::AppState};
use axum::{extract::State, routing::get, Json, Router};
use gslas_orchestrator::{Course, StudentAllocations};

/// Read-only views open to every signed-in user.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/courses", get(list_courses))
        .route("/api/v1/allocations", get(list_allocations))
}

#[utoipa::path(
    get,
    path = "/api/v1/courses",
    tag = "portal",
    responses((status = 200, description = "All courses", body = Vec<Course>))
)]
pub async fn list_courses(State(state): State<AppState>) -> ApiResult<Json<Vec<Course>>> {
    Ok(Json(state.portal.list_courses().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/allocations",
    tag = "portal",
    responses((status = 200, description = "Lab sessions of every assigned student", body = Vec<StudentAllocations>))
)]
pub async fn list_allocations(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<StudentAllocations>>> {
    Ok(Json(state.portal.all_allocations().await?))
}
