use crate::{error::ApiResult, extract::ApiJson, state::AppState};
use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use gslas_orchestrator::{
    AllocationRun, AllocationSummary, AllocationWeights, CourseAllocation, DashboardStatistics,
    GroupAllocation, NotificationReceipt, PenaltyScore, StudentAllocation,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use utoipa::ToSchema;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/admin/allocation",
            get(allocation_overview).delete(clear_allocations),
        )
        .route("/api/v1/admin/allocation/run", post(run_allocation))
        .route("/api/v1/admin/allocation/runs", get(list_runs))
        .route(
            "/api/v1/admin/allocation/weights",
            get(get_weights).put(update_weights),
        )
        .route("/api/v1/admin/allocation/courses/{code}", get(course_allocation))
        .route(
            "/api/v1/admin/allocation/courses/{code}/groups/{group}",
            put(set_group_assignment),
        )
        .route("/api/v1/admin/allocation/export", get(export_allocations))
        .route("/api/v1/admin/allocation/confirm", post(confirm_allocations))
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AllocationOverview {
    pub statistics: DashboardStatistics,
    pub penalty: PenaltyScore,
    pub students: Vec<StudentAllocation>,
    pub courses: Vec<CourseAllocation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RunAllocationRequest {
    /// Remove every existing assignment before allocating
    #[serde(default)]
    pub clear_existing: bool,
    /// Fixed seed for a reproducible run
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignGroupRequest {
    /// Username to assign; null unassigns the group
    pub student: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/allocation",
    tag = "allocation",
    responses((status = 200, description = "Statistics, penalty and allocation tables", body = AllocationOverview))
)]
pub async fn allocation_overview(
    State(state): State<AppState>,
) -> ApiResult<Json<AllocationOverview>> {
    Ok(Json(AllocationOverview {
        statistics: state.portal.dashboard_statistics().await?,
        penalty: state.portal.current_penalty().await?,
        students: state.portal.student_allocation_table().await?,
        courses: state.portal.course_allocation_table().await?,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/allocation",
    tag = "allocation",
    responses((status = 200, description = "All assignments removed"))
)]
pub async fn clear_allocations(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let cleared = state.portal.clear_allocations().await?;

    Ok(Json(json!({ "message": "Allocations cleared", "cleared": cleared })))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/allocation/run",
    tag = "allocation",
    request_body = RunAllocationRequest,
    responses(
        (status = 200, description = "Allocation completed", body = AllocationSummary),
        (status = 400, description = "Nobody eligible or no remaining capacity")
    )
)]
pub async fn run_allocation(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RunAllocationRequest>,
) -> ApiResult<Json<AllocationSummary>> {
    let seed = req.seed.or(state.config.allocation_seed);
    let summary = state
        .portal
        .run_allocation(req.clear_existing, seed)
        .await?;

    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/allocation/runs",
    tag = "allocation",
    responses((status = 200, description = "Run history, newest first", body = Vec<AllocationRun>))
)]
pub async fn list_runs(State(state): State<AppState>) -> ApiResult<Json<Vec<AllocationRun>>> {
    Ok(Json(state.portal.list_runs().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/allocation/weights",
    tag = "allocation",
    responses((status = 200, description = "Current penalty weights", body = AllocationWeights))
)]
pub async fn get_weights(State(state): State<AppState>) -> ApiResult<Json<AllocationWeights>> {
    Ok(Json(state.portal.get_weights().await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/allocation/weights",
    tag = "allocation",
    request_body = AllocationWeights,
    responses(
        (status = 200, description = "Weights saved", body = AllocationWeights),
        (status = 400, description = "Negative weight or zero permutations")
    )
)]
pub async fn update_weights(
    State(state): State<AppState>,
    ApiJson(weights): ApiJson<AllocationWeights>,
) -> ApiResult<Json<AllocationWeights>> {
    Ok(Json(state.portal.update_weights(weights).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/allocation/courses/{code}",
    tag = "allocation",
    params(("code" = String, Path, description = "Course short code")),
    responses(
        (status = 200, description = "Lab groups of the course and their students", body = CourseAllocation),
        (status = 404, description = "Course not found")
    )
)]
pub async fn course_allocation(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<CourseAllocation>> {
    Ok(Json(state.portal.course_allocation(&code).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/allocation/courses/{code}/groups/{group}",
    tag = "allocation",
    params(
        ("code" = String, Path, description = "Course short code"),
        ("group" = String, Path, description = "Lab group code")
    ),
    request_body = AssignGroupRequest,
    responses(
        (status = 200, description = "Group after the change", body = GroupAllocation),
        (status = 400, description = "Assignment breaks a constraint"),
        (status = 404, description = "Course, group or student not found")
    )
)]
pub async fn set_group_assignment(
    State(state): State<AppState>,
    Path((code, group)): Path<(String, String)>,
    ApiJson(req): ApiJson<AssignGroupRequest>,
) -> ApiResult<Json<GroupAllocation>> {
    let student = req
        .student
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let group = state
        .portal
        .set_group_assignment(&code, &group, student)
        .await?;

    Ok(Json(group))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/allocation/export",
    tag = "allocation",
    responses((status = 200, description = "Allocation table", content_type = "text/csv", body = String))
)]
pub async fn export_allocations(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let csv = state.portal.export_allocations_csv().await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"allocations.csv\"",
            ),
        ],
        csv,
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/allocation/confirm",
    tag = "allocation",
    responses(
        (status = 200, description = "Results mail queued", body = NotificationReceipt),
        (status = 400, description = "No student e-mails to notify")
    )
)]
pub async fn confirm_allocations(
    State(state): State<AppState>,
) -> ApiResult<Json<NotificationReceipt>> {
    let receipt = state.portal.confirm_and_notify().await?;
    info!("Allocations confirmed, {} recipients", receipt.recipients);

    Ok(Json(receipt))
}
