use crate::{error::ApiResult, extract::ApiJson, state::AppState};
use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Json, Router,
};
use gslas_orchestrator::{RegisterStudentRequest, Student};
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/admin/students",
            get(list_students).post(register_student),
        )
        .route("/api/v1/admin/students/{username}", delete(delete_student))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/students",
    tag = "admin",
    responses((status = 200, description = "All students", body = Vec<Student>))
)]
pub async fn list_students(State(state): State<AppState>) -> ApiResult<Json<Vec<Student>>> {
    Ok(Json(state.portal.list_students().await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/students",
    tag = "admin",
    request_body = RegisterStudentRequest,
    responses(
        (status = 200, description = "Student registered and welcome mail queued", body = Student),
        (status = 400, description = "Invalid or duplicate student")
    )
)]
pub async fn register_student(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterStudentRequest>,
) -> ApiResult<Json<Student>> {
    Ok(Json(state.portal.register_student(req).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/students/{username}",
    tag = "admin",
    params(("username" = String, Path, description = "Student username")),
    responses(
        (status = 200, description = "Student deleted"),
        (status = 404, description = "Student not found")
    )
)]
pub async fn delete_student(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<Value>> {
    state.portal.delete_student(&username).await?;

    Ok(Json(json!({ "message": "Student deleted" })))
}
