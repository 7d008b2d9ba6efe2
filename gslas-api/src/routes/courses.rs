use crate::{error::ApiResult, extract::ApiJson, state::AppState};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use gslas_orchestrator::{Course, CourseRequest, Lab, LabInput, TimetableImport, UpdateCourseRequest};
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/admin/courses",
            get(list_courses).post(create_course),
        )
        .route(
            "/api/v1/admin/courses/{code}",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route(
            "/api/v1/admin/courses/{code}/labs",
            get(list_labs).put(replace_labs),
        )
        .route("/api/v1/admin/timetable", post(import_timetable))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/courses",
    tag = "admin",
    responses((status = 200, description = "All courses", body = Vec<Course>))
)]
pub async fn list_courses(State(state): State<AppState>) -> ApiResult<Json<Vec<Course>>> {
    Ok(Json(state.portal.list_courses().await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/courses",
    tag = "admin",
    request_body = CourseRequest,
    responses(
        (status = 200, description = "Course created", body = Course),
        (status = 400, description = "Invalid or duplicate course")
    )
)]
pub async fn create_course(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CourseRequest>,
) -> ApiResult<Json<Course>> {
    Ok(Json(state.portal.create_course(req).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/courses/{code}",
    tag = "admin",
    params(("code" = String, Path, description = "Course short code")),
    responses(
        (status = 200, description = "Course", body = Course),
        (status = 404, description = "Course not found")
    )
)]
pub async fn get_course(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<Course>> {
    Ok(Json(state.portal.get_course(&code).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/courses/{code}",
    tag = "admin",
    params(("code" = String, Path, description = "Course short code")),
    request_body = UpdateCourseRequest,
    responses(
        (status = 200, description = "Course updated", body = Course),
        (status = 404, description = "Course not found")
    )
)]
pub async fn update_course(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ApiJson(req): ApiJson<UpdateCourseRequest>,
) -> ApiResult<Json<Course>> {
    Ok(Json(state.portal.update_course(&code, req).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/courses/{code}",
    tag = "admin",
    params(("code" = String, Path, description = "Course short code")),
    responses(
        (status = 200, description = "Course and its labs deleted"),
        (status = 404, description = "Course not found")
    )
)]
pub async fn delete_course(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<Value>> {
    state.portal.delete_course(&code).await?;

    Ok(Json(json!({ "message": "Course deleted" })))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/courses/{code}/labs",
    tag = "admin",
    params(("code" = String, Path, description = "Course short code")),
    responses((status = 200, description = "Lab sessions of the course", body = Vec<Lab>))
)]
pub async fn list_labs(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<Vec<Lab>>> {
    Ok(Json(state.portal.list_labs(&code).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/courses/{code}/labs",
    tag = "admin",
    params(("code" = String, Path, description = "Course short code")),
    request_body = Vec<LabInput>,
    responses(
        (status = 200, description = "Lab sessions after the edit", body = Vec<Lab>),
        (status = 400, description = "Invalid lab session")
    )
)]
pub async fn replace_labs(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ApiJson(labs): ApiJson<Vec<LabInput>>,
) -> ApiResult<Json<Vec<Lab>>> {
    Ok(Json(state.portal.replace_labs(&code, labs).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/timetable",
    tag = "admin",
    request_body(content = String, content_type = "text/csv", description = "Timetable export"),
    responses(
        (status = 200, description = "Import report", body = TimetableImport),
        (status = 400, description = "Missing columns or malformed CSV")
    )
)]
pub async fn import_timetable(
    State(state): State<AppState>,
    body: String,
) -> ApiResult<Json<TimetableImport>> {
    Ok(Json(state.portal.import_timetable(&body).await?))
}
