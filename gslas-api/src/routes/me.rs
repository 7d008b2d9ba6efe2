use crate::{auth::AuthenticatedUser, error::ApiResult, extract::ApiJson, state::AppState};
use axum::{
    extract::State,
    routing::{get, post, put},
    Extension, Json, Router,
};
use gslas_orchestrator::{
    AssignedSession, ContactRequest, NotificationReceipt, PreferenceEntry, SemesterInfoRequest,
    SpecialRequest, SpecialRequestSubmission, Student, TeachingPreference, UpdateProfileRequest,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/me", get(get_me))
        .route("/api/v1/me/profile", put(update_profile))
        .route("/api/v1/me/semester", put(submit_semester_info))
        .route(
            "/api/v1/me/preferences",
            get(get_preferences).put(submit_preferences),
        )
        .route(
            "/api/v1/me/special-request",
            get(get_special_request).put(submit_special_request),
        )
        .route("/api/v1/me/allocations", get(my_allocations))
        .route("/api/v1/me/messages", post(contact_student))
}

#[utoipa::path(
    get,
    path = "/api/v1/me",
    tag = "student",
    responses((status = 200, description = "Own student record", body = Student))
)]
pub async fn get_me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<Student>> {
    Ok(Json(state.portal.get_student(&user.username).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/me/profile",
    tag = "student",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = Student),
        (status = 400, description = "Invalid e-mail or matriculation date")
    )
)]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> ApiResult<Json<Student>> {
    Ok(Json(state.portal.update_profile(&user.username, req).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/me/semester",
    tag = "student",
    request_body = SemesterInfoRequest,
    responses((status = 200, description = "Semester information saved", body = Student))
)]
pub async fn submit_semester_info(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(req): ApiJson<SemesterInfoRequest>,
) -> ApiResult<Json<Student>> {
    Ok(Json(
        state
            .portal
            .submit_semester_info(&user.username, req)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/me/preferences",
    tag = "student",
    responses((status = 200, description = "Own course ranking", body = Vec<TeachingPreference>))
)]
pub async fn get_preferences(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<Vec<TeachingPreference>>> {
    Ok(Json(state.portal.get_preferences(&user.username).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/me/preferences",
    tag = "student",
    request_body = Vec<PreferenceEntry>,
    responses(
        (status = 200, description = "Ranking replaced", body = Vec<TeachingPreference>),
        (status = 400, description = "Ranking rules violated")
    )
)]
pub async fn submit_preferences(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(entries): ApiJson<Vec<PreferenceEntry>>,
) -> ApiResult<Json<Vec<TeachingPreference>>> {
    Ok(Json(
        state
            .portal
            .submit_preferences(&user.username, entries)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/me/special-request",
    tag = "student",
    responses((status = 200, description = "Own special request, null when none", body = Option<SpecialRequest>))
)]
pub async fn get_special_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<Option<SpecialRequest>>> {
    Ok(Json(state.portal.get_special_request(&user.username).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/me/special-request",
    tag = "student",
    request_body = SpecialRequestSubmission,
    responses(
        (status = 200, description = "Request submitted for review", body = SpecialRequest),
        (status = 400, description = "Invalid request")
    )
)]
pub async fn submit_special_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(req): ApiJson<SpecialRequestSubmission>,
) -> ApiResult<Json<SpecialRequest>> {
    Ok(Json(
        state
            .portal
            .submit_special_request(&user.username, req)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/me/allocations",
    tag = "student",
    responses((status = 200, description = "Own lab sessions", body = Vec<AssignedSession>))
)]
pub async fn my_allocations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<Vec<AssignedSession>>> {
    Ok(Json(state.portal.student_allocations(&user.username).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/me/messages",
    tag = "student",
    request_body = ContactRequest,
    responses(
        (status = 200, description = "Message queued", body = NotificationReceipt),
        (status = 404, description = "Recipient not found")
    )
)]
pub async fn contact_student(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(req): ApiJson<ContactRequest>,
) -> ApiResult<Json<NotificationReceipt>> {
    Ok(Json(state.portal.contact_student(&user.username, req).await?))
}
