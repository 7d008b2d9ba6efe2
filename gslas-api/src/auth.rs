use crate::{error::ApiError, state::AppState};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use gslas_orchestrator::OrchestratorError;

#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub username: String,
    pub email: Option<String>,
    pub is_admin: bool,
    /// Has a student record
    pub is_student: bool,
}

/// Auth middleware - resolves the user set by the authenticating proxy
///
/// The portal sits behind an auth proxy that sets `X-VM-User` (or the
/// oauth2-proxy `X-Forwarded-User`). `X-User` is accepted for local development.
/// Admins come from configuration; everyone else must be a registered student.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let username = req
        .headers()
        .get("x-vm-user")
        .or_else(|| req.headers().get("x-forwarded-user"))
        .or_else(|| req.headers().get("x-user"))
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

    let email = req
        .headers()
        .get("x-vm-email")
        .or_else(|| req.headers().get("x-forwarded-email"))
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    let is_admin = state.config.is_admin(&username);
    let is_student = match state.portal.get_student(&username).await {
        Ok(_) => true,
        Err(OrchestratorError::NotFound(_)) => false,
        Err(e) => return Err(e.into()),
    };

    if !is_admin && !is_student {
        return Err(ApiError::Forbidden(format!(
            "User {} is not registered on the portal",
            username
        )));
    }

    req.extensions_mut().insert(AuthenticatedUser {
        username,
        email,
        is_admin,
        is_student,
    });

    Ok(next.run(req).await)
}

fn current_user(req: &Request) -> Result<&AuthenticatedUser, ApiError> {
    req.extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))
}

/// Reject users without admin access. Runs inside `auth_middleware`.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    if !current_user(&req)?.is_admin {
        return Err(ApiError::Forbidden("Admin access required".to_string()));
    }
    Ok(next.run(req).await)
}

/// Reject users without a student record. Runs inside `auth_middleware`.
pub async fn require_student(req: Request, next: Next) -> Result<Response, ApiError> {
    if !current_user(&req)?.is_student {
        return Err(ApiError::Forbidden("Student access required".to_string()));
    }
    Ok(next.run(req).await)
}
