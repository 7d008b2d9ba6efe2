pub mod allocation;
pub mod communications;
pub mod courses;
pub mod health;
pub mod me;
pub mod portal;
pub mod special_requests;
pub mod students;

use crate::{
    api_docs::ApiDoc,
    auth::{auth_middleware, require_admin, require_student},
    config::Config,
    state::AppState,
};
use axum::{middleware, routing::get, Json, Router};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

pub async fn create_app(pool: SqlitePool, config: Config) -> anyhow::Result<Router> {
    let state = AppState::new(pool, config);

    // Allow CORS for local development (frontend on different port)
    let cors = CorsLayer::permissive();

    let admin = students::routes()
        .merge(courses::routes())
        .merge(special_requests::routes())
        .merge(allocation::routes())
        .merge(communications::routes())
        .route_layer(middleware::from_fn(require_admin));

    let student = me::routes().route_layer(middleware::from_fn(require_student));

    let app = Router::new()
        .merge(health::routes()) // Health routes don't need auth
        .route("/api-docs/openapi.json", get(openapi_spec))
        .merge(
            portal::routes()
                .merge(student)
                .merge(admin)
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
