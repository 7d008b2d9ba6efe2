//! Common test utilities and helpers for gslas-api tests
//!
//! Shared database setup, fixtures and a small client that drives the router
//! with `oneshot`.

#![allow(dead_code)]

use axum::Router;
use gslas_api::Config;
use gslas_orchestrator::{
    CourseRequest, LabInput, Portal, RegisterStudentRequest, SemesterInfoRequest, Student,
};
use sqlx::SqlitePool;

pub use gslas_orchestrator::test_utils::create_test_db;

pub const ADMIN: &str = "admin";

pub fn test_config() -> Config {
    Config {
        admins: vec![ADMIN.to_string()],
        portal_url: "https://portal.test/".to_string(),
        allocation_seed: Some(7),
        ..Config::default()
    }
}

/// Create a test app with the given database pool
pub async fn create_test_app(pool: SqlitePool) -> Router {
    gslas_api::create_app(pool, test_config())
        .await
        .expect("Failed to create test app")
}

/// Fixture: register a student, optionally on lab duty
pub async fn fixture_student(pool: &SqlitePool, username: &str, lab_load: u32) -> Student {
    let portal = Portal::new(pool.clone());
    portal
        .register_student(RegisterStudentRequest {
            username: username.to_string(),
            first_name: username.to_string(),
            last_name: "Tester".to_string(),
            email: format!("{}@uni.test", username),
        })
        .await
        .expect("Failed to create fixture student");

    portal
        .submit_semester_info(
            username,
            SemesterInfoRequest {
                gs_duty: lab_load > 0,
                lab_load,
                past_courses: vec![],
            },
        )
        .await
        .expect("Failed to set fixture semester info")
}

/// Fixture: a course with one Monday and one Tuesday lab group
pub async fn fixture_course(pool: &SqlitePool, code: &str) {
    let portal = Portal::new(pool.clone());
    portal
        .create_course(CourseRequest {
            code: code.to_string(),
            title: format!("Course {}", code),
            year: 1,
            lab_cat: "C".to_string(),
            hours: 2,
            weeks: 13,
        })
        .await
        .expect("Failed to create fixture course");

    let short = code.split('/').next().unwrap_or(code);
    let lab = |group: &str, day: &str, time: &str| LabInput {
        id: None,
        group: group.to_string(),
        day: day.to_string(),
        time: time.to_string(),
        venue: "HWLAB3".to_string(),
        teaching_weeks: String::new(),
    };
    portal
        .replace_labs(
            short,
            vec![
                lab("L1", "MON", "0830-1020"),
                lab("L2", "TUE", "1030-1220"),
            ],
        )
        .await
        .expect("Failed to create fixture labs");
}

/// Helper to extract JSON body from axum response
pub async fn extract_json_body<T>(response: axum::response::Response) -> T
where
    T: serde::de::DeserializeOwned,
{
    let body = extract_text_body(response).await;
    serde_json::from_str(&body).expect("Failed to deserialize JSON")
}

pub async fn extract_text_body(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    String::from_utf8(body.to_vec()).expect("Response body is not UTF-8")
}

/// Helper to create authenticated request headers
pub fn auth_headers(username: &str) -> Vec<(&'static str, &str)> {
    vec![("x-user", username)]
}

/// TestClient to encapsulate API interaction logic
pub struct TestClient {
    pub app: Router,
}

impl TestClient {
    pub async fn new(pool: SqlitePool) -> Self {
        let app = create_test_app(pool).await;
        Self { app }
    }

    /// Create a new TestClient with a new in-memory DB
    pub async fn new_with_db() -> (Self, SqlitePool) {
        let pool = create_test_db().await;
        let client = Self::new(pool.clone()).await;
        (client, pool)
    }

    pub async fn send_request(
        &self,
        request: axum::http::Request<axum::body::Body>,
    ) -> axum::http::Response<axum::body::Body> {
        use tower::ServiceExt;
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        content_type: Option<&str>,
        body: axum::body::Body,
        user: Option<&str>,
    ) -> axum::http::Response<axum::body::Body> {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        if let Some(user) = user {
            for (k, v) in auth_headers(user) {
                builder = builder.header(k, v);
            }
        }

        self.send_request(builder.body(body).unwrap()).await
    }

    async fn send_json<T: serde::Serialize>(
        &self,
        method: &str,
        uri: &str,
        body: &T,
        user: Option<&str>,
    ) -> axum::http::Response<axum::body::Body> {
        let body = serde_json::to_string(body).expect("Failed to serialize request body");
        self.send(
            method,
            uri,
            Some("application/json"),
            axum::body::Body::from(body),
            user,
        )
        .await
    }

    pub async fn get(&self, uri: &str, user: Option<&str>) -> axum::http::Response<axum::body::Body> {
        self.send("GET", uri, None, axum::body::Body::empty(), user)
            .await
    }

    pub async fn delete(
        &self,
        uri: &str,
        user: Option<&str>,
    ) -> axum::http::Response<axum::body::Body> {
        self.send("DELETE", uri, None, axum::body::Body::empty(), user)
            .await
    }

    pub async fn post<T: serde::Serialize>(
        &self,
        uri: &str,
        body: &T,
        user: Option<&str>,
    ) -> axum::http::Response<axum::body::Body> {
        self.send_json("POST", uri, body, user).await
    }

    pub async fn put<T: serde::Serialize>(
        &self,
        uri: &str,
        body: &T,
        user: Option<&str>,
    ) -> axum::http::Response<axum::body::Body> {
        self.send_json("PUT", uri, body, user).await
    }

    pub async fn post_csv(
        &self,
        uri: &str,
        csv: &str,
        user: Option<&str>,
    ) -> axum::http::Response<axum::body::Body> {
        self.send(
            "POST",
            uri,
            Some("text/csv"),
            axum::body::Body::from(csv.to_string()),
            user,
        )
        .await
    }
}
