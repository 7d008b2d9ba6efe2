//! Integration tests for REST API endpoints
//!
//! Drives the router end to end: registration, courses and timetable import,
//! preferences and special requests, allocation, export and semester reset.

mod common;

use axum::http::{header, StatusCode};
use common::{TestClient, ADMIN};
use gslas_orchestrator::{AllocationSummary, AssignedSession, Course, Student};
use serde_json::{json, Value};

#[tokio::test]
async fn test_health_endpoints_need_no_auth() {
    let (client, _pool) = TestClient::new_with_db().await;

    let response = client.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = common::extract_json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "gslas-api");

    let response = client.get("/health/ready", None).await;
    let body: Value = common::extract_json_body(response).await;
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let (client, _pool) = TestClient::new_with_db().await;

    let response = client.get("/api-docs/openapi.json", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let doc: Value = common::extract_json_body(response).await;
    assert!(doc["paths"]["/api/v1/admin/allocation/run"]["post"].is_object());
    assert!(doc["paths"]["/api/v1/me/preferences"]["put"].is_object());
}

#[tokio::test]
async fn test_admin_registers_student() {
    let (client, _pool) = TestClient::new_with_db().await;

    let response = client
        .post(
            "/api/v1/admin/students",
            &json!({
                "username": "alice",
                "first_name": "Alice",
                "last_name": "Tan",
                "email": "alice@uni.test"
            }),
            Some(ADMIN),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let student: Student = common::extract_json_body(response).await;
    assert_eq!(student.name, "Alice Tan");

    let response = client.get("/api/v1/admin/outbox", Some(ADMIN)).await;
    let outbox: Vec<Value> = common::extract_json_body(response).await;
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0]["recipients"], json!(["alice@uni.test"]));

    // The new student can now sign in
    let response = client.get("/api/v1/me", Some("alice")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .post(
            "/api/v1/admin/students",
            &json!({
                "username": "bad name",
                "first_name": "B",
                "last_name": "C",
                "email": "b@uni.test"
            }),
            Some(ADMIN),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = common::extract_json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("Invalid username"));
}

#[tokio::test]
async fn test_delete_unknown_student_is_not_found() {
    let (client, _pool) = TestClient::new_with_db().await;

    let response = client
        .delete("/api/v1/admin/students/ghost", Some(ADMIN))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_course_management_and_timetable_import() {
    let (client, pool) = TestClient::new_with_db().await;
    common::fixture_student(&pool, "alice", 1).await;

    let response = client
        .post(
            "/api/v1/admin/courses",
            &json!({
                "code": "SC2002/CZ2002",
                "title": "Object Oriented Design",
                "year": 2,
                "lab_cat": "c",
                "hours": 2,
                "weeks": 12
            }),
            Some(ADMIN),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let course: Course = common::extract_json_body(response).await;
    assert_eq!(course.short_code, "SC2002");
    assert_eq!(course.lab_cat, "C");

    let csv = "COURSE,TYPE,GROUP,DAY,TIME,VENUE,REMARK\n\
               SC2002,LAB,SCS1,WED,1030-1220,SWLAB3,Teaching Wk2-13\n\
               SC2002,LAB,SCS2,THU,1430-1620,SWLAB3,\n";
    let response = client
        .post_csv("/api/v1/admin/timetable", csv, Some(ADMIN))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let report: Value = common::extract_json_body(response).await;
    assert_eq!(report["inserted"], 2);

    let response = client
        .get("/api/v1/admin/courses/SC2002/labs", Some(ADMIN))
        .await;
    let labs: Vec<Value> = common::extract_json_body(response).await;
    assert_eq!(labs.len(), 2);
    assert_eq!(labs[0]["day"], "WED");

    // Students see the catalogue but not the admin view
    let response = client.get("/api/v1/courses", Some("alice")).await;
    let courses: Vec<Course> = common::extract_json_body(response).await;
    assert_eq!(courses[0].grp_count, Some(2));

    let response = client
        .get("/api/v1/admin/courses/SC2002", Some("alice"))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .get("/api/v1/admin/courses/SC9999", Some(ADMIN))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_preference_rules_are_reported() {
    let (client, pool) = TestClient::new_with_db().await;
    common::fixture_student(&pool, "alice", 1).await;
    common::fixture_course(&pool, "SC1003/CZ1003").await;

    let response = client
        .put(
            "/api/v1/me/preferences",
            &json!([{ "course": "SC1003", "ranking": 9 }]),
            Some("alice"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = common::extract_json_body(response).await;
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("Ranking for SC1003 must be between 1 and 8"));
    assert!(error.contains("You must rank at least 3 courses for Year 2."));
}

#[tokio::test]
async fn test_special_request_review_flow() {
    let (client, pool) = TestClient::new_with_db().await;
    common::fixture_student(&pool, "alice", 2).await;

    let response = client.get("/api/v1/me/special-request", Some("alice")).await;
    let none: Value = common::extract_json_body(response).await;
    assert!(none.is_null());

    let response = client
        .put(
            "/api/v1/me/special-request",
            &json!({
                "unavailable_slots": ["Fri-PM"],
                "max_teaching_days": 2,
                "justification": "Coursework on Fridays"
            }),
            Some("alice"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let request: Value = common::extract_json_body(response).await;
    let id = request["id"].as_i64().unwrap();

    let response = client
        .get("/api/v1/admin/special-requests", Some(ADMIN))
        .await;
    let requests: Vec<Value> = common::extract_json_body(response).await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["student_name"], "alice Tester");

    let response = client
        .post(
            &format!("/api/v1/admin/special-requests/{}/review", id),
            &json!({ "course_lock_approved": false, "availability_approved": true }),
            Some(ADMIN),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome: Value = common::extract_json_body(response).await;
    assert_eq!(outcome["notified"], false);
    assert_eq!(outcome["request"]["availability_approved"], true);
}

#[tokio::test]
async fn test_allocation_workflow() {
    let (client, pool) = TestClient::new_with_db().await;
    common::fixture_course(&pool, "SC1003/CZ1003").await;
    common::fixture_student(&pool, "alice", 1).await;
    common::fixture_student(&pool, "bob", 1).await;

    let response = client
        .post("/api/v1/admin/allocation/run", &json!({}), Some(ADMIN))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let summary: AllocationSummary = common::extract_json_body(response).await;
    assert_eq!(summary.new_assignments, 2);
    assert_eq!(summary.statistics.assignment_percentage, 100.0);
    assert_eq!(summary.statistics.students_with_lab_load_met, 2);

    let response = client.get("/api/v1/me/allocations", Some("alice")).await;
    let sessions: Vec<AssignedSession> = common::extract_json_body(response).await;
    assert_eq!(sessions.len(), 1);
    let other = if sessions[0].group == "L1" { "L2" } else { "L1" };

    // alice is already at her load
    let response = client
        .put(
            &format!("/api/v1/admin/allocation/courses/SC1003/groups/{}", other),
            &json!({ "student": "alice" }),
            Some(ADMIN),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = common::extract_json_body(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Student is already at maximum lab load"));

    let response = client
        .put(
            &format!("/api/v1/admin/allocation/courses/SC1003/groups/{}", other),
            &json!({ "student": null }),
            Some(ADMIN),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.get("/api/v1/admin/allocation", Some(ADMIN)).await;
    let overview: Value = common::extract_json_body(response).await;
    assert_eq!(overview["statistics"]["assigned_labs"], 1);
    assert_eq!(overview["courses"][0]["groups"].as_array().unwrap().len(), 2);

    let response = client
        .get("/api/v1/admin/allocation/export", Some(ADMIN))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"allocations.csv\""
    );
    let csv = common::extract_text_body(response).await;
    assert!(csv.starts_with("Course Code,Course Name,Lab Category"));
    assert!(csv.contains("Not Assigned"));

    let response = client
        .post("/api/v1/admin/allocation/confirm", &json!({}), Some(ADMIN))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let receipt: Value = common::extract_json_body(response).await;
    assert_eq!(receipt["recipients"], 2);

    let response = client.get("/api/v1/admin/allocation/runs", Some(ADMIN)).await;
    let runs: Vec<Value> = common::extract_json_body(response).await;
    assert_eq!(runs.len(), 1);
}

#[tokio::test]
async fn test_allocation_without_students_fails() {
    let (client, pool) = TestClient::new_with_db().await;
    common::fixture_course(&pool, "SC1003/CZ1003").await;

    let response = client
        .post("/api/v1/admin/allocation/run", &json!({ "clear_existing": true }), Some(ADMIN))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = common::extract_json_body(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("No eligible students for allocation"));
}

#[tokio::test]
async fn test_weights_validation() {
    let (client, _pool) = TestClient::new_with_db().await;

    let response = client
        .get("/api/v1/admin/allocation/weights", Some(ADMIN))
        .await;
    let mut weights: Value = common::extract_json_body(response).await;
    assert_eq!(weights["permutation_count"], 30);

    weights["permutation_count"] = json!(0);
    let response = client
        .put("/api/v1/admin/allocation/weights", &weights, Some(ADMIN))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    weights["permutation_count"] = json!(5);
    let response = client
        .put("/api/v1/admin/allocation/weights", &weights, Some(ADMIN))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_broadcast_and_semester_reset() {
    let (client, pool) = TestClient::new_with_db().await;
    common::fixture_student(&pool, "alice", 1).await;
    common::fixture_student(&pool, "bob", 0).await;

    let response = client
        .post(
            "/api/v1/admin/communications",
            &json!({ "subject": "Reminder", "message": "Rank your courses", "recipients": ["bob"] }),
            Some(ADMIN),
        )
        .await;
    let receipt: Value = common::extract_json_body(response).await;
    assert_eq!(receipt["recipients"], 1);

    let response = client
        .post(
            "/api/v1/admin/semester/reset",
            &json!({ "confirmation": "yes" }),
            Some(ADMIN),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(
            "/api/v1/admin/semester/reset",
            &json!({ "confirmation": "CONFIRM" }),
            Some(ADMIN),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let summary: Value = common::extract_json_body(response).await;
    assert_eq!(summary["assignments"], 0);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let (client, _pool) = TestClient::new_with_db().await;

    let response = client
        .put(
            "/api/v1/admin/allocation/weights",
            &json!({ "odd_even_pair_weight": "x" }),
            Some(ADMIN),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    let body: Value = common::extract_json_body(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to deserialize the JSON body"));

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/admin/students")
        .header("content-type", "application/json")
        .header("x-user", ADMIN)
        .body(axum::body::Body::from("{\"username\": "))
        .unwrap();
    let response = client.send_request(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = common::extract_json_body(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_course_hours_are_bounded() {
    let (client, _pool) = TestClient::new_with_db().await;

    let response = client
        .post(
            "/api/v1/admin/courses",
            &json!({
                "code": "SC1003/CZ1003",
                "title": "Introduction to Computational Thinking",
                "year": 1,
                "lab_cat": "C",
                "hours": 400_000_000,
                "weeks": 13
            }),
            Some(ADMIN),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = common::extract_json_body(response).await;
    assert_eq!(body["error"], "Lab hours must be between 1 and 24");
}
