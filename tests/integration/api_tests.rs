//! API integration tests
//!
//! These expect a server on localhost:8080 started with the default
//! configuration (`database.url = "memory"` works too).

use reqwest::Client;
use serde_json::{json, Value};
use shelfshare_server::models::UserClaims;

const BASE_URL: &str = "http://localhost:8080/api/v1";
const JWT_SECRET: &str = "change-this-secret-in-production";

/// Helper to mint a token the server accepts
fn token_for(user_id: i64, is_admin: bool) -> String {
    let now = chrono::Utc::now().timestamp();
    UserClaims {
        sub: format!("user{}", user_id),
        user_id,
        is_admin,
        exp: now + 3600,
        iat: now,
    }
    .create_token(JWT_SECRET)
    .expect("Failed to create token")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_readiness_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/ready", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
#[ignore]
async fn test_borrow_requires_token() {
    let client = Client::new();

    let response = client
        .post(format!("{}/borrows", BASE_URL))
        .json(&json!({
            "book_id": 1,
            "start_date": "2030-01-02",
            "end_date": "2030-01-05"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_invalid_token_rejected() {
    let client = Client::new();

    let response = client
        .get(format!("{}/borrows/active", BASE_URL))
        .header("Authorization", "Bearer not-a-token")
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_unknown_borrow_is_not_found() {
    let client = Client::new();
    let token = token_for(4242, false);

    let response = client
        .get(format!("{}/borrows/999999", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], 5);
    assert_eq!(body["error"], "NoSuchData");
}

#[tokio::test]
#[ignore]
async fn test_borrow_request_validation() {
    let client = Client::new();
    let token = token_for(4242, false);

    let response = client
        .post(format!("{}/borrows", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({
            "book_id": 0,
            "start_date": "2030-01-02",
            "end_date": "2030-01-05"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
#[ignore]
async fn test_accept_rejects_malformed_time() {
    let client = Client::new();
    let token = token_for(4242, false);

    let response = client
        .post(format!("{}/borrows/1/accept", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({
            "final_time": "10h",
            "final_location": "Library"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
#[ignore]
async fn test_listings_for_new_user_are_empty() {
    let client = Client::new();
    let token = token_for(4243, false);

    for listing in ["incoming", "active", "history"] {
        let response = client
            .get(format!("{}/borrows/{}", BASE_URL, listing))
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());
        let body: Value = response.json().await.expect("Failed to parse response");
        assert_eq!(body.as_array().map(Vec::len), Some(0));
    }
}

#[tokio::test]
#[ignore]
async fn test_sweeps_require_admin() {
    let client = Client::new();
    let token = token_for(4242, false);

    let response = client
        .post(format!("{}/admin/sweeps", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 403);
}

#[tokio::test]
#[ignore]
async fn test_admin_runs_sweeps() {
    let client = Client::new();
    let token = token_for(1, true);

    let response = client
        .post(format!("{}/admin/sweeps", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    let reports = body.as_array().expect("Expected an array of reports");
    assert_eq!(reports.len(), 5);
    assert_eq!(reports[0]["sweep"], "unaccepted_request");

    let response = client
        .post(format!("{}/admin/sweeps/return_due", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["sweep"], "return_due");

    let response = client
        .post(format!("{}/admin/sweeps/nope", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 404);
}
