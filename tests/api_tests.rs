//! API integration tests
//!
//! Need a running server on a freshly seeded database:
//! `SEED_PASSWORD=challengers123 cargo run --bin seed`, then start the server.

use reqwest::Client;
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:5000/api/v1";

fn password() -> String {
    std::env::var("SEED_PASSWORD").unwrap_or_else(|_| "challengers123".to_string())
}

/// Helper to get a token for one of the seeded accounts
async fn get_auth_token(client: &Client, username: &str) -> String {
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "username": username,
            "password": password()
        }))
        .send()
        .await
        .expect("Failed to send login request");

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

async fn component_by_code(client: &Client, token: &str, code: &str) -> Value {
    let response = client
        .get(format!("{}/components/code/{}", BASE_URL, code))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    response.json().await.expect("Failed to parse response")
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
async fn test_login() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "username": "admin",
            "password": password()
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["role"], "admin");
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "username": "admin",
            "password": "wrong"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_components_require_auth() {
    let client = Client::new();

    let response = client
        .get(format!("{}/components", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_list_components_with_search() {
    let client = Client::new();
    let token = get_auth_token(&client, "member1").await;

    let response = client
        .get(format!("{}/components?search=arduino", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    let components = body.as_array().expect("Expected an array");
    assert!(components.iter().any(|c| c["componentId"] == "ARD-001"));
    assert!(components.iter().all(|c| c["componentId"] != "SENS-001"));
}

#[tokio::test]
#[ignore]
async fn test_member_cannot_create_component() {
    let client = Client::new();
    let token = get_auth_token(&client, "member1").await;

    let response = client
        .post(format!("{}/components", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({
            "componentId": "TEST-999",
            "name": "Test component",
            "category": "Misc"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 403);
}

#[tokio::test]
#[ignore]
async fn test_checkout_and_return() {
    let client = Client::new();
    let token = get_auth_token(&client, "member1").await;

    let component = component_by_code(&client, &token, "SENS-002").await;
    let id = component["id"].as_str().expect("No id").to_string();
    assert_eq!(component["status"], "available");

    let response = client
        .post(format!("{}/components/{}/checkout", BASE_URL, id))
        .bearer_auth(&token)
        .json(&json!({ "notes": "Weather station" }))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "taken");
    assert!(body["dueDate"].is_string());

    // A second checkout must fail
    let response = client
        .post(format!("{}/components/{}/checkout", BASE_URL, id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 400);

    let response = client
        .post(format!("{}/components/{}/return", BASE_URL, id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "available");
    assert!(body["currentBorrower"].is_null());
}

#[tokio::test]
#[ignore]
async fn test_request_and_reject() {
    let client = Client::new();
    let member = get_auth_token(&client, "member2").await;
    let admin = get_auth_token(&client, "admin").await;

    let component = component_by_code(&client, &member, "MOT-001").await;

    let response = client
        .post(format!("{}/requests", BASE_URL))
        .bearer_auth(&member)
        .json(&json!({
            "componentId": component["id"],
            "notes": "Pan/tilt camera mount"
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);
    let request: Value = response.json().await.expect("Failed to parse response");
    let request_id = request["id"].as_str().expect("No id").to_string();

    let response = client
        .patch(format!("{}/requests/{}/reject", BASE_URL, request_id))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["rejectionReason"], "No reason provided");
}

#[tokio::test]
#[ignore]
async fn test_dashboard_stats() {
    let client = Client::new();
    let token = get_auth_token(&client, "admin").await;

    let response = client
        .get(format!("{}/dashboard/stats", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["stats"]["total"].is_number());
    assert!(body["recentActivity"].is_array());
}
