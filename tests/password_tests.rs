//! Tests for password registration and login.
//!
//! Tests cover:
//! - Registration validation and conflicts
//! - Login issuing the same session cookies as OAuth
//! - OAuth-only accounts cannot log in with a password
//! - Per-IP rate limits on login and registration

mod common;

use axum::http::StatusCode;
use common::{
    FakeProvider, TestApp, body_json, cookie_value, create_test_app, create_test_app_with,
    extract_set_cookies, json_body, post,
};
use pixauth::{
    api::hash_password,
    db::{NewUser, OAUTH_PASSWORD_SENTINEL},
    rate_limit::RateLimitConfig,
};
use serde_json::json;
use tower::ServiceExt;

async fn register(t: &TestApp, body: serde_json::Value) -> axum::response::Response {
    t.app
        .clone()
        .oneshot(post("/auth/register").body(json_body(body)).unwrap())
        .await
        .unwrap()
}

async fn login(t: &TestApp, email: &str, password: &str) -> axum::response::Response {
    t.app
        .clone()
        .oneshot(
            post("/auth/login")
                .body(json_body(json!({ "email": email, "password": password })))
                .unwrap(),
        )
        .await
        .unwrap()
}

fn alice() -> serde_json::Value {
    json!({
        "username": "alice",
        "email": "alice@example.com",
        "password": "correct horse",
        "full_name": "Alice Liddell",
    })
}

// =============================================================================
// Register
// =============================================================================

#[tokio::test]
async fn test_register_creates_user() {
    let t = create_test_app().await;

    let response = register(&t, alice()).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(extract_set_cookies(&response).is_empty());

    let body = body_json(response).await;
    assert_eq!(body["message"], "User registered successfully");
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["full_name"], "Alice Liddell");
    assert_eq!(body["user"]["role"], "user");
    assert!(body["user"].get("password_hash").is_none());

    let user = t
        .db
        .users()
        .get_by_email("alice@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(user.password_hash.starts_with("$argon2id$"));
}

#[tokio::test]
async fn test_register_normalizes_email() {
    let t = create_test_app().await;

    let response = register(
        &t,
        json!({ "username": "alice", "email": "  Alice@Example.COM ", "password": "correct horse" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["user"]["email"], "alice@example.com");
}

#[tokio::test]
async fn test_register_validation() {
    let t = create_test_app().await;

    for body in [
        json!({ "username": "", "email": "a@example.com", "password": "correct horse" }),
        json!({ "username": "al", "email": "a@example.com", "password": "correct horse" }),
        json!({ "username": "alice smith", "email": "a@example.com", "password": "correct horse" }),
        json!({ "username": "alice", "email": "not-an-email", "password": "correct horse" }),
        json!({ "username": "alice", "email": "a@example.com", "password": "short" }),
    ] {
        let response = register(&t, body.clone()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", body);
    }

    assert_eq!(t.db.users().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_register_conflicts() {
    let t = create_test_app().await;
    assert_eq!(register(&t, alice()).await.status(), StatusCode::CREATED);

    let same_email = json!({ "username": "alice2", "email": "ALICE@example.com", "password": "correct horse" });
    let response = register(&t, same_email).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let same_name = json!({ "username": "Alice", "email": "other@example.com", "password": "correct horse" });
    let response = register(&t, same_name).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"], "Username already taken");
}

#[tokio::test]
async fn test_register_malformed_body_rejected() {
    let t = create_test_app().await;

    let response = t
        .app
        .clone()
        .oneshot(post("/auth/register").body(axum::body::Body::from("{")).unwrap())
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_issues_session() {
    let t = create_test_app().await;
    register(&t, alice()).await;

    let response = login(&t, "Alice@Example.com", "correct horse").await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = extract_set_cookies(&response);
    let access = cookie_value(&cookies, "access_token").unwrap();
    let refresh = cookie_value(&cookies, "refresh_token").unwrap();

    let claims = t.issuer.validate_access_token(&access).unwrap();
    assert_eq!(claims.email, "alice@example.com");
    let record = t.db.refresh_tokens().get_by_token(&refresh).await.unwrap();
    assert_eq!(record.user_id, claims.sub);

    let body = body_json(response).await;
    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["user"]["username"], "alice");
}

#[tokio::test]
async fn test_login_wrong_password() {
    let t = create_test_app().await;
    register(&t, alice()).await;

    let response = login(&t, "alice@example.com", "wrong horse").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(extract_set_cookies(&response).is_empty());
    assert_eq!(body_json(response).await["error"], "Invalid credentials");
}

#[tokio::test]
async fn test_login_unknown_email_same_answer() {
    let t = create_test_app().await;

    let response = login(&t, "nobody@example.com", "correct horse").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Invalid credentials");
}

#[tokio::test]
async fn test_oauth_only_account_cannot_use_password() {
    let t = create_test_app().await;
    t.db.users()
        .create(NewUser {
            username: "octocat",
            email: "octocat@example.com",
            password_hash: OAUTH_PASSWORD_SENTINEL,
            full_name: None,
            avatar_url: None,
        })
        .await
        .unwrap();

    for password in ["", OAUTH_PASSWORD_SENTINEL, "correct horse"] {
        let response = login(&t, "octocat@example.com", password).await;
        assert_ne!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_login_with_precomputed_hash() {
    let t = create_test_app().await;
    let hash = hash_password("hunter2hunter2").unwrap();
    t.db.users()
        .create(NewUser {
            username: "bob",
            email: "bob@example.com",
            password_hash: &hash,
            full_name: None,
            avatar_url: None,
        })
        .await
        .unwrap();

    let response = login(&t, "bob@example.com", "hunter2hunter2").await;
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Rate limits
// =============================================================================

#[tokio::test]
async fn test_login_rate_limited_per_ip() {
    let t = create_test_app_with(FakeProvider::github(), RateLimitConfig::new(None)).await;

    for _ in 0..5 {
        let response = login(&t, "nobody@example.com", "correct horse").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = login(&t, "nobody@example.com", "correct horse").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_register_rate_limited_per_ip() {
    let t = create_test_app_with(FakeProvider::github(), RateLimitConfig::new(None)).await;

    for _ in 0..3 {
        let response = register(&t, json!({ "username": "x", "email": "x", "password": "x" })).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = register(&t, alice()).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_rate_limit_needs_client_ip() {
    let t = create_test_app_with(FakeProvider::github(), RateLimitConfig::new(None)).await;

    // No ConnectInfo and no proxy header configured.
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(json_body(json!({ "email": "a@example.com", "password": "x" })))
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
