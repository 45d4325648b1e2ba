//! API Integration Tests
//!
//! Every test drives the full router (middleware included) over the
//! in-memory backend.

use agrimarket_api::{create_router_for_testing, create_test_app, state::AppState};
use agrimarket_core::{AppConfig, NewUser, UserType, UserUpdate};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const PASSWORD: &str = "secret1";

/// Helper to create a test request
fn create_json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn registration(name: &str, email: &str, user_type: &str) -> Value {
    json!({
        "action": "register",
        "name": name,
        "email": email,
        "password": PASSWORD,
        "user_type": user_type,
        "phone": "09171234567",
        "address": "Purok 3"
    })
}

async fn register(app: &Router, email: &str, user_type: &str) -> (StatusCode, Value) {
    send(
        app,
        create_json_request("POST", "/api/auth", None, Some(registration("Ana", email, user_type))),
    )
    .await
}

async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
    send(
        app,
        create_json_request(
            "POST",
            "/api/auth",
            None,
            Some(json!({"action": "login", "email": email, "password": password})),
        ),
    )
    .await
}

async fn validate(app: &Router, token: &str) -> (StatusCode, Value) {
    send(
        app,
        create_json_request(
            "POST",
            "/api/auth",
            None,
            Some(json!({"action": "validate", "token": token})),
        ),
    )
    .await
}

/// Register through the API and return (user id, token)
async fn register_user(app: &Router, email: &str, user_type: &str) -> (i64, String) {
    let (status, json) = register(app, email, user_type).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    (
        json["data"]["user"]["id"].as_i64().unwrap(),
        json["data"]["token"].as_str().unwrap().to_string(),
    )
}

/// Insert an administrator directly and log in as them
async fn seed_admin(app: &Router, state: &Arc<AppState>, email: &str) -> (i64, String) {
    let password_hash = state.auth.hasher().hash(PASSWORD).unwrap();
    let admin = state
        .users
        .create_user(NewUser {
            name: "Kapitan".to_string(),
            email: email.to_string(),
            password_hash,
            phone: "0917000000".to_string(),
            address: String::new(),
            user_type: UserType::Admin,
            is_verified: true,
        })
        .await
        .unwrap();

    let (status, json) = login(app, email, PASSWORD).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    (admin.id, json["data"]["token"].as_str().unwrap().to_string())
}

fn test_app() -> (Router, Arc<AppState>) {
    create_test_app(AppConfig::default())
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_openapi_document_served() {
    let app = create_router_for_testing();
    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/api-docs/openapi.json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/api/auth"].is_object());
}

// =============================================================================
// Registration Tests
// =============================================================================

#[tokio::test]
async fn test_register_farmer_unverified() {
    let app = create_router_for_testing();

    let (status, json) = register(&app, "ana@x.com", "farmer").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Registration successful");
    assert_eq!(json["data"]["user"]["email"], "ana@x.com");
    assert_eq!(json["data"]["user"]["user_type"], "farmer");
    assert_eq!(json["data"]["user"]["is_verified"], false);
    assert_eq!(json["data"]["user"]["is_active"], true);
    assert!(json["data"]["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(json["data"]["expires_at"].is_string());

    let raw = json.to_string();
    assert!(!raw.contains("password"));
    assert!(!raw.contains("$argon2"));
}

#[tokio::test]
async fn test_register_accepts_camel_case_user_type() {
    let app = create_router_for_testing();
    let mut body = registration("Ben", "ben@x.com", "buyer");
    body.as_object_mut().unwrap().remove("user_type");
    body["userType"] = json!("buyer");

    let (status, json) = send(&app, create_json_request("POST", "/api/auth", None, Some(body))).await;

    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["user"]["user_type"], "buyer");
    assert_eq!(json["data"]["user"]["is_verified"], false);
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let app = create_router_for_testing();
    register_user(&app, "ana@x.com", "farmer").await;

    let (status, json) = register(&app, "ana@x.com", "buyer").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(json["message"].as_str().unwrap().contains("already registered"));

    // Case and surrounding whitespace do not make a new address
    let (status, json) = register(&app, "  ANA@X.com ", "buyer").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("already registered"));
}

#[tokio::test]
async fn test_register_missing_fields() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth",
            None,
            Some(json!({"action": "register", "email": "ana@x.com", "name": "  "})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json["message"],
        "Missing required fields: name, password, user_type, phone"
    );
}

#[tokio::test]
async fn test_register_field_validation() {
    let app = create_router_for_testing();

    let mut bad_type = registration("Ana", "ana@x.com", "seller");
    let (status, json) =
        send(&app, create_json_request("POST", "/api/auth", None, Some(bad_type.take()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Invalid user type");

    let (status, json) = register(&app, "not-an-email", "farmer").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Invalid email format");

    let mut short = registration("Ana", "ana@x.com", "farmer");
    short["password"] = json!("12345");
    let (status, json) = send(&app, create_json_request("POST", "/api/auth", None, Some(short))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Password must be at least 6 characters long");
}

#[tokio::test]
async fn test_admin_self_registration_rejected() {
    let app = create_router_for_testing();

    let (status, json) = register(&app, "boss@x.com", "admin").await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        json["message"],
        "Only administrators can create administrator accounts"
    );
    let (status, _) = login(&app, "boss@x.com", PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_can_register_admin() {
    let (app, state) = test_app();
    let (_, admin_token) = seed_admin(&app, &state, "kap@x.com").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth",
            Some(&admin_token),
            Some(registration("Deputy", "deputy@x.com", "admin")),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["user"]["user_type"], "admin");
    assert_eq!(json["data"]["user"]["is_verified"], true);
}

#[tokio::test]
async fn test_open_admin_registration_is_verified() {
    let mut config = AppConfig::default();
    config.auth.allow_admin_self_registration = true;
    let (app, _state) = create_test_app(config);

    let (status, json) = register(&app, "boss@x.com", "admin").await;

    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["user"]["is_verified"], true);
}

// =============================================================================
// Login Tests
// =============================================================================

#[tokio::test]
async fn test_login_success_issues_distinct_tokens() {
    let app = create_router_for_testing();
    let (_, first) = register_user(&app, "ana@x.com", "farmer").await;

    let (status, json) = login(&app, "ana@x.com", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Login successful");
    let second = json["data"]["token"].as_str().unwrap().to_string();
    assert_ne!(first, second);

    // Earlier sessions stay valid
    assert_eq!(validate(&app, &first).await.0, StatusCode::OK);
    assert_eq!(validate(&app, &second).await.0, StatusCode::OK);
}

#[tokio::test]
async fn test_login_email_case_insensitive() {
    let app = create_router_for_testing();
    register_user(&app, "ana@x.com", "farmer").await;

    let (status, json) = login(&app, "ANA@X.com", PASSWORD).await;

    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["user"]["email"], "ana@x.com");
}

#[tokio::test]
async fn test_login_wrong_password() {
    let app = create_router_for_testing();
    register_user(&app, "ana@x.com", "farmer").await;

    let (status, json) = login(&app, "ana@x.com", "wrong-password").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Invalid email or password");

    // Unknown accounts are indistinguishable
    let (status, json) = login(&app, "ghost@x.com", PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Invalid email or password");
}

#[tokio::test]
async fn test_login_inactive_user() {
    let (app, state) = test_app();
    let (id, token) = register_user(&app, "ana@x.com", "farmer").await;

    state
        .users
        .update_user(
            id,
            &UserUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (status, json) = login(&app, "ana@x.com", PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Invalid email or password");

    // Deactivation also invalidates existing tokens
    let (status, json) = validate(&app, &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Invalid or expired token");
}

// =============================================================================
// Token Validation and Logout Tests
// =============================================================================

#[tokio::test]
async fn test_validate_token_sources() {
    let app = create_router_for_testing();
    let (id, token) = register_user(&app, "ana@x.com", "farmer").await;

    let (status, json) = validate(&app, &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Token valid");
    assert_eq!(json["data"]["user"]["id"], id);

    let (status, _) = send(
        &app,
        create_json_request("POST", "/api/auth", Some(&token), Some(json!({"action": "validate"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth")
        .header("Content-Type", "application/json")
        .header("X-Authorization", token.as_str())
        .body(Body::from(json!({"action": "validate"}).to_string()))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["user"]["id"], id);
}

#[tokio::test]
async fn test_validate_requires_token() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        create_json_request("POST", "/api/auth", None, Some(json!({"action": "validate"}))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Token required");
}

#[tokio::test]
async fn test_validate_garbage_token() {
    let app = create_router_for_testing();

    for garbage in ["nope", "Bearer", "%%%%", "a.b.c", &"x".repeat(500)] {
        let (status, json) = validate(&app, garbage).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{garbage}");
        assert_eq!(json["message"], "Invalid or expired token");
    }
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let app = create_router_for_testing();
    let (_, token) = register_user(&app, "ana@x.com", "farmer").await;

    let (status, json) = send(
        &app,
        create_json_request("POST", "/api/auth", Some(&token), Some(json!({"action": "logout"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Logout successful");

    let (status, _) = validate(&app, &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Repeating the logout still succeeds
    let (status, _) = send(
        &app,
        create_json_request("POST", "/api/auth", Some(&token), Some(json!({"action": "logout"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_logout_without_token() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        create_json_request("POST", "/api/auth", None, Some(json!({"action": "logout"}))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
}

#[tokio::test]
async fn test_header_credential_beats_body_token() {
    let app = create_router_for_testing();
    let (_, header_token) = register_user(&app, "ana@x.com", "farmer").await;
    let (_, body_token) = register_user(&app, "ben@x.com", "buyer").await;

    let (status, _) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth",
            Some(&header_token),
            Some(json!({"action": "logout", "token": body_token})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(validate(&app, &header_token).await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(validate(&app, &body_token).await.0, StatusCode::OK);
}

#[tokio::test]
async fn test_body_token_authenticates_without_header() {
    let (app, state) = test_app();
    let (_, admin_token) = seed_admin(&app, &state, "kap@x.com").await;
    let (_, farmer_token) = register_user(&app, "ana@x.com", "farmer").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/announcements",
            None,
            Some(json!({"title": "Market day", "content": "Saturday", "token": admin_token})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");

    // A header credential wins, so the admin body token is ignored
    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/announcements",
            Some(&farmer_token),
            Some(json!({"title": "Market day", "content": "Saturday", "token": admin_token})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["message"], "Only admins can create announcements");
}

// =============================================================================
// Routing and Envelope Tests
// =============================================================================

#[tokio::test]
async fn test_unknown_action() {
    let app = create_router_for_testing();

    for body in [json!({"action": "reset"}), json!({})] {
        let (status, json) = send(&app, create_json_request("POST", "/api/auth", None, Some(body))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "Invalid action");
    }
}

#[tokio::test]
async fn test_method_not_allowed_envelope() {
    let app = create_router_for_testing();

    let (status, json) = send(&app, create_json_request("GET", "/api/auth", None, None)).await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(json, json!({"success": false, "message": "Method not allowed"}));
}

#[tokio::test]
async fn test_health_and_docs_method_not_allowed_envelope() {
    let app = create_router_for_testing();

    for (method, uri) in [
        ("POST", "/health"),
        ("DELETE", "/health"),
        ("POST", "/api-docs/openapi.json"),
    ] {
        let response = app
            .clone()
            .oneshot(create_json_request(method, uri, None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{method} {uri}");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, json!({"success": false, "message": "Method not allowed"}));
    }
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let mut config = AppConfig::default();
    config.server.max_body_size = 64;
    let (app, _state) = create_test_app(config);

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth",
            None,
            Some(json!({"action": "login", "email": "a@x.com", "password": "x".repeat(128)})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, json!({"success": false, "message": "Request body too large"}));
}

#[tokio::test]
async fn test_register_with_both_user_type_spellings() {
    let app = create_router_for_testing();
    let mut body = registration("Ana", "ana@x.com", "farmer");
    body["userType"] = json!("admin");

    let (status, json) = send(&app, create_json_request("POST", "/api/auth", None, Some(body))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Invalid JSON body");
}

#[tokio::test]
async fn test_unknown_route_envelope() {
    let app = create_router_for_testing();

    let (status, json) = send(&app, create_json_request("GET", "/api/listings", None, None)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_invalid_json_body() {
    let app = create_router_for_testing();

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth")
        .header("Content-Type", "application/json")
        .body(Body::from("{\"action\": \"login\","))
        .unwrap();
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Invalid JSON body");
}

// =============================================================================
// Admin User Management Tests
// =============================================================================

#[tokio::test]
async fn test_admin_endpoint_requires_admin() {
    let app = create_router_for_testing();
    let (_, farmer_token) = register_user(&app, "ana@x.com", "farmer").await;

    let (status, json) = send(&app, create_json_request("GET", "/api/admin/users", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Authentication required");

    let (status, json) = send(
        &app,
        create_json_request("GET", "/api/admin/users", Some(&farmer_token), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["message"], "Admin access required");
}

#[tokio::test]
async fn test_admin_list_and_count_users() {
    let (app, state) = test_app();
    let (_, admin_token) = seed_admin(&app, &state, "kap@x.com").await;
    register_user(&app, "ana@x.com", "farmer").await;
    let (ben, _) = register_user(&app, "ben@x.com", "farmer").await;
    register_user(&app, "cy@x.com", "buyer").await;

    state
        .users
        .update_user(
            ben,
            &UserUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (status, json) = send(
        &app,
        create_json_request("GET", "/api/admin/users", Some(&admin_token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Users retrieved successfully");
    assert_eq!(json["data"]["total"], 4);
    assert_eq!(json["data"]["limit"], 20);
    assert_eq!(json["data"]["offset"], 0);
    assert_eq!(json["data"]["users"].as_array().unwrap().len(), 4);
    assert!(!json.to_string().contains("password"));

    let (_, json) = send(
        &app,
        create_json_request(
            "GET",
            "/api/admin/users?user_type=farmer&limit=1",
            Some(&admin_token),
            None,
        ),
    )
    .await;
    assert_eq!(json["data"]["total"], 2);
    assert_eq!(json["data"]["users"].as_array().unwrap().len(), 1);

    let (status, json) = send(
        &app,
        create_json_request(
            "GET",
            "/api/admin/users?count_only=true&user_type=farmer",
            Some(&admin_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "User count retrieved");
    assert_eq!(json["data"]["count"], 1);

    let (status, json) = send(
        &app,
        create_json_request("GET", "/api/admin/users?user_type=seller", Some(&admin_token), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Invalid user type");
}

#[tokio::test]
async fn test_admin_verifies_user() {
    let (app, state) = test_app();
    let (admin_id, admin_token) = seed_admin(&app, &state, "kap@x.com").await;
    let (farmer_id, _) = register_user(&app, "ana@x.com", "farmer").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "PUT",
            "/api/admin/users",
            Some(&admin_token),
            Some(json!({"id": farmer_id, "is_verified": true, "verification_notes": "Checked ID"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["message"], "User updated successfully");
    assert_eq!(json["data"]["user"]["is_verified"], true);
    assert_eq!(json["data"]["user"]["verified_by"], admin_id);
    assert!(json["data"]["user"]["verification_date"].is_string());
    assert_eq!(json["data"]["user"]["verification_notes"], "Checked ID");
}

#[tokio::test]
async fn test_admin_update_errors() {
    let (app, state) = test_app();
    let (admin_id, admin_token) = seed_admin(&app, &state, "kap@x.com").await;
    let (farmer_id, _) = register_user(&app, "ana@x.com", "farmer").await;
    register_user(&app, "ben@x.com", "buyer").await;

    let cases = [
        (json!({"is_verified": true}), StatusCode::BAD_REQUEST, "User ID required"),
        (json!({"id": 9999, "name": "X"}), StatusCode::NOT_FOUND, "User not found"),
        (
            json!({"id": farmer_id, "user_type": "admin", "password": "x"}),
            StatusCode::BAD_REQUEST,
            "No fields to update",
        ),
        (
            json!({"id": farmer_id, "email": "BEN@x.com"}),
            StatusCode::BAD_REQUEST,
            "Email already registered",
        ),
        (
            json!({"id": admin_id, "is_verified": false}),
            StatusCode::BAD_REQUEST,
            "Cannot change your own verification or active status",
        ),
    ];

    for (body, expected_status, expected_message) in cases {
        let (status, json) = send(
            &app,
            create_json_request("PUT", "/api/admin/users", Some(&admin_token), Some(body)),
        )
        .await;
        assert_eq!(status, expected_status, "{json}");
        assert_eq!(json["message"], expected_message);
    }
}

#[tokio::test]
async fn test_admin_soft_deletes_user() {
    let (app, state) = test_app();
    let (admin_id, admin_token) = seed_admin(&app, &state, "kap@x.com").await;
    let (farmer_id, farmer_token) = register_user(&app, "ana@x.com", "farmer").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "DELETE",
            &format!("/api/admin/users?id={admin_id}"),
            Some(&admin_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Cannot delete your own account");

    let (status, json) = send(
        &app,
        create_json_request("DELETE", "/api/admin/users", Some(&admin_token), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "User ID required");

    let (status, json) = send(
        &app,
        create_json_request("DELETE", "/api/admin/users?id=9999", Some(&admin_token), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "User not found");

    let (status, json) = send(
        &app,
        create_json_request(
            "DELETE",
            &format!("/api/admin/users?id={farmer_id}"),
            Some(&admin_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "User deleted successfully");

    // The row remains but the account is unusable
    let stored = state.users.find_by_id(farmer_id).await.unwrap().unwrap();
    assert!(!stored.is_active);
    assert_eq!(validate(&app, &farmer_token).await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(login(&app, "ana@x.com", PASSWORD).await.0, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Announcement Tests
// =============================================================================

#[tokio::test]
async fn test_announcements_lifecycle() {
    let (app, state) = test_app();
    let (_, author) = seed_admin(&app, &state, "kap@x.com").await;
    let (_, other_admin) = seed_admin(&app, &state, "sec@x.com").await;

    let (status, json) = send(&app, create_json_request("GET", "/api/announcements", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total"], 0);

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/announcements",
            Some(&author),
            Some(json!({"title": "Fertilizer subsidy", "content": "Bring your ID"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["message"], "Announcement created successfully");
    let routine_id = json["data"]["announcement"]["id"].as_i64().unwrap();

    let (_, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/announcements",
            Some(&author),
            Some(json!({"title": "Typhoon warning", "content": "Harvest early", "is_important": true})),
        ),
    )
    .await;
    let urgent_id = json["data"]["announcement"]["id"].as_i64().unwrap();

    let (_, json) = send(&app, create_json_request("GET", "/api/announcements", None, None)).await;
    assert_eq!(json["message"], "Announcements retrieved successfully");
    assert_eq!(json["data"]["total"], 2);
    assert_eq!(json["data"]["announcements"][0]["id"], urgent_id);
    assert_eq!(json["data"]["announcements"][0]["admin_name"], "Kapitan");

    let (_, json) = send(
        &app,
        create_json_request("GET", "/api/announcements?important=1", None, None),
    )
    .await;
    assert_eq!(json["data"]["total"], 1);

    // Only the author may edit
    let (status, json) = send(
        &app,
        create_json_request(
            "PUT",
            "/api/announcements",
            Some(&other_admin),
            Some(json!({"id": routine_id, "title": "Hijacked"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "Announcement not found or access denied");

    let (status, json) = send(
        &app,
        create_json_request(
            "PUT",
            "/api/announcements",
            Some(&author),
            Some(json!({"id": routine_id})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "No fields to update");

    let (status, json) = send(
        &app,
        create_json_request(
            "PUT",
            "/api/announcements",
            Some(&author),
            Some(json!({"id": routine_id, "is_important": true})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Announcement updated successfully");
    assert_eq!(json["data"]["announcement"]["is_important"], true);

    let (status, _) = send(
        &app,
        create_json_request(
            "DELETE",
            &format!("/api/announcements?id={urgent_id}"),
            Some(&other_admin),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = send(
        &app,
        create_json_request(
            "DELETE",
            &format!("/api/announcements?id={urgent_id}"),
            Some(&author),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Announcement deleted successfully");

    let (_, json) = send(&app, create_json_request("GET", "/api/announcements", None, None)).await;
    assert_eq!(json["data"]["total"], 1);
}

#[tokio::test]
async fn test_announcement_authoring_requires_admin() {
    let (app, state) = test_app();
    let (_, admin_token) = seed_admin(&app, &state, "kap@x.com").await;
    let (_, farmer_token) = register_user(&app, "ana@x.com", "farmer").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/announcements",
            None,
            Some(json!({"title": "t", "content": "c"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Authentication required");

    let (status, json) = send(
        &app,
        create_json_request(
            "DELETE",
            "/api/announcements?id=1",
            Some(&farmer_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["message"], "Only admins can delete announcements");

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/announcements",
            Some(&admin_token),
            Some(json!({"title": "Only a title"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Missing required fields: content");
}

// =============================================================================
// Message Tests
// =============================================================================

#[tokio::test]
async fn test_messages_require_authentication() {
    let app = create_router_for_testing();

    for (method, body) in [
        ("GET", None),
        ("POST", Some(json!({"receiver_id": 1, "message": "hi"}))),
        ("PUT", Some(json!({"message_id": 1}))),
    ] {
        let (status, json) =
            send(&app, create_json_request(method, "/api/messages", None, body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method}");
        assert_eq!(json["message"], "Authentication required");
    }

    let (status, _) = send(&app, create_json_request("DELETE", "/api/messages", None, None)).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_message_conversation_and_read_receipt() {
    let (app, _state) = test_app();
    let (farmer_id, farmer_token) = register_user(&app, "farmer@x.com", "farmer").await;
    let (buyer_id, buyer_token) = register_user(&app, "buyer@x.com", "buyer").await;
    let (_, other_token) = register_user(&app, "other@x.com", "buyer").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/messages",
            Some(&buyer_token),
            Some(json!({"receiver_id": farmer_id, "message": "  Is the rice still available?  "})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["message"], "Message sent successfully");
    let sent = &json["data"]["message"];
    assert_eq!(sent["sender_id"], buyer_id);
    assert_eq!(sent["receiver_id"], farmer_id);
    assert_eq!(sent["message"], "Is the rice still available?");
    assert_eq!(sent["is_read"], false);
    let message_id = sent["id"].as_i64().unwrap();

    send(
        &app,
        create_json_request(
            "POST",
            "/api/messages",
            Some(&farmer_token),
            Some(json!({"receiver_id": buyer_id, "message": "Yes, 20 sacks"})),
        ),
    )
    .await;

    let uri = format!("/api/messages?conversation_with={buyer_id}");
    let (status, json) = send(&app, create_json_request("GET", &uri, Some(&farmer_token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Messages retrieved successfully");
    let messages = json["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["message"], "Yes, 20 sacks");
    assert_eq!(json["data"]["limit"], 20);

    // A bystander sees nothing
    let (_, json) = send(&app, create_json_request("GET", "/api/messages", Some(&other_token), None)).await;
    assert_eq!(json["data"]["messages"], json!([]));

    // Neither the sender nor a bystander can mark it read
    for token in [buyer_token.as_str(), other_token.as_str()] {
        let (status, json) = send(
            &app,
            create_json_request(
                "PUT",
                "/api/messages",
                Some(token),
                Some(json!({"message_id": message_id})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["message"], "Message not found or access denied");
    }

    let (status, json) = send(
        &app,
        create_json_request(
            "PUT",
            "/api/messages",
            Some(&farmer_token),
            Some(json!({"message_id": message_id})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Message marked as read");

    let (_, json) = send(&app, create_json_request("GET", &uri, Some(&farmer_token), None)).await;
    let received = json["data"]["messages"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["id"] == message_id)
        .unwrap()
        .clone();
    assert_eq!(received["is_read"], true);

    let (status, json) = send(
        &app,
        create_json_request("PUT", "/api/messages", Some(&farmer_token), Some(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Message ID required");
}

#[tokio::test]
async fn test_message_receiver_rules() {
    let (app, state) = test_app();
    let (buyer_id, buyer_token) = register_user(&app, "buyer@x.com", "buyer").await;
    let (farmer_id, _) = register_user(&app, "farmer@x.com", "farmer").await;

    let post = |body: Value| create_json_request("POST", "/api/messages", Some(&buyer_token), Some(body));

    let (status, json) = send(&app, post(json!({"message": "hello"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Missing required fields: receiver_id");

    let (status, json) = send(&app, post(json!({"receiver_id": farmer_id, "message": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Missing required fields: message");

    let (status, json) = send(&app, post(json!({"receiver_id": buyer_id, "message": "hi me"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Cannot send message to yourself");

    let (status, json) = send(&app, post(json!({"receiver_id": 9999, "message": "hello"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "Receiver not found");

    // A soft-deleted account is never a message target
    state
        .users
        .update_user(
            farmer_id,
            &UserUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (status, json) = send(&app, post(json!({"receiver_id": farmer_id, "message": "hello"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "Receiver not found");
}
