use std::sync::Arc;

use axum::Router;
use axum::body::{self, Body};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use tether_db::Database;
use tether_server::build_app;
use tether_server::config::Config;

fn app() -> Router {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let config = Config {
        jwt_secret: "test-secret".into(),
        media_base_url: "https://media.example.com".into(),
        ..Config::default()
    };
    build_app(db, &config)
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Registers a user and returns (user_id, token).
async fn register(app: &Router, email: &str, nickname: &str) -> (i64, String) {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({ "email": email, "password": "correct horse", "nickname": nickname })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "register failed: {body}");
    let data = &body["data"];
    (data["user_id"].as_i64().unwrap(), data["token"].as_str().unwrap().to_string())
}

async fn befriend(app: &Router, a_token: &str, b_email: &str, b_token: &str) {
    let (status, body) = call(app, Method::POST, "/api/v1/friends/requests", Some(a_token), Some(json!({ "email": b_email }))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let request_id = body["data"]["id"].as_i64().unwrap();

    let uri = format!("/api/v1/friends/requests/{request_id}/accept");
    let (status, _) = call(app, Method::POST, &uri, Some(b_token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_is_public() {
    let app = app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_routes_require_token() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/api/v1/friends", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);
    assert_eq!(body["kind"], "unauthorized");

    let (status, _) = call(&app, Method::GET, "/api/v1/friends", Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_checks_password() {
    let app = app();
    let (user_id, _) = register(&app, "Ann@Example.com", "Ann").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "ann@example.com", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user_id"], user_id);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "ann@example.com", "password": "wrong password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({ "email": "ann@example.com", "password": "another one" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");
}

#[tokio::test]
async fn friend_and_chat_flow() {
    let app = app();
    let (a, a_token) = register(&app, "a@example.com", "A").await;
    let (b, b_token) = register(&app, "b@example.com", "B").await;

    let (status, body) = call(&app, Method::GET, "/api/v1/chat/history/2", Some(&a_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 0);

    befriend(&app, &a_token, "b@example.com", &b_token).await;

    let (status, body) = call(&app, Method::GET, "/api/v1/friends", Some(&a_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 200);
    assert_eq!(body["message"], "success");
    assert_eq!(body["data"]["items"][0]["id"], b);
    assert_eq!(body["data"]["items"][0]["nickname"], "B");

    let (_, body) = call(&app, Method::GET, "/api/v1/friends/ids", Some(&b_token), None).await;
    assert_eq!(body["data"]["items"], json!([a]));

    // Messages are sent over the gateway; the REST side reads and marks them.
    let uri = format!("/api/v1/chat/history/{b}?page=0&page_size=500");
    let (status, body) = call(&app, Method::GET, &uri, Some(&a_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["page"], 1);
    assert_eq!(body["data"]["page_size"], 20);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/chat/read",
        Some(&b_token),
        Some(json!({ "peer_id": a.to_string(), "before_id": 100.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["updated"], 0);

    let uri = format!("/api/v1/friends/{b}");
    let (status, _) = call(&app, Method::DELETE, &uri, Some(&a_token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call(&app, Method::GET, "/api/v1/friends", Some(&a_token), None).await;
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn friend_request_errors_use_envelope() {
    let app = app();
    let (_, a_token) = register(&app, "a@example.com", "A").await;
    let (_, c_token) = register(&app, "c@example.com", "C").await;
    register(&app, "b@example.com", "B").await;

    let (status, body) = call(&app, Method::POST, "/api/v1/friends/requests", Some(&a_token), Some(json!({ "email": "nobody@example.com" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");

    let (_, body) = call(&app, Method::POST, "/api/v1/friends/requests", Some(&a_token), Some(json!({ "email": "b@example.com" }))).await;
    let request_id = body["data"]["id"].as_i64().unwrap();

    // Only the addressee may accept.
    let uri = format!("/api/v1/friends/requests/{request_id}/accept");
    let (status, body) = call(&app, Method::POST, &uri, Some(&c_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "permission_denied");

    let (status, body) = call(&app, Method::POST, "/api/v1/friends/requests", Some(&a_token), Some(json!({ "wrong": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_params");
}

#[tokio::test]
async fn group_lifecycle() {
    let app = app();
    let (owner, owner_token) = register(&app, "owner@example.com", "Owner").await;
    let (m1, m1_token) = register(&app, "m1@example.com", "M1").await;
    let (m2, _) = register(&app, "m2@example.com", "M2").await;
    let (outsider, outsider_token) = register(&app, "out@example.com", "Out").await;

    // Too few members once the owner is counted.
    let (status, _) = call(&app, Method::POST, "/api/v1/groups", Some(&owner_token), Some(json!({ "name": "duo", "member_ids": [m1] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/groups",
        Some(&owner_token),
        Some(json!({ "name": " Hikers ", "member_ids": [m1, m2.to_string()] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let group_id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(body["data"]["name"], "Hikers");
    assert_eq!(body["data"]["owner_id"], owner);

    // Non-members cannot read messages or members.
    let uri = format!("/api/v1/groups/{group_id}/messages");
    let (status, body) = call(&app, Method::GET, &uri, Some(&outsider_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "not_a_member");

    // Only the owner manages members.
    let uri = format!("/api/v1/groups/{group_id}/members");
    let (status, _) = call(&app, Method::POST, &uri, Some(&m1_token), Some(json!({ "user_ids": [outsider] }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = call(&app, Method::POST, &uri, Some(&owner_token), Some(json!({ "user_ids": [outsider] }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 4);

    let uri = format!("/api/v1/groups/{group_id}/members/{owner}");
    let (status, _) = call(&app, Method::DELETE, &uri, Some(&owner_token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let uri = format!("/api/v1/groups/{group_id}/members/{outsider}");
    let (status, _) = call(&app, Method::DELETE, &uri, Some(&owner_token), None).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/api/v1/groups/{group_id}");
    let (status, body) = call(&app, Method::PUT, &uri, Some(&owner_token), Some(json!({ "name": "Trail Crew", "avatar": "g/1.png" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Trail Crew");
    let (status, _) = call(&app, Method::PUT, &uri, Some(&m1_token), Some(json!({ "name": "Mine" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = call(&app, Method::GET, "/api/v1/groups/search?q=trail", Some(&outsider_token), None).await;
    assert_eq!(body["data"][0]["id"], group_id);

    // Open join, then the member views are available.
    let uri = format!("/api/v1/groups/{group_id}/join");
    let (status, _) = call(&app, Method::POST, &uri, Some(&outsider_token), None).await;
    assert_eq!(status, StatusCode::OK);
    let uri = format!("/api/v1/groups/{group_id}/unread");
    let (status, body) = call(&app, Method::GET, &uri, Some(&outsider_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["unread"], 0);

    let (_, body) = call(&app, Method::GET, "/api/v1/groups", Some(&m1_token), None).await;
    assert_eq!(body["data"]["total"], 1);

    let (_, body) = call(&app, Method::GET, "/api/v1/chat/conversations", Some(&m1_token), None).await;
    assert_eq!(body["data"]["total"], 0);
    assert_eq!(body["data"]["group_total"], 1);
    assert_eq!(body["data"]["items"][0]["type"], "group");
    assert_eq!(body["data"]["items"][0]["group"]["id"], group_id);

    let (status, _) = call(&app, Method::GET, "/api/v1/groups/9999", Some(&m1_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn members_carry_roles_and_profiles() {
    let app = app();
    let (owner, owner_token) = register(&app, "owner@example.com", "Owner").await;
    let (m1, _) = register(&app, "m1@example.com", "M1").await;
    let (m2, _) = register(&app, "m2@example.com", "M2").await;

    let (_, body) = call(&app, Method::POST, "/api/v1/groups", Some(&owner_token), Some(json!({ "name": "g", "member_ids": [m1, m2] }))).await;
    let group_id = body["data"]["id"].as_i64().unwrap();

    let uri = format!("/api/v1/groups/{group_id}/members");
    let (status, body) = call(&app, Method::GET, &uri, Some(&owner_token), None).await;
    assert_eq!(status, StatusCode::OK);
    let owner_view = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["user_id"] == owner)
        .unwrap()
        .clone();
    assert_eq!(owner_view["role"], "owner");
    // Empty avatars stay empty.
    assert_eq!(owner_view["profile"]["avatar"], "");
}
