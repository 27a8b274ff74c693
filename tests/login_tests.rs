//! Tests for the login endpoint.

mod common;

use axum::http::StatusCode;
use common::{
    ADMIN_EMAIL, ADMIN_PASSWORD, body_json, create_test_app, extract_set_cookies, login_request,
    seed_admin, seed_user,
};
use tower::ServiceExt;

#[tokio::test]
async fn test_admin_login() {
    let (app, db) = create_test_app().await;
    let admin_id = seed_admin(&db).await;

    let response = app
        .oneshot(login_request(ADMIN_EMAIL, ADMIN_PASSWORD))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = extract_set_cookies(&response);
    let refresh = cookies
        .iter()
        .find(|c| c.starts_with("refreshToken="))
        .expect("Refresh cookie not set");
    assert!(refresh.contains("HttpOnly"));
    assert!(refresh.contains("Path=/"));
    assert!(refresh.contains("SameSite=Lax"));
    assert!(refresh.contains("Max-Age=28800"));
    assert!(!refresh.contains("Secure"));

    let body = body_json(response).await;
    assert!(body["accessToken"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["user"]["id"], admin_id);
    assert_eq!(body["user"]["email"], ADMIN_EMAIL);
    assert_eq!(body["user"]["nombre"], "Admin");
    assert_eq!(body["user"]["isAdmin"], true);
    assert!(body["user"].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_login_email_is_case_insensitive() {
    let (app, db) = create_test_app().await;
    seed_admin(&db).await;

    let response = app
        .oneshot(login_request("ADMIN@Example.com", ADMIN_PASSWORD))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_wrong_password() {
    let (app, db) = create_test_app().await;
    seed_admin(&db).await;

    let response = app
        .oneshot(login_request(ADMIN_EMAIL, "Contraseña999@"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(extract_set_cookies(&response).is_empty());

    let body = body_json(response).await;
    assert_eq!(body["code"], "invalid_credentials");
}

#[tokio::test]
async fn test_unknown_email_looks_like_wrong_password() {
    let (app, db) = create_test_app().await;
    seed_admin(&db).await;

    let response = app
        .oneshot(login_request("nadie@example.com", ADMIN_PASSWORD))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "invalid_credentials");
}

#[tokio::test]
async fn test_unverified_user_rejected() {
    let (app, db) = create_test_app().await;
    seed_user(&db, "Luis", "luis@example.com", "Secreto123!", false, false).await;

    let response = app
        .oneshot(login_request("luis@example.com", "Secreto123!"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["code"], "unverified");

    let sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(sessions, 0);
}

#[tokio::test]
async fn test_missing_fields_rejected() {
    let (app, db) = create_test_app().await;
    seed_admin(&db).await;

    let response = app.oneshot(login_request("", "")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_each_login_opens_a_session() {
    let (app, db) = create_test_app().await;
    let admin_id = seed_admin(&db).await;

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(login_request(ADMIN_EMAIL, ADMIN_PASSWORD))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let sessions = db.sessions().list_for_user(admin_id).await.unwrap();
    assert_eq!(sessions.len(), 3);
}

#[tokio::test]
async fn test_device_info_from_body_or_user_agent() {
    let (app, db) = create_test_app().await;
    let admin_id = seed_admin(&db).await;

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(
            serde_json::json!({
                "email": ADMIN_EMAIL,
                "password": ADMIN_PASSWORD,
                "deviceInfo": "Portátil de casa",
            })
            .to_string(),
        ))
        .unwrap();
    app.clone().oneshot(request).await.unwrap();

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .header(
            "user-agent",
            "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
        )
        .body(axum::body::Body::from(
            serde_json::json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }).to_string(),
        ))
        .unwrap();
    app.oneshot(request).await.unwrap();

    let mut devices: Vec<String> = db
        .sessions()
        .list_for_user(admin_id)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|s| s.device_info)
        .collect();
    devices.sort();
    assert_eq!(devices, vec!["Firefox en Linux", "Portátil de casa"]);
}

#[tokio::test]
async fn test_login_rate_limited() {
    let db = sessionguard::db::Database::open(":memory:").await.unwrap();
    seed_admin(&db).await;
    let mut config = common::test_config(db);
    config.login_rate_per_minute = 2;
    let app = sessionguard::create_app(&config);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(login_request(ADMIN_EMAIL, "Incorrecta1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app
        .oneshot(login_request(ADMIN_EMAIL, ADMIN_PASSWORD))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_production_cookie_attributes() {
    let db = sessionguard::db::Database::open(":memory:").await.unwrap();
    seed_admin(&db).await;
    let mut config = common::test_config(db);
    config.environment = sessionguard::cli::Environment::Production;
    let app = sessionguard::create_app(&config);

    let response = app
        .oneshot(login_request(ADMIN_EMAIL, ADMIN_PASSWORD))
        .await
        .unwrap();
    let cookies = extract_set_cookies(&response);
    let refresh = cookies
        .iter()
        .find(|c| c.starts_with("refreshToken="))
        .unwrap();
    assert!(refresh.contains("SameSite=None"));
    assert!(refresh.contains("Secure"));
    assert!(refresh.contains("HttpOnly"));
}
