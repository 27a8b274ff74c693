#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use sessionguard::{ServerConfig, cli::Environment, create_app, db::Database};
use tower::ServiceExt;

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-0123456789abcdef";

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "Contraseña123@";

pub fn test_config(db: Database) -> ServerConfig {
    ServerConfig {
        db,
        access_secret: ACCESS_SECRET.to_vec(),
        refresh_secret: REFRESH_SECRET.to_vec(),
        access_ttl: 900,
        refresh_ttl: 28800,
        environment: Environment::Development,
        trust_proxy: false,
        login_rate_per_minute: 1000,
    }
}

/// Create a test app over an in-memory database and return (app, db).
pub async fn create_test_app() -> (Router, Database) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    (create_app(&test_config(db.clone())), db)
}

/// Create a user with a low-cost bcrypt hash. Returns the user ID.
pub async fn seed_user(
    db: &Database,
    nombre: &str,
    email: &str,
    password: &str,
    is_admin: bool,
    verified: bool,
) -> i64 {
    let hash = bcrypt::hash(password, 4).expect("Failed to hash password");
    db.users()
        .create(nombre, email, &hash, is_admin, verified)
        .await
        .expect("Failed to create user")
}

pub async fn seed_admin(db: &Database) -> i64 {
    seed_user(db, "Admin", ADMIN_EMAIL, ADMIN_PASSWORD, true, true).await
}

pub fn login_request(email: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "email": email, "password": password }).to_string(),
        ))
        .unwrap()
}

pub fn refresh_request(refresh_token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/api/auth/refresh");
    if let Some(token) = refresh_token {
        builder = builder.header(header::COOKIE, format!("refreshToken={}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn logout_request(refresh_token: Option<&str>, access_token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/api/auth/logout");
    if let Some(token) = refresh_token {
        builder = builder.header(header::COOKIE, format!("refreshToken={}", token));
    }
    if let Some(token) = access_token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn bearer_request(method: &str, uri: &str, access_token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
        .body(Body::empty())
        .unwrap()
}

/// Helper to extract all Set-Cookie headers from a response.
pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Value of the refreshToken cookie set by a response, if any.
pub fn refresh_cookie_value(response: &Response<Body>) -> Option<String> {
    extract_set_cookies(response).iter().find_map(|c| {
        let value = c.strip_prefix("refreshToken=")?.split(';').next()?;
        (!value.is_empty()).then(|| value.to_string())
    })
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Log in and return (access_token, refresh_token).
pub async fn login(app: &Router, email: &str, password: &str) -> (String, String) {
    let response = app.clone().oneshot(login_request(email, password)).await.unwrap();
    assert!(response.status().is_success(), "login failed: {}", response.status());
    let refresh = refresh_cookie_value(&response).expect("No refresh cookie");
    let body = body_json(response).await;
    let access = body["accessToken"].as_str().expect("No access token").to_string();
    (access, refresh)
}

/// SQLite file in the temp dir, removed on drop. Used where several
/// connections must write concurrently.
pub struct TempDb {
    pub path: std::path::PathBuf,
}

impl TempDb {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("sessionguard-{}.db", uuid::Uuid::new_v4()));
        Self { path }
    }

    pub async fn open(&self) -> Database {
        Database::open(self.path.to_str().unwrap())
            .await
            .expect("Failed to open temp database")
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let mut path = self.path.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}
