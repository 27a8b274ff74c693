mod admin;
mod auth;
mod error;
mod sessions;

use axum::Router;
use std::sync::Arc;

use crate::auth::{CookiePolicy, RefreshCoordinator};
use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::rate_limit::LoginRateLimit;

pub use error::{ApiError, ResultExt};

/// Create the API router.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    cookies: CookiePolicy,
    trust_proxy: bool,
    login_limit: LoginRateLimit,
) -> Router {
    let auth_state = auth::AuthState {
        db: db.clone(),
        jwt: jwt.clone(),
        coordinator: RefreshCoordinator::new(db.clone(), jwt.clone()),
        cookies,
        trust_proxy,
    };

    let sessions_state = sessions::SessionsState {
        db: db.clone(),
        jwt: jwt.clone(),
    };

    let admin_state = admin::AdminState { db, jwt };

    Router::new()
        .nest("/auth", auth::router(auth_state, login_limit))
        .nest("/sessions", sessions::router(sessions_state))
        .nest("/admin", admin::router(admin_state))
}
