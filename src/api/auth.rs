//! Login and token lifecycle endpoints.
//!
//! - POST `/login` - Check credentials, open a session, set the refresh cookie
//! - POST `/refresh` - Rotate the refresh cookie and issue a new access token
//! - POST `/logout` - Close the session, revoke the bearer token, clear the cookie
//! - GET `/me` - Return the caller behind the current access token

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::{HeaderMap, header::SET_COOKIE, request::Parts},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::auth::{
    AnyRole, Auth, AuthError, CookiePolicy, IssuedSession, LoginAttempt, REFRESH_COOKIE_NAME,
    RefreshCoordinator, describe_device, extract_client_ip, extract_user_agent, get_bearer_token,
    get_cookie,
};
use crate::db::{Database, User};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::rate_limit::{LoginRateLimit, rate_limit_login};

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub coordinator: RefreshCoordinator,
    pub cookies: CookiePolicy,
    pub trust_proxy: bool,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState, login_limit: LoginRateLimit) -> Router {
    let login = Router::new()
        .route("/login", post(login))
        .route_layer(middleware::from_fn_with_state(login_limit, rate_limit_login));

    Router::new()
        .merge(login)
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .with_state(state)
}

/// Peer address and user agent of the caller.
struct ClientMeta {
    ip: Option<String>,
    user_agent: Option<String>,
}

impl FromRequestParts<AuthState> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AuthState) -> Result<Self, Self::Rejection> {
        Ok(ClientMeta {
            ip: extract_client_ip(parts, state.trust_proxy),
            user_agent: extract_user_agent(parts),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    email: String,
    password: String,
    #[serde(default)]
    device_info: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserInfo {
    id: i64,
    nombre: String,
    email: String,
    is_admin: bool,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            nombre: user.nombre.clone(),
            email: user.email.clone(),
            is_admin: user.is_admin,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    /// Access token lifetime in seconds
    expires_in: u64,
    user: UserInfo,
}

fn issued_response(cookies: &CookiePolicy, issued: &IssuedSession) -> Response {
    let cookie = cookies.refresh_cookie(&issued.refresh.token, issued.refresh.duration);
    (
        [(SET_COOKIE, cookie)],
        Json(TokenResponse {
            access_token: issued.access.token.clone(),
            expires_in: issued.access.duration,
            user: UserInfo::from(&issued.user),
        }),
    )
        .into_response()
}

async fn login(
    State(state): State<AuthState>,
    meta: ClientMeta,
    Json(body): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("Email y contraseña son requeridos"));
    }

    let device_info = body
        .device_info
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| d.chars().take(255).collect::<String>())
        .or_else(|| meta.user_agent.as_deref().map(describe_device));

    let issued = state
        .coordinator
        .login(LoginAttempt {
            email: &body.email,
            password: &body.password,
            device_info: device_info.as_deref(),
            ip_address: meta.ip.as_deref(),
            user_agent: meta.user_agent.as_deref(),
        })
        .await?;

    Ok(issued_response(&state.cookies, &issued))
}

/// Rotate the refresh cookie. A rejected token also clears the cookie so the
/// browser stops presenting it.
async fn refresh(State(state): State<AuthState>, meta: ClientMeta, headers: HeaderMap) -> Response {
    let presented = get_cookie(&headers, REFRESH_COOKIE_NAME);

    match state.coordinator.refresh(presented, meta.ip.as_deref()).await {
        Ok(issued) => issued_response(&state.cookies, &issued),
        Err(e) if e.is_terminal() => {
            ([(SET_COOKIE, state.cookies.clear_refresh_cookie())], e).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Close the current session. The cookie is cleared whatever the outcome.
async fn logout(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    let result = state
        .coordinator
        .logout(
            get_cookie(&headers, REFRESH_COOKIE_NAME),
            get_bearer_token(&headers),
        )
        .await;

    let clear = [(SET_COOKIE, state.cookies.clear_refresh_cookie())];
    match result {
        Ok(()) => (clear, Json(serde_json::json!({ "message": "Sesión cerrada" }))).into_response(),
        Err(e) => (clear, e).into_response(),
    }
}

async fn me(State(state): State<AuthState>, auth: Auth<AnyRole>) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state
        .db
        .users()
        .find_by_id(auth.user().user_id)
        .await
        .map_err(AuthError::from)?
        .ok_or(AuthError::SessionRevoked)?;

    Ok(Json(serde_json::json!({ "user": UserInfo::from(&user) })))
}
