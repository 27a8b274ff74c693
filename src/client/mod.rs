//! HTTP client for the session API.
//!
//! Holds the access token in memory and the refresh cookie in a private jar
//! that no public method exposes. Every request carries the bearer token; a
//! 401 triggers one shared refresh and a single retry. Terminal rejections
//! end the session and are published on a watch channel so the UI can send
//! the user back to the login screen.

mod error;
pub mod single_flight;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, COOKIE, HeaderMap, SET_COOKIE};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;

pub use error::{ClientError, LogoutReason, RefreshError};
pub use single_flight::{DEFAULT_REFRESH_TIMEOUT, RefreshGuard};

use crate::auth::REFRESH_COOKIE_NAME;

/// Logged-in user as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientUser {
    pub id: i64,
    pub nombre: String,
    pub email: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated { user: ClientUser },
    LoggedOut { reason: LogoutReason },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBody {
    access_token: String,
    user: ClientUser,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Buffered response of an intercepted request.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// The `code` field of an error body, if any.
    pub fn error_code(&self) -> Option<String> {
        serde_json::from_slice::<ErrorBody>(&self.body)
            .ok()
            .and_then(|b| b.code)
    }
}

struct Inner {
    http: reqwest::Client,
    base: Url,
    access_token: RwLock<Option<String>>,
    refresh_cookie: Mutex<Option<String>>,
    /// Bumped whenever local credentials are dropped. A refresh that started
    /// under an older value must not bring them back.
    epoch: AtomicU64,
    guard: RefreshGuard,
    state: watch::Sender<SessionState>,
}

#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_refresh_timeout(base_url, DEFAULT_REFRESH_TIMEOUT)
    }

    pub fn with_refresh_timeout(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let (state, _) = watch::channel(SessionState::Anonymous);
        Ok(Self {
            inner: Arc::new(Inner {
                http: reqwest::Client::new(),
                base: Url::parse(base_url)?,
                access_token: RwLock::new(None),
                refresh_cookie: Mutex::new(None),
                epoch: AtomicU64::new(0),
                guard: RefreshGuard::new(timeout),
                state,
            }),
        })
    }

    /// Watch session state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.access_token()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state(), SessionState::Authenticated { .. })
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device_info: Option<&str>,
    ) -> Result<ClientUser, ClientError> {
        let mut body = serde_json::json!({ "email": email, "password": password });
        if let Some(device) = device_info {
            body["deviceInfo"] = serde_json::Value::from(device);
        }

        let response = self
            .inner
            .http
            .post(self.inner.url("/api/auth/login")?)
            .json(&body)
            .send()
            .await?;
        self.inner.absorb_cookies(response.headers());

        let status = response.status();
        if !status.is_success() {
            let err: ErrorBody = response.json().await.unwrap_or_default();
            return Err(ClientError::Api {
                status,
                code: err.code,
                message: err.error.unwrap_or_default(),
            });
        }

        let token: TokenBody = response.json().await?;
        self.inner.set_authenticated(token.access_token, token.user.clone());
        Ok(token.user)
    }

    /// Refresh now, joining any refresh already in flight.
    pub async fn refresh(&self) -> Result<String, RefreshError> {
        let result = self.inner.refresh_after(None).await;
        if let Err(e) = &result {
            if e.is_terminal() {
                self.inner.force_logout(e.logout_reason());
            }
        }
        result
    }

    /// Close the session on the server. Local state is cleared before the
    /// request is sent, so the client is logged out even when the server call
    /// fails.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let (token, cookie) = self.inner.take_local();
        self.inner.publish(SessionState::LoggedOut {
            reason: LogoutReason::UserRequested,
        });

        let mut request = self.inner.http.post(self.inner.url("/api/auth/logout")?);
        if let Some(cookie) = &cookie {
            request = request.header(COOKIE, format!("{}={}", REFRESH_COOKIE_NAME, cookie));
        }
        if let Some(token) = &token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let err: ErrorBody = response.json().await.unwrap_or_default();
            return Err(ClientError::Api {
                status,
                code: err.code,
                message: err.error.unwrap_or_default(),
            });
        }
        Ok(())
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, ClientError> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &serde_json::Value) -> Result<ApiResponse, ClientError> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ClientError> {
        self.send(Method::DELETE, path, None).await
    }

    /// GET and decode a successful JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.get(path).await?;
        if !response.is_success() {
            let err: ErrorBody = serde_json::from_slice(&response.body).unwrap_or_default();
            return Err(ClientError::Api {
                status: response.status,
                code: err.code,
                message: err.error.unwrap_or_default(),
            });
        }
        response.json()
    }

    /// Send a request with the bearer token, refreshing once on 401.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse, ClientError> {
        let used = self.inner.access_token();
        let first = self.inner.execute(method.clone(), path, body, used.as_deref()).await?;

        let response = if first.status == StatusCode::UNAUTHORIZED {
            let fresh = match self.inner.refresh_after(used.as_deref()).await {
                Ok(token) => token,
                Err(e) if e.is_terminal() => {
                    let reason = e.logout_reason();
                    warn!(error = %e, "Refresh failed, ending session");
                    self.inner.force_logout(reason);
                    return Err(ClientError::LoggedOut(reason));
                }
                Err(e) => {
                    warn!(error = %e, "Refresh did not complete, keeping session");
                    return Err(e.into());
                }
            };

            let retried = self.inner.execute(method, path, body, Some(&fresh)).await?;
            if retried.status == StatusCode::UNAUTHORIZED {
                self.inner.force_logout(LogoutReason::Unauthorized);
                return Err(ClientError::LoggedOut(LogoutReason::Unauthorized));
            }
            retried
        } else {
            first
        };

        if response.status == StatusCode::FORBIDDEN {
            if let Some(reason) = response.error_code().as_deref().and_then(LogoutReason::from_code) {
                self.inner.force_logout(reason);
                return Err(ClientError::LoggedOut(reason));
            }
        }

        Ok(response)
    }
}

impl Inner {
    fn url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base.join(path)
    }

    fn access_token(&self) -> Option<String> {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, next: SessionState) {
        self.state.send_replace(next);
    }

    fn set_authenticated(&self, token: String, user: ClientUser) {
        *self.access_token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
        self.publish(SessionState::Authenticated { user });
    }

    /// Drop the access token and refresh cookie, returning them.
    fn take_local(&self) -> (Option<String>, Option<String>) {
        let mut access = self.access_token.write().unwrap_or_else(PoisonError::into_inner);
        let cookie = self
            .refresh_cookie
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        (access.take(), cookie)
    }

    fn clear_local(&self) {
        self.take_local();
    }

    /// Install a refreshed token unless local credentials were dropped since
    /// `epoch` was read. Holds the token lock across the check and the writes,
    /// as `take_local` does.
    fn accept_refresh(
        &self,
        epoch: u64,
        token: String,
        cookie: Option<Option<String>>,
        user: ClientUser,
    ) -> bool {
        let mut access = self.access_token.write().unwrap_or_else(PoisonError::into_inner);
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }
        *access = Some(token);
        if let Some(cookie) = cookie {
            *self.refresh_cookie.lock().unwrap_or_else(PoisonError::into_inner) = cookie;
        }
        self.publish(SessionState::Authenticated { user });
        true
    }

    /// Drop local credentials. Only the first of several concurrent calls
    /// notifies subscribers.
    fn force_logout(&self, reason: LogoutReason) {
        self.clear_local();
        self.state.send_if_modified(|state| {
            if matches!(state, SessionState::LoggedOut { .. }) {
                return false;
            }
            *state = SessionState::LoggedOut { reason };
            true
        });
    }

    /// Store or clear the refresh cookie from `Set-Cookie` headers.
    fn absorb_cookies(&self, headers: &HeaderMap) {
        if let Some(cookie) = refresh_cookie_update(headers) {
            *self.refresh_cookie.lock().unwrap_or_else(PoisonError::into_inner) = cookie;
        }
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        token: Option<&str>,
    ) -> Result<ApiResponse, ClientError> {
        let mut request = self.http.request(method, self.url(path)?);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        Ok(ApiResponse { status, body })
    }

    /// Refresh unless the token has changed since `used` was read, in which
    /// case the current token is returned without calling the server.
    async fn refresh_after(self: &Arc<Self>, used: Option<&str>) -> Result<String, RefreshError> {
        let inner = self.clone();
        self.guard
            .run(
                || match (self.access_token(), used) {
                    (Some(current), Some(used)) if current != used => Some(current),
                    _ => None,
                },
                move || async move { inner.call_refresh().await },
            )
            .await
    }

    async fn call_refresh(&self) -> Result<String, RefreshError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let cookie = self
            .refresh_cookie
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(RefreshError::NoCookie)?;

        let url = self
            .url("/api/auth/refresh")
            .map_err(|e| RefreshError::Transport(e.to_string()))?;
        let response = self
            .http
            .post(url)
            .header(COOKIE, format!("{}={}", REFRESH_COOKIE_NAME, cookie))
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;
        let rotated = refresh_cookie_update(response.headers());

        let status = response.status();
        if !status.is_success() {
            if self.epoch.load(Ordering::SeqCst) == epoch {
                self.absorb_cookies(response.headers());
            }
            let err: ErrorBody = response.json().await.unwrap_or_default();
            debug!(status = %status, code = ?err.code, "Refresh rejected");
            return Err(RefreshError::Rejected {
                status,
                code: err.code,
            });
        }

        let token: TokenBody = response
            .json()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        if !self.accept_refresh(epoch, token.access_token.clone(), rotated.clone(), token.user) {
            debug!("Session ended during refresh, discarding the new tokens");
            if let Some(Some(cookie)) = rotated {
                self.close_rotated(&cookie).await;
            }
            return Err(RefreshError::Cancelled);
        }
        Ok(token.access_token)
    }

    /// Close the server session a discarded refresh rotated into, so it does
    /// not outlive the logout.
    async fn close_rotated(&self, cookie: &str) {
        let Ok(url) = self.url("/api/auth/logout") else {
            return;
        };
        let result = self
            .http
            .post(url)
            .header(COOKIE, format!("{}={}", REFRESH_COOKIE_NAME, cookie))
            .send()
            .await;
        match result {
            Ok(response) if !response.status().is_success() => {
                debug!(status = %response.status(), "Rotated session already closed");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to close session rotated after logout"),
        }
    }
}

/// The refresh cookie carried by `Set-Cookie` headers: `Some(None)` when the
/// server clears it, `None` when it is not mentioned.
fn refresh_cookie_update(headers: &HeaderMap) -> Option<Option<String>> {
    let mut update = None;
    for value in headers.get_all(SET_COOKIE) {
        let Ok(value) = value.to_str() else { continue };
        let Some((name, rest)) = value.split_once('=') else { continue };
        if name.trim() != REFRESH_COOKIE_NAME {
            continue;
        }

        let mut attrs = rest.split(';');
        let token = attrs.next().unwrap_or("").trim();
        let cleared =
            token.is_empty() || attrs.any(|a| a.trim().eq_ignore_ascii_case("max-age=0"));

        update = Some(if cleared { None } else { Some(token.to_string()) });
    }
    update
}
