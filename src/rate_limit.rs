//! Rate limiting for the login endpoint.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing.

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Default login attempts allowed per IP per minute.
pub const DEFAULT_LOGIN_PER_MINUTE: u32 = 10;

#[derive(Clone)]
pub struct LoginRateLimit {
    limiter: Arc<IpLimiter>,
    trust_proxy: bool,
}

impl LoginRateLimit {
    /// Allow `per_minute` attempts per IP, all of which may arrive in a burst.
    pub fn per_minute(per_minute: u32, trust_proxy: bool) -> Self {
        let rate = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(rate))),
            trust_proxy,
        }
    }
}

/// Middleware for rate limiting login attempts.
pub async fn rate_limit_login(
    State(config): State<LoginRateLimit>,
    request: Request,
    next: Next,
) -> Response {
    // Without a peer address (e.g. in-process tests) all callers share one bucket
    let ip = extract_client_ip(&request, config.trust_proxy).unwrap_or_else(|| "unknown".into());

    match config.limiter.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(ip = %ip, "Login rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "Demasiados intentos. Inténtalo de nuevo más tarde.",
                    "code": "rate_limited",
                })),
            )
                .into_response()
        }
    }
}
