//! Cookie and header parsing utilities for authentication.

use axum::http::{HeaderMap, header};

/// Cookie name for the refresh token. Never readable by client scripts.
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                let value = value.trim();
                return (!value.is_empty()).then_some(value);
            }
        }
    }
    None
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn get_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Attributes applied to the refresh cookie.
///
/// Production serves the API cross-site behind HTTPS, so the cookie is
/// `SameSite=None; Secure`. Development over plain HTTP uses `Lax`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    pub secure: bool,
    pub same_site: SameSite,
}

impl CookiePolicy {
    pub fn development() -> Self {
        Self {
            secure: false,
            same_site: SameSite::Lax,
        }
    }

    pub fn production() -> Self {
        Self {
            secure: true,
            same_site: SameSite::None,
        }
    }

    /// `Set-Cookie` value carrying a refresh token.
    pub fn refresh_cookie(&self, token: &str, max_age: u64) -> String {
        self.build(token, max_age)
    }

    /// `Set-Cookie` value that removes the refresh token.
    pub fn clear_refresh_cookie(&self) -> String {
        self.build("", 0)
    }

    fn build(&self, value: &str, max_age: u64) -> String {
        let secure = if self.secure { "; Secure" } else { "" };
        format!(
            "{}={}; HttpOnly; SameSite={}; Path=/; Max-Age={}{}",
            REFRESH_COOKIE_NAME,
            value,
            self.same_site.as_str(),
            max_age,
            secure
        )
    }
}
