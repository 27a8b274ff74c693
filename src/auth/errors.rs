//! Authentication error types.
//!
//! The `code` in the JSON body tells the calling application what to do:
//! 401 codes are recoverable with one refresh-and-retry, while
//! `token_revoked`, `session_revoked` and `refresh_invalid` are terminal and
//! must end the local session without retrying.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::jwt::TokenError;
use crate::password::PasswordError;

/// Which credential was missing from the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    AccessToken,
    RefreshToken,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing {0:?}")]
    NoCredential(Credential),
    #[error("access token signature or payload invalid")]
    InvalidSignature,
    #[error("access token expired")]
    Expired,
    #[error("access token has been revoked")]
    TokenRevoked,
    #[error("session no longer exists")]
    SessionRevoked,
    #[error("refresh token invalid or expired")]
    RefreshInvalid,
    #[error("no active session to close")]
    NoActiveSession,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("email not verified")]
    Unverified,
    #[error("insufficient role")]
    InsufficientRole,
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<PasswordError> for AuthError {
    fn from(e: PasswordError) -> Self {
        AuthError::Internal(e.to_string())
    }
}

impl AuthError {
    /// Map an access-token verification failure.
    pub fn from_access(e: TokenError) -> Self {
        match e {
            TokenError::Expired => AuthError::Expired,
            TokenError::Encoding(e) => AuthError::Internal(e.to_string()),
            TokenError::Invalid(_) | TokenError::WrongKind => AuthError::InvalidSignature,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::NoCredential(_)
            | AuthError::InvalidSignature
            | AuthError::Expired
            | AuthError::NoActiveSession
            | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::TokenRevoked
            | AuthError::SessionRevoked
            | AuthError::RefreshInvalid
            | AuthError::Unverified
            | AuthError::InsufficientRole => StatusCode::FORBIDDEN,
            AuthError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::NoCredential(_) => "no_credential",
            AuthError::InvalidSignature => "invalid_token",
            AuthError::Expired => "token_expired",
            AuthError::TokenRevoked => "token_revoked",
            AuthError::SessionRevoked => "session_revoked",
            AuthError::RefreshInvalid => "refresh_invalid",
            AuthError::NoActiveSession => "no_session",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::Unverified => "unverified",
            AuthError::InsufficientRole => "forbidden",
            AuthError::StoreUnavailable(_) => "store_unavailable",
            AuthError::Internal(_) => "internal",
        }
    }

    /// User-facing message.
    pub fn message(&self) -> &'static str {
        match self {
            AuthError::NoCredential(Credential::AccessToken) => "Token de acceso requerido",
            AuthError::NoCredential(Credential::RefreshToken) => "Refresh token requerido",
            AuthError::InvalidSignature => "Token inválido",
            AuthError::Expired => "Token expirado",
            AuthError::TokenRevoked => "Token revocado",
            AuthError::SessionRevoked => "Sesión cerrada o inválida",
            AuthError::RefreshInvalid => "Refresh token inválido o expirado",
            AuthError::NoActiveSession => "No hay sesión activa",
            AuthError::InvalidCredentials => "Credenciales inválidas",
            AuthError::Unverified => "Debes verificar tu correo antes de iniciar sesión",
            AuthError::InsufficientRole => "Acceso denegado",
            AuthError::StoreUnavailable(_) => "Servicio no disponible",
            AuthError::Internal(_) => "Error interno del servidor",
        }
    }

    /// Whether the caller must drop its local session instead of retrying.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuthError::TokenRevoked | AuthError::SessionRevoked | AuthError::RefreshInvalid
        )
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    code: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::StoreUnavailable(e) => tracing::error!(error = %e, "Auth store failure"),
            AuthError::Internal(e) => tracing::error!(error = %e, "Auth internal failure"),
            other => tracing::debug!(code = other.code(), "Auth rejected"),
        }

        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
                code: self.code(),
            }),
        )
            .into_response()
    }
}
