//! Axum extractors for authentication.

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::cookie::get_bearer_token;
use super::errors::{AuthError, Credential};
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;

/// Role gate applied after the token checks pass.
pub trait RoleConstraint {
    fn allows(is_admin: bool) -> bool;
}

/// Any authenticated caller.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    fn allows(_is_admin: bool) -> bool {
        true
    }
}

/// Only callers whose verified claims carry `is_admin`.
pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    fn allows(is_admin: bool) -> bool {
        is_admin
    }
}

/// Verify the bearer token on a request.
///
/// Order of checks: signature and expiry, then the blacklist, then the
/// session named by `sid`. A token whose session was closed elsewhere is
/// rejected even though it has not expired yet.
pub async fn authenticate_request<S>(parts: &Parts, state: &S) -> Result<AuthenticatedUser, AuthError>
where
    S: HasAuthBackend + Send + Sync,
{
    let token = get_bearer_token(&parts.headers)
        .ok_or(AuthError::NoCredential(Credential::AccessToken))?;

    let claims = state
        .jwt()
        .verify_access(token)
        .map_err(AuthError::from_access)?;
    let user_id = claims.user_id().ok_or(AuthError::InvalidSignature)?;

    if state.db().blacklist().is_revoked(token).await? {
        return Err(AuthError::TokenRevoked);
    }

    if let Some(sid) = claims.sid {
        match state.db().sessions().find_by_id(sid).await? {
            Some(session) if session.user_id == user_id => {}
            _ => return Err(AuthError::SessionRevoked),
        }
    }

    Ok(AuthenticatedUser {
        claims,
        user_id,
        token: token.to_string(),
    })
}

/// Extractor for API endpoints that require an access token.
///
/// ```ignore
/// async fn handler(Auth(user, ..): Auth<AnyRole>) { ... }
/// async fn admin(Auth(user, ..): Auth<AdminOnly>) { ... }
/// ```
pub struct Auth<R: RoleConstraint = AnyRole>(pub AuthenticatedUser, pub PhantomData<R>);

impl<R: RoleConstraint> Auth<R> {
    pub fn user(&self) -> &AuthenticatedUser {
        &self.0
    }
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = authenticate_request(parts, state).await?;
        if !R::allows(user.is_admin()) {
            tracing::debug!(user_id = user.user_id, "Role check failed");
            return Err(AuthError::InsufficientRole);
        }
        Ok(Auth(user, PhantomData))
    }
}
