//! Authentication user types.

use crate::jwt::AccessClaims;

/// Caller identity established from a verified access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// JWT claims from the access token
    pub claims: AccessClaims,
    /// Database user ID parsed from the subject
    pub user_id: i64,
    /// The raw bearer token, needed to blacklist it on logout
    pub token: String,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.claims.is_admin
    }

    /// Session the access token was issued for.
    pub fn session_id(&self) -> Option<i64> {
        self.claims.sid
    }
}
