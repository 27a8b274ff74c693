//! JWT token generation and validation.
//!
//! Access and refresh tokens are signed with separate secrets. The token kind
//! selects the key pair and is also written into the `typ` claim, so a token
//! issued for one kind never validates as the other.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::unix_now;

/// Token kind, baked into both the signing key choice and the claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived bearer token, kept in client memory.
    Access,
    /// Long-lived token carried in the HttpOnly cookie and tracked by a session row.
    Refresh,
}

/// JWT claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id)
    pub sub: String,
    pub is_admin: bool,
    /// Session the token was issued for, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<i64>,
    pub jti: String,
    #[serde(rename = "typ")]
    pub kind: TokenKind,
    pub iat: u64,
    pub exp: u64,
}

/// JWT claims for refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Subject (user id)
    pub sub: String,
    pub is_admin: bool,
    /// Unique per issuance, so a rotated token never equals its predecessor
    pub jti: String,
    #[serde(rename = "typ")]
    pub kind: TokenKind,
    pub iat: u64,
    pub exp: u64,
}

impl AccessClaims {
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }

    /// Seconds until the token expires naturally (zero if already past).
    pub fn remaining_secs(&self) -> i64 {
        (self.exp as i64 - unix_now()).max(0)
    }
}

impl RefreshClaims {
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

/// Default access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECS: u64 = 15 * 60;

/// Default refresh token lifetime: 8 hours.
pub const DEFAULT_REFRESH_TTL_SECS: u64 = 8 * 60 * 60;

/// Signing material for one token kind.
#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: u64,
}

impl KeyPair {
    fn new(secret: &[u8], ttl: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    access: KeyPair,
    refresh: KeyPair,
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    /// Issued at (Unix seconds)
    pub issued_at: i64,
    /// Expiration (Unix seconds)
    pub expires_at: i64,
    /// Lifetime in seconds
    pub duration: u64,
}

impl JwtConfig {
    /// Create a configuration with the default lifetimes.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self::with_ttls(
            access_secret,
            refresh_secret,
            DEFAULT_ACCESS_TTL_SECS,
            DEFAULT_REFRESH_TTL_SECS,
        )
    }

    pub fn with_ttls(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl: u64,
        refresh_ttl: u64,
    ) -> Self {
        Self {
            access: KeyPair::new(access_secret, access_ttl),
            refresh: KeyPair::new(refresh_secret, refresh_ttl),
        }
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    pub fn ttl(&self, kind: TokenKind) -> u64 {
        self.keys(kind).ttl
    }

    /// Generate an access token for a user, optionally bound to a session.
    pub fn issue_access(
        &self,
        user_id: i64,
        is_admin: bool,
        session_id: Option<i64>,
    ) -> Result<IssuedToken, TokenError> {
        let keys = self.keys(TokenKind::Access);
        let now = unix_now() as u64;
        let claims = AccessClaims {
            sub: user_id.to_string(),
            is_admin,
            sid: session_id,
            jti: uuid::Uuid::new_v4().to_string(),
            kind: TokenKind::Access,
            iat: now,
            exp: now + keys.ttl,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &keys.encoding)
            .map_err(TokenError::Encoding)?;

        Ok(IssuedToken {
            token,
            jti: claims.jti,
            issued_at: now as i64,
            expires_at: claims.exp as i64,
            duration: keys.ttl,
        })
    }

    /// Generate a refresh token for a user.
    pub fn issue_refresh(&self, user_id: i64, is_admin: bool) -> Result<IssuedToken, TokenError> {
        let keys = self.keys(TokenKind::Refresh);
        let now = unix_now() as u64;
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            is_admin,
            jti: uuid::Uuid::new_v4().to_string(),
            kind: TokenKind::Refresh,
            iat: now,
            exp: now + keys.ttl,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &keys.encoding)
            .map_err(TokenError::Encoding)?;

        Ok(IssuedToken {
            token,
            jti: claims.jti,
            issued_at: now as i64,
            expires_at: claims.exp as i64,
            duration: keys.ttl,
        })
    }

    /// Validate and decode an access token.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let claims: AccessClaims = decode(token, self.keys(TokenKind::Access))?;
        if claims.kind != TokenKind::Access {
            return Err(TokenError::WrongKind);
        }
        Ok(claims)
    }

    /// Validate and decode a refresh token.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = decode(token, self.keys(TokenKind::Refresh))?;
        if claims.kind != TokenKind::Refresh {
            return Err(TokenError::WrongKind);
        }
        Ok(claims)
    }
}

fn decode<T: serde::de::DeserializeOwned>(token: &str, keys: &KeyPair) -> Result<T, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    jsonwebtoken::decode::<T>(token, &keys.decoding, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid(e),
        })
}

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(jsonwebtoken::errors::Error),
    /// e.g. a refresh token presented where an access token is expected
    #[error("wrong token type")]
    WrongKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESS: &[u8] = b"access-secret-key-for-testing-0001";
    const REFRESH: &[u8] = b"refresh-secret-key-for-testing-002";

    fn config() -> JwtConfig {
        JwtConfig::new(ACCESS, REFRESH)
    }

    #[test]
    fn test_issue_and_verify_access_token() {
        let config = config();

        let issued = config.issue_access(42, true, Some(7)).unwrap();
        assert_eq!(issued.duration, DEFAULT_ACCESS_TTL_SECS);

        let claims = config.verify_access(&issued.token).unwrap();
        assert_eq!(claims.user_id(), Some(42));
        assert!(claims.is_admin);
        assert_eq!(claims.sid, Some(7));
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.jti, issued.jti);
    }

    #[test]
    fn test_issue_and_verify_refresh_token() {
        let config = config();

        let issued = config.issue_refresh(42, false).unwrap();
        assert_eq!(issued.duration, DEFAULT_REFRESH_TTL_SECS);
        assert_eq!(issued.expires_at - issued.issued_at, DEFAULT_REFRESH_TTL_SECS as i64);

        let claims = config.verify_refresh(&issued.token).unwrap();
        assert_eq!(claims.user_id(), Some(42));
        assert!(!claims.is_admin);
        assert_eq!(claims.kind, TokenKind::Refresh);
    }

    #[test]
    fn test_kinds_do_not_cross_verify() {
        let config = config();

        let access = config.issue_access(1, false, None).unwrap();
        let refresh = config.issue_refresh(1, false).unwrap();

        assert!(config.verify_refresh(&access.token).is_err());
        assert!(config.verify_access(&refresh.token).is_err());
    }

    #[test]
    fn test_kind_claim_checked_even_with_shared_secret() {
        // Same secret for both kinds: only the typ claim tells them apart.
        let config = JwtConfig::new(ACCESS, ACCESS);

        let refresh = config.issue_refresh(1, false).unwrap();
        assert!(matches!(
            config.verify_access(&refresh.token),
            Err(TokenError::Invalid(_)) | Err(TokenError::WrongKind)
        ));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let config = config();
        let issued = config.issue_access(1, false, None).unwrap();

        let tampered = format!("{}X", issued.token);
        assert!(matches!(
            config.verify_access(&tampered),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(matches!(
            config().verify_access("invalid-token"),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let config1 = config();
        let config2 = JwtConfig::new(b"another-access-secret-for-tests-1", REFRESH);

        let issued = config1.issue_access(1, false, None).unwrap();
        assert!(config2.verify_access(&issued.token).is_err());
    }

    #[test]
    fn test_expired_token() {
        let now = unix_now() as u64;
        let claims = AccessClaims {
            sub: "1".to_string(),
            is_admin: false,
            sid: None,
            jti: "jti".to_string(),
            kind: TokenKind::Access,
            iat: now - 100,
            exp: now - 50,
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(ACCESS),
        )
        .unwrap();

        let result = config().verify_access(&token);
        assert!(matches!(result, Err(TokenError::Expired)));
    }

    #[test]
    fn test_unique_tokens_per_issuance() {
        let config = config();

        let a = config.issue_refresh(1, false).unwrap();
        let b = config.issue_refresh(1, false).unwrap();
        assert_ne!(a.jti, b.jti);
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_custom_ttls() {
        let config = JwtConfig::with_ttls(ACCESS, REFRESH, 60, 120);
        assert_eq!(config.ttl(TokenKind::Access), 60);
        assert_eq!(config.ttl(TokenKind::Refresh), 120);

        let issued = config.issue_access(1, false, None).unwrap();
        let claims = config.verify_access(&issued.token).unwrap();
        assert!(claims.remaining_secs() <= 60 && claims.remaining_secs() > 0);
    }
}
