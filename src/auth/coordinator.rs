//! Login, refresh-token rotation and logout.
//!
//! A refresh token is usable only while a live session row holds it. Rotation
//! swaps the row's token with one conditional update, so when the same token
//! is presented twice at once only one request gets a new pair.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::errors::{AuthError, Credential};
use crate::db::{Database, NewSession, User};
use crate::jwt::{IssuedToken, JwtConfig};
use crate::password::verify_password;

/// Credentials and request metadata for a login attempt.
#[derive(Debug, Clone, Copy)]
pub struct LoginAttempt<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub device_info: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

/// Result of a successful login or rotation.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
    pub session_id: i64,
    pub user: User,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    db: Database,
    jwt: Arc<JwtConfig>,
}

impl RefreshCoordinator {
    pub fn new(db: Database, jwt: Arc<JwtConfig>) -> Self {
        Self { db, jwt }
    }

    /// Check credentials and open a new session.
    pub async fn login(&self, attempt: LoginAttempt<'_>) -> Result<IssuedSession, AuthError> {
        let user = self.db.users().find_by_email(attempt.email).await?;

        let valid = verify_password(
            attempt.password,
            user.as_ref().map(|u| u.password_hash.as_str()),
        )
        .await?;
        let user = match user {
            Some(user) if valid => user,
            _ => {
                warn!("Login failed: invalid credentials");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !user.verified {
            warn!(user_id = user.id, "Login refused: email not verified");
            return Err(AuthError::Unverified);
        }

        let refresh = self
            .jwt
            .issue_refresh(user.id, user.is_admin)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let session_id = self
            .db
            .sessions()
            .create(NewSession {
                user_id: user.id,
                refresh_token: &refresh.token,
                device_info: attempt.device_info,
                ip_address: attempt.ip_address,
                user_agent: attempt.user_agent,
                expires_at: refresh.expires_at,
            })
            .await?;

        let access = self
            .jwt
            .issue_access(user.id, user.is_admin, Some(session_id))
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        info!(user_id = user.id, session_id, "User logged in");

        Ok(IssuedSession {
            access,
            refresh,
            session_id,
            user,
        })
    }

    /// Exchange a refresh token for a new access/refresh pair.
    pub async fn refresh(
        &self,
        presented: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<IssuedSession, AuthError> {
        let presented = presented.ok_or(AuthError::NoCredential(Credential::RefreshToken))?;

        let claims = self.jwt.verify_refresh(presented).map_err(|e| {
            debug!(error = %e, "Refresh token rejected");
            AuthError::RefreshInvalid
        })?;
        let user_id = claims.user_id().ok_or(AuthError::RefreshInvalid)?;

        let sessions = self.db.sessions();
        let session = match sessions.find_by_refresh_token(presented).await? {
            Some(session) if session.user_id == user_id => session,
            _ => {
                warn!(user_id, "Refresh token has no live session");
                return Err(AuthError::SessionRevoked);
            }
        };

        let Some(user) = self.db.users().find_by_id(user_id).await? else {
            sessions.delete_by_id(session.id, user_id).await?;
            return Err(AuthError::SessionRevoked);
        };

        let refresh = self
            .jwt
            .issue_refresh(user.id, user.is_admin)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        if !sessions
            .replace(presented, &refresh.token, refresh.expires_at)
            .await?
        {
            warn!(user_id, session_id = session.id, "Refresh token already rotated");
            return Err(AuthError::SessionRevoked);
        }

        if let Some(ip) = ip_address {
            if session.ip_address.as_deref() != Some(ip) {
                if let Err(e) = sessions.update_ip(session.id, ip).await {
                    warn!(session_id = session.id, error = %e, "Failed to update session IP");
                }
            }
        }

        let access = self
            .jwt
            .issue_access(user.id, user.is_admin, Some(session.id))
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        debug!(user_id, session_id = session.id, "Refresh token rotated");

        Ok(IssuedSession {
            access,
            refresh,
            session_id: session.id,
            user,
        })
    }

    /// Close the session holding `refresh_token` and revoke the bearer token.
    ///
    /// The bearer token is blacklisted for its remaining lifetime whether or
    /// not a session was found. Failure to blacklist is logged and ignored.
    pub async fn logout(
        &self,
        refresh_token: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<(), AuthError> {
        let refresh_token =
            refresh_token.ok_or(AuthError::NoCredential(Credential::RefreshToken))?;

        if let Some(token) = access_token {
            if let Ok(claims) = self.jwt.verify_access(token) {
                if let Err(e) = self.db.blacklist().add(token, claims.remaining_secs()).await {
                    warn!(error = %e, "Failed to blacklist access token on logout");
                }
            }
        }

        if !self.db.sessions().delete_by_token(refresh_token).await? {
            return Err(AuthError::NoActiveSession);
        }

        info!("User logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSWORD: &str = "Contraseña123@";

    async fn setup() -> (RefreshCoordinator, Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let hash = bcrypt::hash(PASSWORD, 4).unwrap();
        let user_id = db
            .users()
            .create("Admin", "admin@example.com", &hash, true, true)
            .await
            .unwrap();
        let jwt = Arc::new(JwtConfig::new(
            b"access-secret-key-for-testing-0001",
            b"refresh-secret-key-for-testing-002",
        ));
        (RefreshCoordinator::new(db.clone(), jwt), db, user_id)
    }

    fn attempt<'a>(email: &'a str, password: &'a str) -> LoginAttempt<'a> {
        LoginAttempt {
            email,
            password,
            device_info: Some("Firefox en Linux"),
            ip_address: Some("127.0.0.1"),
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn test_login_opens_session() {
        let (coordinator, db, user_id) = setup().await;

        let issued = coordinator.login(attempt("admin@example.com", PASSWORD)).await.unwrap();
        assert_eq!(issued.user.id, user_id);
        assert!(issued.user.is_admin);

        let session = db
            .sessions()
            .find_by_refresh_token(&issued.refresh.token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.id, issued.session_id);
        assert_eq!(session.device_info.as_deref(), Some("Firefox en Linux"));
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let (coordinator, _, _) = setup().await;

        assert!(matches!(
            coordinator.login(attempt("admin@example.com", "Wrong1234")).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            coordinator.login(attempt("nobody@example.com", PASSWORD)).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_login_rejects_unverified() {
        let (coordinator, db, _) = setup().await;
        let hash = bcrypt::hash(PASSWORD, 4).unwrap();
        db.users()
            .create("Nuevo", "new@example.com", &hash, false, false)
            .await
            .unwrap();

        assert!(matches!(
            coordinator.login(attempt("new@example.com", PASSWORD)).await,
            Err(AuthError::Unverified)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rotates_once() {
        let (coordinator, _, _) = setup().await;
        let login = coordinator.login(attempt("admin@example.com", PASSWORD)).await.unwrap();

        let rotated = coordinator
            .refresh(Some(&login.refresh.token), None)
            .await
            .unwrap();
        assert_ne!(rotated.refresh.token, login.refresh.token);
        assert_eq!(rotated.session_id, login.session_id);

        // The old token is gone for good
        assert!(matches!(
            coordinator.refresh(Some(&login.refresh.token), None).await,
            Err(AuthError::SessionRevoked)
        ));
        assert!(coordinator.refresh(Some(&rotated.refresh.token), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_picks_up_admin_change() {
        let (coordinator, db, user_id) = setup().await;
        let login = coordinator.login(attempt("admin@example.com", PASSWORD)).await.unwrap();

        db.users().set_admin(user_id, false).await.unwrap();
        let rotated = coordinator.refresh(Some(&login.refresh.token), None).await.unwrap();
        assert!(!rotated.user.is_admin);
    }

    #[tokio::test]
    async fn test_refresh_rejections() {
        let (coordinator, _, _) = setup().await;
        let login = coordinator.login(attempt("admin@example.com", PASSWORD)).await.unwrap();

        assert!(matches!(
            coordinator.refresh(None, None).await,
            Err(AuthError::NoCredential(Credential::RefreshToken))
        ));
        assert!(matches!(
            coordinator.refresh(Some("garbage"), None).await,
            Err(AuthError::RefreshInvalid)
        ));
        // An access token is not a refresh token
        assert!(matches!(
            coordinator.refresh(Some(&login.access.token), None).await,
            Err(AuthError::RefreshInvalid)
        ));
    }

    #[tokio::test]
    async fn test_refresh_updates_ip() {
        let (coordinator, db, _) = setup().await;
        let login = coordinator.login(attempt("admin@example.com", PASSWORD)).await.unwrap();

        coordinator
            .refresh(Some(&login.refresh.token), Some("10.1.2.3"))
            .await
            .unwrap();
        let session = db.sessions().find_by_id(login.session_id).await.unwrap().unwrap();
        assert_eq!(session.ip_address.as_deref(), Some("10.1.2.3"));
    }

    #[tokio::test]
    async fn test_logout_revokes_session_and_bearer() {
        let (coordinator, db, _) = setup().await;
        let login = coordinator.login(attempt("admin@example.com", PASSWORD)).await.unwrap();

        coordinator
            .logout(Some(&login.refresh.token), Some(&login.access.token))
            .await
            .unwrap();

        assert!(db.blacklist().is_revoked(&login.access.token).await.unwrap());
        assert!(matches!(
            coordinator.refresh(Some(&login.refresh.token), None).await,
            Err(AuthError::SessionRevoked)
        ));
        assert!(matches!(
            coordinator.logout(Some(&login.refresh.token), None).await,
            Err(AuthError::NoActiveSession)
        ));
        assert!(matches!(
            coordinator.logout(None, None).await,
            Err(AuthError::NoCredential(Credential::RefreshToken))
        ));
    }
}
