//! Per-device session storage.
//!
//! A session row is the source of truth for whether a refresh token is still
//! usable: the token's own signature and expiry are necessary but not
//! sufficient. Rotation rewrites the row in place, logout deletes it.
//! Rows past `expires_at` are treated as absent by every read.

use sqlx::sqlite::SqlitePool;

use super::unix_now;

/// A live session record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub refresh_token: String,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: i64,
    pub last_used_at: i64,
    pub expires_at: i64,
}

/// Fields needed to open a session.
#[derive(Debug, Clone)]
pub struct NewSession<'a> {
    pub user_id: i64,
    pub refresh_token: &'a str,
    pub device_info: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub expires_at: i64,
}

/// Store for per-device sessions.
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new session. Returns the session ID.
    pub async fn create(&self, session: NewSession<'_>) -> Result<i64, sqlx::Error> {
        let now = unix_now();
        let result = sqlx::query(
            "INSERT INTO sessions (user_id, refresh_token, device_info, ip_address, user_agent, created_at, last_used_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.user_id)
        .bind(session.refresh_token)
        .bind(session.device_info)
        .bind(session.ip_address)
        .bind(session.user_agent)
        .bind(now)
        .bind(now)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Find the live session holding this refresh token.
    pub async fn find_by_refresh_token(&self, token: &str) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, user_id, refresh_token, device_info, ip_address, user_agent, created_at, last_used_at, expires_at
             FROM sessions WHERE refresh_token = ? AND expires_at > ?",
        )
        .bind(token)
        .bind(unix_now())
        .fetch_optional(&self.pool)
        .await
    }

    /// Find a live session by ID.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, user_id, refresh_token, device_info, ip_address, user_agent, created_at, last_used_at, expires_at
             FROM sessions WHERE id = ? AND expires_at > ?",
        )
        .bind(id)
        .bind(unix_now())
        .fetch_optional(&self.pool)
        .await
    }

    /// Record that the session was just used.
    ///
    /// Rotation through `replace` already bumps `last_used_at`, and bearer
    /// requests do not write to the session row, so "last used" means "last
    /// refreshed". This is for callers that present the refresh token without
    /// rotating it.
    pub async fn touch(&self, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE sessions SET last_used_at = ? WHERE refresh_token = ?")
            .bind(unix_now())
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Swap the refresh token of the live session holding `old_token`.
    ///
    /// This is a single conditional update keyed on the old value, so when
    /// several requests rotate the same token concurrently exactly one of them
    /// sees `true`. Returns `false` without touching anything if `old_token`
    /// no longer matches a live row (already rotated, revoked or expired).
    pub async fn replace(
        &self,
        old_token: &str,
        new_token: &str,
        new_expires_at: i64,
    ) -> Result<bool, sqlx::Error> {
        let now = unix_now();
        let result = sqlx::query(
            "UPDATE sessions SET refresh_token = ?, expires_at = ?, last_used_at = ?
             WHERE refresh_token = ? AND expires_at > ?",
        )
        .bind(new_token)
        .bind(new_expires_at)
        .bind(now)
        .bind(old_token)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Update the last seen IP address for a session.
    pub async fn update_ip(&self, id: i64, ip: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sessions SET ip_address = ? WHERE id = ?")
            .bind(ip)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete the session holding this refresh token (logout).
    pub async fn delete_by_token(&self, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE refresh_token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a session, but only if it belongs to `user_id`.
    pub async fn delete_by_id(&self, id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every session of a user, optionally keeping one.
    pub async fn delete_all_for_user(
        &self,
        user_id: i64,
        except_id: Option<i64>,
    ) -> Result<u64, sqlx::Error> {
        let result = match except_id {
            Some(keep) => {
                sqlx::query("DELETE FROM sessions WHERE user_id = ? AND id != ?")
                    .bind(user_id)
                    .bind(keep)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM sessions WHERE user_id = ?")
                    .bind(user_id)
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    /// List live sessions of a user, most recently refreshed first.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Session>, sqlx::Error> {
        self.sweep_expired().await?;

        sqlx::query_as(
            "SELECT id, user_id, refresh_token, device_info, ip_address, user_agent, created_at, last_used_at, expires_at
             FROM sessions WHERE user_id = ? AND expires_at > ?
             ORDER BY last_used_at DESC, id DESC",
        )
        .bind(user_id)
        .bind(unix_now())
        .fetch_all(&self.pool)
        .await
    }

    /// Delete all expired sessions. Returns the number of rows removed.
    pub async fn sweep_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(unix_now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
