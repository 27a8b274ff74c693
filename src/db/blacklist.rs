//! Revoked access tokens.
//!
//! Entries only need to live as long as the token itself would; after that
//! the signature check rejects the token anyway, so expired rows are swept.

use sqlx::sqlite::SqlitePool;

use super::unix_now;

#[derive(Clone)]
pub struct BlacklistStore {
    pool: SqlitePool,
}

impl BlacklistStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Revoke an access token for the next `ttl_secs` seconds.
    /// A token with no remaining life is not stored.
    pub async fn add(&self, token: &str, ttl_secs: i64) -> Result<(), sqlx::Error> {
        if ttl_secs <= 0 {
            return Ok(());
        }

        sqlx::query("INSERT OR IGNORE INTO token_blacklist (token, expires_at) VALUES (?, ?)")
            .bind(token)
            .bind(unix_now() + ttl_secs)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Check whether a token has been revoked. Sweeps expired entries first.
    pub async fn is_revoked(&self, token: &str) -> Result<bool, sqlx::Error> {
        self.sweep_expired().await?;

        let row: Option<(i64,)> =
            sqlx::query_as("SELECT expires_at FROM token_blacklist WHERE token = ? AND expires_at > ?")
                .bind(token)
                .bind(unix_now())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Delete all expired entries.
    pub async fn sweep_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM token_blacklist WHERE expires_at <= ?")
            .bind(unix_now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
