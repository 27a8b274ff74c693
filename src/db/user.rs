use sqlx::sqlite::SqlitePool;

/// Persisted user records. The only writers outside this subsystem are the
/// password-change and email-verification flows.
#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub nombre: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub verified: bool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    nombre: String,
    email: String,
    password_hash: String,
    is_admin: i32,
    verified: i32,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            nombre: row.nombre,
            email: row.email,
            password_hash: row.password_hash,
            is_admin: row.is_admin != 0,
            verified: row.verified != 0,
        }
    }
}

/// Public user summary for the admin listing. Never carries the password hash.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub nombre: String,
    pub email: String,
    pub is_admin: bool,
    pub verified: bool,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct UserSummaryRow {
    id: i64,
    nombre: String,
    email: String,
    is_admin: i32,
    verified: i32,
    created_at: String,
}

impl From<UserSummaryRow> for UserSummary {
    fn from(row: UserSummaryRow) -> Self {
        Self {
            id: row.id,
            nombre: row.nombre,
            email: row.email,
            is_admin: row.is_admin != 0,
            verified: row.verified != 0,
            created_at: row.created_at,
        }
    }
}

impl CredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user. `password_hash` must already be hashed. Returns the user ID.
    pub async fn create(
        &self,
        nombre: &str,
        email: &str,
        password_hash: &str,
        is_admin: bool,
        verified: bool,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (nombre, email, password_hash, is_admin, verified) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(nombre)
        .bind(email.trim())
        .bind(password_hash)
        .bind(is_admin as i32)
        .bind(verified as i32)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Look up a user by email (case-insensitive).
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, nombre, email, password_hash, is_admin, verified FROM users WHERE email = ?",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by ID.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, nombre, email, password_hash, is_admin, verified FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Replace the stored password hash.
    pub async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a user's email as verified.
    pub async fn mark_verified(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET verified = 1 WHERE id = ? AND verified = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set or clear the admin flag.
    pub async fn set_admin(&self, id: i64, is_admin: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET is_admin = ? WHERE id = ?")
            .bind(is_admin as i32)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List all users (for the admin dashboard).
    pub async fn list(&self) -> Result<Vec<UserSummary>, sqlx::Error> {
        let rows: Vec<UserSummaryRow> = sqlx::query_as(
            "SELECT id, nombre, email, is_admin, verified, created_at FROM users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(UserSummary::from).collect())
    }
}
