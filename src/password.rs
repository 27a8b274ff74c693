//! Password hashing and verification with bcrypt.
//!
//! bcrypt is deliberately slow, so the async wrappers run it on the blocking
//! pool instead of stalling a runtime worker.

use bcrypt::{DEFAULT_COST, hash, verify};
use std::sync::LazyLock;

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 72;

/// Hash checked when no user matches an email, so a miss costs the same as a
/// wrong password.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash("not-a-real-password", DEFAULT_COST).ok());

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password must be at least 8 characters")]
    TooShort,
    #[error("password must be at most 72 bytes")]
    TooLong,
    #[error("password must contain a digit, a lowercase and an uppercase letter")]
    TooWeak,
    #[error("bcrypt failure: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
    #[error("hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Check the strength rules applied to new passwords.
pub fn validate_password_strength(password: &str) -> Result<(), PasswordError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(PasswordError::TooShort);
    }
    // bcrypt ignores everything past 72 bytes
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(PasswordError::TooLong);
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());
    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(PasswordError::TooWeak);
    }

    Ok(())
}

/// Validate and hash a new password.
pub async fn hash_password(password: &str) -> Result<String, PasswordError> {
    validate_password_strength(password)?;
    let password = password.to_owned();
    let hashed = tokio::task::spawn_blocking(move || hash(password, DEFAULT_COST)).await??;
    Ok(hashed)
}

/// Verify a password against a stored hash. `None` burns the same time
/// against a dummy hash and always fails.
pub async fn verify_password(password: &str, stored: Option<&str>) -> Result<bool, PasswordError> {
    let password = password.to_owned();
    let stored = stored.map(str::to_owned);

    tokio::task::spawn_blocking(move || match stored {
        Some(stored) => verify(password, &stored),
        None => {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = verify(password, dummy);
            }
            Ok(false)
        }
    })
    .await?
    .map_err(PasswordError::from)
}
