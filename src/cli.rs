//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::auth::CookiePolicy;
use crate::db::Database;
use crate::jwt::{DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS};
use crate::password::hash_password;
use crate::rate_limit::DEFAULT_LOGIN_PER_MINUTE;
use clap::Parser;
use tracing::{error, info};

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Deployment environment. Only affects the refresh cookie attributes.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn cookie_policy(&self) -> CookiePolicy {
        match self {
            Environment::Development => CookiePolicy::development(),
            Environment::Production => CookiePolicy::production(),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "sessionguard",
    about = "Email and password login with rotating refresh sessions"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "sessionguard.db")]
    pub database: String,

    /// Deployment environment (production sets SameSite=None; Secure cookies)
    #[arg(short, long, env = "APP_ENV", value_enum, default_value = "development")]
    pub environment: Environment,

    /// Access token lifetime in seconds
    #[arg(long, env = "ACCESS_TOKEN_TTL", default_value_t = DEFAULT_ACCESS_TTL_SECS)]
    pub access_ttl: u64,

    /// Refresh token and session lifetime in seconds
    #[arg(long, env = "REFRESH_TOKEN_TTL", default_value_t = DEFAULT_REFRESH_TTL_SECS)]
    pub refresh_ttl: u64,

    /// Read the client IP from X-Forwarded-For. Only enable behind a trusted proxy
    #[arg(long)]
    pub trust_proxy: bool,

    /// Login attempts allowed per client IP per minute
    #[arg(long, default_value_t = DEFAULT_LOGIN_PER_MINUTE)]
    pub login_rate_per_minute: u32,

    /// Path to file containing the access token secret. Prefer JWT_ACCESS_SECRET
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer JWT_REFRESH_SECRET
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Create (or promote) a verified admin with this email on startup.
    /// The password is read from ADMIN_PASSWORD
    #[arg(long, value_name = "EMAIL")]
    pub create_admin: Option<String>,

    /// Display name for the admin created with --create-admin
    #[arg(long, default_value = "Administrador")]
    pub admin_name: String,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Read a secret from an environment variable (cleared after reading) or a file.
fn load_secret(env_var: &str, file: Option<&str>, file_flag: &str) -> Option<String> {
    if let Ok(secret) = std::env::var(env_var) {
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        return Some(secret);
    }

    match file {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(content) => Some(content.trim().to_string()),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                None
            }
        },
        None => {
            error!(
                "{} is required. Set the environment variable (recommended) or use {}",
                env_var, file_flag
            );
            None
        }
    }
}

/// Check length and distinctness of the two signing secrets.
pub fn check_secrets(access: &str, refresh: &str) -> Result<(), &'static str> {
    if access.len() < MIN_JWT_SECRET_LENGTH || refresh.len() < MIN_JWT_SECRET_LENGTH {
        return Err("JWT secrets must be at least 32 characters");
    }
    if access == refresh {
        return Err("Access and refresh secrets must differ");
    }
    Ok(())
}

/// Load both JWT secrets. Returns None and logs an error if either is missing or weak.
pub fn load_jwt_secrets(
    access_secret_file: Option<&str>,
    refresh_secret_file: Option<&str>,
) -> Option<(String, String)> {
    let access = load_secret("JWT_ACCESS_SECRET", access_secret_file, "--access-secret-file")?;
    let refresh = load_secret("JWT_REFRESH_SECRET", refresh_secret_file, "--refresh-secret-file")?;

    if let Err(msg) = check_secrets(&access, &refresh) {
        error!("{}", msg);
        return None;
    }

    Some((access, refresh))
}

/// Handle the --create-admin flag: create a verified admin, or promote an
/// existing account with that email and reset its password.
pub async fn handle_create_admin(db: &Database, email: &str, nombre: &str) {
    let Ok(password) = std::env::var("ADMIN_PASSWORD") else {
        error!("ADMIN_PASSWORD is required with --create-admin");
        std::process::exit(1);
    };
    // SAFETY: single-threaded startup, nothing else reads this variable.
    unsafe { std::env::remove_var("ADMIN_PASSWORD") };

    match db.users().find_by_email(email).await {
        Ok(Some(existing)) => {
            let hash = match hash_password(&password).await {
                Ok(hash) => hash,
                Err(e) => {
                    error!(error = %e, "Invalid admin password");
                    std::process::exit(1);
                }
            };
            let promoted = db.users().set_admin(existing.id, true).await;
            let verified = db.users().mark_verified(existing.id).await;
            let rehashed = db.users().set_password_hash(existing.id, &hash).await;
            if let Err(e) = promoted.and(verified).and(rehashed) {
                error!(error = %e, "Failed to promote existing user");
                std::process::exit(1);
            }
            println!();
            println!("User already exists, granted admin: {}", existing.email);
            println!();
        }
        Ok(None) => {
            let hash = match hash_password(&password).await {
                Ok(hash) => hash,
                Err(e) => {
                    error!(error = %e, "Invalid admin password");
                    std::process::exit(1);
                }
            };

            match db.users().create(nombre, email, &hash, true, true).await {
                Ok(id) => {
                    println!();
                    println!("Admin user created: {} (id {})", email, id);
                    println!();
                }
                Err(e) => {
                    error!(error = %e, "Failed to create admin user");
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to check for existing admin");
            std::process::exit(1);
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, access_secret: String, refresh_secret: String) -> ServerConfig {
    ServerConfig {
        db,
        access_secret: access_secret.into_bytes(),
        refresh_secret: refresh_secret.into_bytes(),
        access_ttl: args.access_ttl,
        refresh_ttl: args.refresh_ttl,
        environment: args.environment,
        trust_proxy: args.trust_proxy,
        login_rate_per_minute: args.login_rate_per_minute,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_secrets() {
        let a = "a".repeat(32);
        let b = "b".repeat(32);

        assert!(check_secrets(&a, &b).is_ok());
        assert!(check_secrets(&a, &a).is_err());
        assert!(check_secrets("short", &b).is_err());
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["sessionguard"]).unwrap();
        assert_eq!(args.port, 3000);
        assert_eq!(args.environment, Environment::Development);
        assert_eq!(args.access_ttl, 900);
        assert_eq!(args.refresh_ttl, 28800);
        assert!(!args.trust_proxy);
        assert!(args.create_admin.is_none());
    }

    #[test]
    fn test_production_flag() {
        let args = Args::try_parse_from(["sessionguard", "--environment", "production"]).unwrap();
        assert_eq!(args.environment, Environment::Production);
        assert!(args.environment.cookie_policy().secure);
    }
}
