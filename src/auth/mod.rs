//! JWT authentication with per-device sessions.
//!
//! Dual-token system: short-lived access tokens (bearer, held in client
//! memory) and long-lived refresh tokens (HttpOnly cookie, backed by a session
//! row). Every bearer request re-checks the blacklist and the session, so
//! logout and remote session closing take effect immediately.

mod cookie;
pub mod coordinator;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use cookie::{CookiePolicy, REFRESH_COOKIE_NAME, SameSite, get_bearer_token, get_cookie};
pub use coordinator::{IssuedSession, LoginAttempt, RefreshCoordinator};
pub use errors::{AuthError, Credential};
pub use extractors::{AdminOnly, AnyRole, Auth, RoleConstraint, authenticate_request};
pub use ip::{HasHeadersAndExtensions, describe_device, extract_client_ip, extract_user_agent};
pub use state::HasAuthBackend;
pub use types::AuthenticatedUser;
