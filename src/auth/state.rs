//! Router state access for the bearer extractors.

use crate::db::Database;
use crate::jwt::JwtConfig;

/// Anything `Auth<R>` can verify a request against: the token keys plus the
/// stores holding the blacklist and live sessions.
pub trait HasAuthBackend {
    fn jwt(&self) -> &JwtConfig;
    fn db(&self) -> &Database;
}

/// Implement `HasAuthBackend` for a router state with `db: Database` and
/// `jwt: Arc<JwtConfig>` fields.
///
/// ```ignore
/// #[derive(Clone)]
/// pub struct SessionsState {
///     pub db: Database,
///     pub jwt: Arc<JwtConfig>,
/// }
///
/// impl_has_auth_backend!(SessionsState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state:ty) => {
        impl $crate::auth::HasAuthBackend for $state {
            fn jwt(&self) -> &$crate::jwt::JwtConfig {
                &self.jwt
            }
            fn db(&self) -> &$crate::db::Database {
                &self.db
            }
        }
    };
}
