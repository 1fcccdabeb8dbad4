//! Shared authentication traits.

use crate::auth::tokens::AuthResponse;
use crate::error::ApiError;

/// Exchanges a refresh token for a fresh token pair.
///
/// This abstracts the refresh round trip from the session manager that
/// decides when one happens.
#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ApiError>;
}

/// State that must be torn down when the session ends.
///
/// Hooks are run by [`SessionManager::force_logout`](crate::auth::SessionManager::force_logout)
/// and must tolerate being run more than once.
#[async_trait::async_trait]
pub trait LogoutHook: Send + Sync {
    async fn on_logout(&self);

    /// Short label used in logs.
    fn name(&self) -> &str;
}
