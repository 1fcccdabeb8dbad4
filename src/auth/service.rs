//! Sign-in, logout and startup session restore.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::error::AuthError;
use super::session::SessionManager;
use super::tokens::AuthResponse;
use crate::api::endpoints::{APPLE_SIGN_IN, GOOGLE_SIGN_IN, LOGOUT};
use crate::api::{ApiClient, NoContent};

/// Shortest accepted display name, after trimming.
pub const MIN_DISPLAY_NAME_LEN: usize = 2;

/// Identity providers the backend accepts ID tokens from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInProvider {
    Google,
    Apple,
}

impl SignInProvider {
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Google => GOOGLE_SIGN_IN,
            Self::Apple => APPLE_SIGN_IN,
        }
    }
}

impl fmt::Display for SignInProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Google => write!(f, "google"),
            Self::Apple => write!(f, "apple"),
        }
    }
}

impl FromStr for SignInProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "apple" => Ok(Self::Apple),
            other => Err(format!("unknown sign-in provider '{}'", other)),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    id_token: &'a str,
    display_name: &'a str,
}

#[derive(Serialize)]
struct LogoutRequest<'a> {
    refresh_token: &'a str,
}

/// User-facing auth flows on top of the session manager.
#[derive(Debug)]
pub struct AuthService {
    api: Arc<ApiClient>,
    restore: tokio::sync::Mutex<()>,
}

impl AuthService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            restore: tokio::sync::Mutex::new(()),
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        self.api.session()
    }

    /// Exchange a provider ID token for a session.
    #[instrument(skip(self, id_token, provider), fields(provider = %provider))]
    pub async fn sign_in(
        &self,
        provider: SignInProvider,
        id_token: &str,
        display_name: &str,
    ) -> Result<(), AuthError> {
        let display_name = display_name.trim();
        if display_name.chars().count() < MIN_DISPLAY_NAME_LEN {
            return Err(AuthError::InvalidDisplayName {
                min: MIN_DISPLAY_NAME_LEN,
            });
        }

        let request = SignInRequest {
            id_token,
            display_name,
        };
        let response: AuthResponse = self
            .api
            .post_anonymous(provider.endpoint(), &request)
            .await?;

        let session = self.session();
        session.save_response(&response)?;
        session.set_authenticated(true);
        info!("Signed in");
        Ok(())
    }

    /// End the session: tell the backend, then tear everything down.
    ///
    /// The backend call is best effort; local state is always cleared.
    pub async fn logout(&self) {
        let session = self.session();
        session.begin_logout();

        match session.get_refresh_token() {
            Ok(refresh_token) => {
                let request = LogoutRequest {
                    refresh_token: &refresh_token,
                };
                if let Err(e) = self
                    .api
                    .post_anonymous::<NoContent, _>(LOGOUT, &request)
                    .await
                {
                    warn!("Backend logout failed: {}", e);
                }
            }
            Err(e) => warn!("Skipping backend logout: {}", e),
        }

        session.force_logout().await;
        session.end_logout();
        info!("Logged out");
    }

    /// Clear local state without contacting the backend.
    pub async fn force_logout(&self) {
        self.session().force_logout().await;
    }

    pub async fn refresh_token(&self) -> bool {
        self.session().refresh().await
    }

    /// Bring the authenticated flag in line with stored credentials.
    ///
    /// Returns whether the session ended up authenticated. Never logs out.
    pub async fn restore_session(&self) -> bool {
        let _guard = self.restore.lock().await;
        let session = self.session();

        if session.is_logged_in() {
            session.set_authenticated(true);
            return true;
        }
        if session.get_refresh_token().is_err() {
            session.set_authenticated(false);
            return false;
        }

        info!("Stored access token unusable, attempting refresh");
        let restored = session.refresh().await;
        session.set_authenticated(restored);
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!("google".parse::<SignInProvider>(), Ok(SignInProvider::Google));
        assert_eq!("Apple".parse::<SignInProvider>(), Ok(SignInProvider::Apple));
        assert!("github".parse::<SignInProvider>().is_err());
        assert_eq!(SignInProvider::Apple.endpoint(), "/auth/apple");
        assert_eq!(SignInProvider::Google.to_string(), "google");
    }

    #[test]
    fn test_sign_in_body_shape() {
        let body = serde_json::to_value(SignInRequest {
            id_token: "jwt",
            display_name: "Ana",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "idToken": "jwt", "displayName": "Ana" }));
    }
}
