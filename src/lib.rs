//! Data-access layer for the CarBN client: credential lifecycle, an
//! authenticated request executor with single-flight token refresh, and the
//! object and entity caches it feeds.

pub mod api;
pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod net;

use crate::api::{ApiClient, ImageLoader, RefreshEndpoint, UserDirectory};
use crate::auth::{
    AuthService, CredentialStore, MemoryCredentialStore, SessionManager, UserProfile, UserState,
};
use crate::cache::{EntityCache, ObjectCache};
use crate::clock::{Clock, default_clock};
use crate::config::{Config, CredentialBackend};
use crate::net::HttpClient;

use std::sync::Arc;

/// Every long-lived component, wired together once at startup.
#[derive(Clone)]
pub struct AppServices {
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    pub session: Arc<SessionManager>,
    pub api: Arc<ApiClient>,
    pub auth: Arc<AuthService>,
    pub images: Arc<ObjectCache>,
    pub users: Arc<EntityCache<UserProfile>>,
    pub user_state: Arc<UserState>,
    pub directory: UserDirectory,
    pub image_loader: ImageLoader,
}

impl AppServices {
    /// Build from configuration, selecting the credential backend it names.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = credential_store(config)?;
        Ok(Self::with_store(config, store, default_clock()))
    }

    /// Build around an explicit credential store and time source.
    pub fn with_store(
        config: &Config,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let http = HttpClient::builder()
            .connect_timeout(config.api.connect_timeout())
            .request_timeout(config.api.request_timeout())
            .build();
        let base_url = config.api.base_url.clone();

        let refresher = Arc::new(RefreshEndpoint::new(http.clone(), base_url.clone()));
        let session =
            Arc::new(SessionManager::new(store, refresher).with_clock(Arc::clone(&clock)));

        let images = Arc::new(
            ObjectCache::new(&config.cache.dir, config.cache.memory_limit)
                .with_clock(Arc::clone(&clock))
                .with_disk_timeout(config.cache.disk_timeout()),
        );
        let users = Arc::new(EntityCache::new().with_clock(Arc::clone(&clock)));
        let user_state = Arc::new(UserState::new());

        session.register_hook(images.clone());
        session.register_hook(users.clone());
        session.register_hook(user_state.clone());

        let api = Arc::new(
            ApiClient::new(http.clone(), base_url.clone(), Arc::clone(&session))
                .with_refresh_wait(config.api.refresh_wait()),
        );
        let auth = Arc::new(AuthService::new(Arc::clone(&api)));
        let directory = UserDirectory::new(Arc::clone(&api), users.clone(), user_state.clone());
        let image_loader = ImageLoader::new(http, base_url, images.clone());

        Self {
            config: Arc::new(config.clone()),
            clock,
            session,
            api,
            auth,
            images,
            users,
            user_state,
            directory,
            image_loader,
        }
    }
}

fn credential_store(config: &Config) -> anyhow::Result<Arc<dyn CredentialStore>> {
    match config.credentials.backend {
        CredentialBackend::Memory => {
            tracing::warn!("Using in-memory credential store; the session will not survive restarts");
            Ok(Arc::new(MemoryCredentialStore::new()))
        }
        #[cfg(feature = "system-keyring")]
        CredentialBackend::Keyring => Ok(Arc::new(auth::KeyringCredentialStore::with_service(
            config.credentials.service.clone(),
        ))),
        #[cfg(not(feature = "system-keyring"))]
        CredentialBackend::Keyring => anyhow::bail!(
            "credentials.backend = \"keyring\" requires the `system-keyring` feature"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_logout_clears_every_registered_component() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.cache.dir = dir.path().join("ImageCache");
        let clock = Arc::new(MockClock::new(
            chrono::Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
        ));
        let services =
            AppServices::with_store(&config, Arc::new(MemoryCredentialStore::new()), clock);

        services.session.save_tokens("a", "r", 3600).unwrap();
        services.session.set_authenticated(true);
        services.images.set("img", &b"bytes"[..]).await.unwrap();
        let profile: UserProfile =
            serde_json::from_str(r#"{"id": 5, "display_name": "Ana"}"#).unwrap();
        services.users.set(profile.clone());
        services.user_state.set(profile);

        services.session.force_logout().await;

        assert!(!services.session.is_logged_in());
        assert!(!services.session.is_authenticated());
        assert_eq!(services.images.memory_len(), 0);
        assert!(services.users.is_empty());
        assert!(services.user_state.get().is_none());
    }

    #[test]
    fn test_memory_backend_selected() {
        let mut config = Config::default();
        config.credentials.backend = CredentialBackend::Memory;
        assert_eq!(credential_store(&config).unwrap().name(), "memory");
    }
}
