//! Shared setup for integration tests: services wired against a mock backend.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use carbn_client::AppServices;
use carbn_client::auth::MemoryCredentialStore;
use carbn_client::clock::MockClock;
use carbn_client::config::Config;
use chrono::TimeZone;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct Harness {
    pub server: MockServer,
    pub services: AppServices,
    pub clock: Arc<MockClock>,
    pub store: MemoryCredentialStore,
    _cache_dir: TempDir,
}

impl Harness {
    pub async fn start() -> Self {
        Self::with_refresh_wait(Duration::from_secs(5)).await
    }

    pub async fn with_refresh_wait(wait: Duration) -> Self {
        let server = MockServer::start().await;
        let cache_dir = tempfile::tempdir().expect("tempdir");

        let mut config = Config::default();
        config.api.base_url = server.uri();
        config.api.refresh_wait_ms = wait.as_millis() as u64;
        config.cache.dir = cache_dir.path().join("ImageCache");

        let clock = Arc::new(MockClock::new(
            chrono::Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(),
        ));
        let store = MemoryCredentialStore::new();
        let services = AppServices::with_store(&config, Arc::new(store.clone()), clock.clone());

        Self {
            server,
            services,
            clock,
            store,
            _cache_dir: cache_dir,
        }
    }

    /// Store a token pair valid for one hour.
    pub fn sign_in(&self, access: &str, refresh: &str) {
        self.services
            .session
            .save_tokens(access, refresh, 3600)
            .expect("save tokens");
        self.services.session.set_authenticated(true);
    }

    /// Move the clock past the access token's expiry.
    pub fn expire_token(&self) {
        self.clock.advance(chrono::Duration::seconds(3601));
    }

    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|r| r.len())
            .unwrap_or_default()
    }
}

pub fn auth_body(access: &str, refresh: &str) -> serde_json::Value {
    json!({
        "accessToken": access,
        "refreshToken": refresh,
        "tokenType": "Bearer",
        "expiresIn": 3600
    })
}

/// Mount a refresh endpoint that hands out `access`/`refresh`, expected `times` times.
pub async fn mount_refresh(server: &MockServer, access: &str, refresh: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_body(access, refresh)))
        .expect(times)
        .mount(server)
        .await;
}
