//! Session lifecycle manager.
//!
//! Owns the credential triple, decides whether the access token is usable,
//! runs at most one refresh at a time, and tears the session down on logout.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::error::{CredentialError, RefreshError};
use super::store::{ACCESS_TOKEN_KEY, CredentialStore, REFRESH_TOKEN_KEY, TOKEN_EXPIRY_KEY};
use super::tokens::{AuthResponse, AuthToken, decode_expiry, encode_expiry, is_expired_at};
use super::traits::{LogoutHook, TokenRefresher};
use crate::clock::{Clock, default_clock};

/// Outcome shared between every caller waiting on one refresh.
pub type SharedRefresh = Shared<BoxFuture<'static, Result<(), RefreshError>>>;

/// Where the session currently stands, as observed right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoCredentials,
    Authenticated,
    Expired,
    Refreshing,
    LoggedOut,
}

/// A caller's stake in a refresh: either it started one or it joined one.
pub struct RefreshHandle {
    started: bool,
    flight: SharedRefresh,
}

impl RefreshHandle {
    /// Whether this caller started the refresh (as opposed to joining it).
    pub fn started_here(&self) -> bool {
        self.started
    }

    /// Wait for the refresh to finish.
    pub async fn wait(self) -> Result<(), RefreshError> {
        self.flight.await
    }

    /// Wait at most `limit`. `None` means the refresh is still running; it
    /// keeps running regardless.
    pub async fn wait_for(self, limit: Duration) -> Option<Result<(), RefreshError>> {
        tokio::time::timeout(limit, self.flight).await.ok()
    }
}

/// Manages the session's tokens.
///
/// Thread-safe. Construct once and share as `Arc<SessionManager>`; the
/// refresh path needs the `Arc` so the refresh can outlive its callers.
pub struct SessionManager {
    /// Only this lock reads or writes the credential triple.
    credentials: RwLock<Arc<dyn CredentialStore>>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    /// The refresh in flight, if any.
    refresh_slot: Mutex<Option<SharedRefresh>>,
    logging_out: AtomicBool,
    logged_out: AtomicBool,
    /// Bumped by every forced logout; a refresh only lands in the epoch it began in.
    logout_epoch: AtomicU64,
    authenticated: watch::Sender<bool>,
    hooks: RwLock<Vec<Arc<dyn LogoutHook>>>,
    teardown: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        let (authenticated, _) = watch::channel(false);
        Self {
            credentials: RwLock::new(store),
            refresher,
            clock: default_clock(),
            refresh_slot: Mutex::new(None),
            logging_out: AtomicBool::new(false),
            logged_out: AtomicBool::new(false),
            logout_epoch: AtomicU64::new(0),
            authenticated,
            hooks: RwLock::new(Vec::new()),
            teardown: tokio::sync::Mutex::new(()),
        }
    }

    /// Set the time source (useful for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // MARK: - Tokens

    /// Read the access token. Never refreshes.
    ///
    /// Fails with `NotFound` when nothing is stored and `Expired` once the
    /// stored expiry has been reached. A token without a readable expiry is
    /// treated as expired.
    pub fn get_access_token(&self) -> Result<String, CredentialError> {
        let store = self.credentials.read();
        let token = store.load(ACCESS_TOKEN_KEY)?;
        if token.is_empty() {
            return Err(CredentialError::InvalidData("empty access token".into()));
        }

        let expires_at = match store.load(TOKEN_EXPIRY_KEY) {
            Ok(raw) => decode_expiry(&raw),
            Err(CredentialError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        match expires_at {
            Some(at) if !is_expired_at(at, self.clock.now()) => Ok(token),
            _ => Err(CredentialError::Expired),
        }
    }

    pub fn get_refresh_token(&self) -> Result<String, CredentialError> {
        let token = self.credentials.read().load(REFRESH_TOKEN_KEY)?;
        if token.is_empty() {
            return Err(CredentialError::InvalidData("empty refresh token".into()));
        }
        Ok(token)
    }

    /// Persist a new token pair expiring `expires_in_secs` from now.
    pub fn save_tokens(
        &self,
        access_token: &str,
        refresh_token: &str,
        expires_in_secs: i64,
    ) -> Result<(), CredentialError> {
        self.write_tokens(access_token, refresh_token, expires_in_secs, None)
            .map(|_| ())
    }

    /// Write the token pair. With `epoch` set, the write is skipped (and
    /// `false` returned) when a forced logout has happened since.
    fn write_tokens(
        &self,
        access_token: &str,
        refresh_token: &str,
        expires_in_secs: i64,
        epoch: Option<u64>,
    ) -> Result<bool, CredentialError> {
        if access_token.is_empty() || refresh_token.is_empty() {
            return Err(CredentialError::InvalidToken);
        }

        let token = AuthToken {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_at: self.clock.now() + chrono::Duration::seconds(expires_in_secs),
        };

        let store = self.credentials.write();
        if epoch.is_some_and(|e| e != self.logout_epoch.load(Ordering::SeqCst)) {
            return Ok(false);
        }
        // A failure part way leaves a token with no expiry, which reads as expired.
        store.delete(TOKEN_EXPIRY_KEY)?;
        store.save(ACCESS_TOKEN_KEY, &token.access_token)?;
        store.save(REFRESH_TOKEN_KEY, &token.refresh_token)?;
        store.save(TOKEN_EXPIRY_KEY, &encode_expiry(token.expires_at))?;
        self.logged_out.store(false, Ordering::SeqCst);
        drop(store);

        debug!(expires_at = %token.expires_at, "Saved tokens");
        Ok(true)
    }

    /// Persist the tokens from a sign-in or refresh response.
    pub fn save_response(&self, response: &AuthResponse) -> Result<(), CredentialError> {
        self.save_tokens(
            &response.access_token,
            &response.refresh_token,
            response.expires_in,
        )
    }

    /// Remove all three values, expiry first.
    ///
    /// Every key is attempted; the first failure is returned.
    pub fn clear_tokens(&self) -> Result<(), CredentialError> {
        let store = self.credentials.write();
        let mut first_error = None;
        for key in [TOKEN_EXPIRY_KEY, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = store.delete(key) {
                warn!(key, "Failed to delete credential: {}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn is_logged_in(&self) -> bool {
        self.get_access_token().is_ok()
    }

    // MARK: - Flags

    pub fn is_logging_out(&self) -> bool {
        self.logging_out.load(Ordering::SeqCst)
    }

    /// Suppress authenticated traffic and refreshes until [`end_logout`](Self::end_logout).
    pub fn begin_logout(&self) {
        self.logging_out.store(true, Ordering::SeqCst);
    }

    pub fn end_logout(&self) {
        self.logging_out.store(false, Ordering::SeqCst);
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh_slot.lock().is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        *self.authenticated.borrow()
    }

    pub fn set_authenticated(&self, value: bool) {
        self.authenticated.send_replace(value);
    }

    /// Observe the global authenticated flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.authenticated.subscribe()
    }

    pub fn state(&self) -> SessionState {
        if self.is_refreshing() {
            return SessionState::Refreshing;
        }
        match self.get_access_token() {
            Ok(_) => SessionState::Authenticated,
            Err(CredentialError::Expired) => SessionState::Expired,
            Err(_) if self.logged_out.load(Ordering::SeqCst) => SessionState::LoggedOut,
            Err(_) => SessionState::NoCredentials,
        }
    }

    // MARK: - Refresh

    /// Start a refresh, or join the one already running.
    ///
    /// The refresh runs on its own task, so dropping every handle does not
    /// cancel it.
    pub fn begin_refresh(self: &Arc<Self>) -> RefreshHandle {
        let mut slot = self.refresh_slot.lock();
        if let Some(flight) = slot.as_ref() {
            debug!("Joining refresh in flight");
            return RefreshHandle {
                started: false,
                flight: flight.clone(),
            };
        }

        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(this.run_refresh())
                .catch_unwind()
                .await
                .unwrap_or(Err(RefreshError::Aborted));
            this.refresh_slot.lock().take();
            outcome
        });

        let flight = async move {
            task.await.unwrap_or_else(|e| {
                warn!("Refresh task did not complete: {}", e);
                Err(RefreshError::Aborted)
            })
        }
        .boxed()
        .shared();

        *slot = Some(flight.clone());
        RefreshHandle {
            started: true,
            flight,
        }
    }

    /// Refresh the token pair, joining any refresh already running.
    ///
    /// Failure does not log out; the caller decides what it means.
    pub async fn refresh(self: &Arc<Self>) -> bool {
        match self.begin_refresh().wait().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Token refresh failed: {}", e);
                false
            }
        }
    }

    async fn run_refresh(&self) -> Result<(), RefreshError> {
        let epoch = self.logout_epoch.load(Ordering::SeqCst);
        if self.is_logging_out() {
            return Err(RefreshError::LoggingOut);
        }
        let refresh_token = self
            .get_refresh_token()
            .map_err(|e| RefreshError::MissingRefreshToken(e.to_string()))?;

        debug!("Refreshing access token");
        let response = self
            .refresher
            .refresh(&refresh_token)
            .await
            .map_err(|e| RefreshError::Rejected(e.to_string()))?;

        // A logout that started mid-refresh wins.
        if self.is_logging_out() {
            return Err(RefreshError::LoggingOut);
        }
        let saved = self
            .write_tokens(
                &response.access_token,
                &response.refresh_token,
                response.expires_in,
                Some(epoch),
            )
            .map_err(|e| RefreshError::Store(e.to_string()))?;
        if !saved {
            debug!("Discarding refresh that finished after a logout");
            return Err(RefreshError::LoggingOut);
        }
        // Checked under the watch lock so a teardown's final `false` is never
        // overwritten.
        self.authenticated.send_if_modified(|flag| {
            if self.logout_epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            let changed = !*flag;
            *flag = true;
            changed
        });
        if self.logout_epoch.load(Ordering::SeqCst) != epoch {
            return Err(RefreshError::LoggingOut);
        }
        info!("Access token refreshed");
        Ok(())
    }

    // MARK: - Logout

    /// Register state to clear when the session ends.
    pub fn register_hook(&self, hook: Arc<dyn LogoutHook>) {
        self.hooks.write().push(hook);
    }

    /// Tear the session down: tokens, dependent caches, user state, and the
    /// authenticated flag. Safe to call repeatedly and concurrently.
    pub async fn force_logout(&self) {
        let _guard = self.teardown.lock().await;
        info!("Forcing logout");
        self.logout_epoch.fetch_add(1, Ordering::SeqCst);

        if let Err(e) = self.clear_tokens() {
            warn!("Failed to clear tokens during logout: {}", e);
        }

        let hooks = self.hooks.read().clone();
        futures::future::join_all(hooks.iter().map(|hook| async move {
            hook.on_logout().await;
            debug!(hook = hook.name(), "Logout hook finished");
        }))
        .await;

        self.logged_out.store(true, Ordering::SeqCst);
        self.set_authenticated(false);
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("store", &self.credentials.read().name())
            .field("logging_out", &self.is_logging_out())
            .field("refreshing", &self.is_refreshing())
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
