//! Authenticated request executor.
//!
//! One logical call runs: resolve token, send, interpret status, and on a
//! 401 at most one refresh followed by one replay.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{Instrument, debug, debug_span, warn};
use url::Url;

use super::endpoints::{self, LOGOUT};
use super::response::{Reply, decode_body};
use crate::auth::{CredentialError, RefreshError, SessionManager};
use crate::error::ApiError;
use crate::net::HttpClient;

/// Default bound on waiting for a refresh another caller started.
pub const DEFAULT_REFRESH_WAIT: Duration = Duration::from_secs(5);

/// Whether a call carries the session's bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    Bearer,
    /// Sign-in and logout: no token, and not gated by logout.
    Anonymous,
}

struct Call<'a> {
    method: Method,
    endpoint: &'a str,
    body: Option<Bytes>,
    auth: Auth,
}

/// Typed access to the backend.
pub struct ApiClient {
    http: HttpClient,
    base_url: String,
    session: Arc<SessionManager>,
    refresh_wait: Duration,
}

impl ApiClient {
    pub fn new(http: HttpClient, base_url: impl Into<String>, session: Arc<SessionManager>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            session,
            refresh_wait: DEFAULT_REFRESH_WAIT,
        }
    }

    /// Bound how long a call waits on a refresh it did not start.
    pub fn with_refresh_wait(mut self, wait: Duration) -> Self {
        self.refresh_wait = wait;
        self
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // MARK: - Typed requests

    pub async fn get<T: DeserializeOwned + 'static>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.execute(Method::GET, endpoint, None, Auth::Bearer).await
    }

    pub async fn post<T, B>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned + 'static,
        B: Serialize + ?Sized,
    {
        let body = encode(body)?;
        self.execute(Method::POST, endpoint, Some(body), Auth::Bearer).await
    }

    /// POST with no request body.
    pub async fn post_empty<T: DeserializeOwned + 'static>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.execute(Method::POST, endpoint, None, Auth::Bearer).await
    }

    pub async fn delete<T: DeserializeOwned + 'static>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.execute(Method::DELETE, endpoint, None, Auth::Bearer).await
    }

    pub async fn delete_with_body<T, B>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned + 'static,
        B: Serialize + ?Sized,
    {
        let body = encode(body)?;
        self.execute(Method::DELETE, endpoint, Some(body), Auth::Bearer).await
    }

    /// POST without a bearer token, for the auth endpoints.
    pub(crate) async fn post_anonymous<T, B>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned + 'static,
        B: Serialize + ?Sized,
    {
        let body = encode(body)?;
        self.execute(Method::POST, endpoint, Some(body), Auth::Anonymous).await
    }

    // MARK: - Execution

    async fn execute<T: DeserializeOwned + 'static>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Bytes>,
        auth: Auth,
    ) -> Result<T, ApiError> {
        let call = Call {
            method,
            endpoint,
            body,
            auth,
        };

        if call.auth == Auth::Bearer && self.session.is_logging_out() {
            debug!(endpoint, "Rejecting request during logout");
            return Err(ApiError::Unauthorized);
        }

        let url = endpoints::resolve(&self.base_url, call.endpoint)?;
        let (token, refreshed) = match call.auth {
            Auth::Bearer => {
                let (token, refreshed) = self.resolve_token().await?;
                (Some(token), refreshed)
            }
            Auth::Anonymous => (None, false),
        };

        match self.send(&call, url.clone(), token.as_deref()).await? {
            Reply::Success(body) => return self.finish(&call, &body),
            Reply::Failed(e) => return Err(e),
            Reply::Unauthorized => {}
        }

        if call.auth == Auth::Anonymous || self.session.is_logging_out() {
            return Err(ApiError::Unauthorized);
        }
        if refreshed {
            // The token was minted for this call; a second refresh would be a second retry.
            warn!(endpoint, "Fresh token rejected");
            self.session.force_logout().await;
            return Err(ApiError::MaxRetriesExceeded);
        }

        let rejected = token.unwrap_or_default();
        let token = match self.session.get_access_token() {
            // Another call already rotated the token this one was sent with.
            Ok(current) if current != rejected => {
                debug!(endpoint, "Received 401, replaying with the newer token");
                current
            }
            _ => {
                warn!(endpoint, "Received 401, refreshing token and replaying");
                self.refreshed_token().await?
            }
        };
        let failure = match self.send(&call, url, Some(&token)).await {
            Ok(Reply::Success(body)) => match self.finish(&call, &body) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            },
            Ok(Reply::Failed(e)) if e.is_business_error() => return Err(e),
            Ok(Reply::Unauthorized) => ApiError::Unauthorized,
            Ok(Reply::Failed(e)) | Err(e) => e,
        };
        warn!(endpoint, "Request failed after token refresh: {}", failure);
        self.session.force_logout().await;
        Err(ApiError::MaxRetriesExceeded)
    }

    /// A usable access token, refreshing once if the stored one has expired.
    /// The flag reports whether a refresh happened.
    async fn resolve_token(&self) -> Result<(String, bool), ApiError> {
        match self.session.get_access_token() {
            Ok(token) => Ok((token, false)),
            Err(CredentialError::Expired) => {
                debug!("Access token expired, refreshing");
                Ok((self.refreshed_token().await?, true))
            }
            Err(e) => {
                warn!("Cannot read access token: {}", e);
                self.session.force_logout().await;
                Err(ApiError::MaxRetriesExceeded)
            }
        }
    }

    /// Run or join a refresh, then read the new token.
    async fn refreshed_token(&self) -> Result<String, ApiError> {
        let handle = self.session.begin_refresh();
        let outcome = if handle.started_here() {
            Some(handle.wait().await)
        } else {
            handle.wait_for(self.refresh_wait).await
        };

        match outcome {
            None => {
                debug!("Refresh still in flight; giving up on this call");
                Err(ApiError::TokenExpired)
            }
            Some(Err(RefreshError::LoggingOut)) => Err(ApiError::Unauthorized),
            Some(Err(e)) => {
                warn!("Token refresh failed: {}", e);
                self.session.force_logout().await;
                Err(ApiError::MaxRetriesExceeded)
            }
            Some(Ok(())) => match self.session.get_access_token() {
                Ok(token) => Ok(token),
                Err(e) => {
                    warn!("Refreshed token unreadable: {}", e);
                    self.session.force_logout().await;
                    Err(ApiError::MaxRetriesExceeded)
                }
            },
        }
    }

    async fn send(&self, call: &Call<'_>, url: Url, token: Option<&str>) -> Result<Reply, ApiError> {
        let (mut request, request_id) = self.http.request(call.method.clone(), url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &call.body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let span = debug_span!(
            "api_request",
            method = %call.method,
            endpoint = call.endpoint,
            request_id = %request_id
        );
        async move {
            let response = request.send().await.map_err(ApiError::from)?;
            let status = response.status().as_u16();
            let body = response.bytes().await.map_err(ApiError::from)?;
            debug!(status, bytes = body.len(), "Response received");
            Ok(Reply::from_status(status, body))
        }
        .instrument(span)
        .await
    }

    fn finish<T: DeserializeOwned + 'static>(&self, call: &Call<'_>, body: &[u8]) -> Result<T, ApiError> {
        if call.method == Method::POST && endpoints::is_endpoint(call.endpoint, LOGOUT) {
            self.session.end_logout();
        }
        decode_body(body)
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Bytes, ApiError> {
    Ok(Bytes::from(serde_json::to_vec(body)?))
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("refresh_wait", &self.refresh_wait)
            .finish()
    }
}
