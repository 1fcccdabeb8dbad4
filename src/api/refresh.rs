//! The token refresh call, as seen by the session manager.

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tracing::{debug, warn};

use super::endpoints::{self, REFRESH};
use super::response::{Reply, decode_body};
use crate::auth::{AuthResponse, TokenRefresher};
use crate::error::ApiError;
use crate::net::HttpClient;

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Exchanges a refresh token for a new token pair.
///
/// Talks to the transport directly so a refresh never re-enters the
/// executor's 401 handling.
#[derive(Debug, Clone)]
pub struct RefreshEndpoint {
    http: HttpClient,
    base_url: String,
}

impl RefreshEndpoint {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for RefreshEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ApiError> {
        let url = endpoints::resolve(&self.base_url, REFRESH)?;
        let body = serde_json::to_vec(&RefreshRequest { refresh_token })?;
        let (request, request_id) = self.http.request(Method::POST, url);

        debug!(request_id = %request_id, "Refreshing access token");
        let response = request
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        match Reply::from_status(status, body) {
            Reply::Success(body) => decode_body(&body),
            Reply::Unauthorized => {
                warn!(request_id = %request_id, "Refresh token rejected");
                Err(ApiError::MaxRetriesExceeded)
            }
            Reply::Failed(e) => Err(e),
        }
    }
}
