//! Generic HTTP client.

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, Method, RequestBuilder};
use std::time::Duration;
use uuid::Uuid;

/// Default user agent for the application.
pub const USER_AGENT: &str = concat!("carbn-client/", env!("CARGO_PKG_VERSION"));

/// Default connection timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying a per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Default request timeout.
///
/// Some backend operations run for minutes, so this is a ceiling on server
/// work rather than a latency budget.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(240);

/// Generic HTTP client wrapper.
///
/// Provides a standard configuration (User-Agent, timeouts) for the API
/// client, the refresh endpoint and the image loader.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
}

impl HttpClient {
    /// Create a new HTTP client with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new builder.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Get the inner reqwest client.
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// Start a request tagged with a fresh request id.
    ///
    /// Returns the id alongside the builder so callers can log it.
    pub fn request(&self, method: Method, url: reqwest::Url) -> (RequestBuilder, String) {
        let request_id = Uuid::new_v4().to_string();
        let builder = self
            .inner
            .request(method, url)
            .header(REQUEST_ID_HEADER, &request_id);
        (builder, request_id)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

/// Builder for [`HttpClient`].
pub struct HttpClientBuilder {
    builder: ClientBuilder,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            builder: Client::builder()
                .default_headers(default_headers())
                .user_agent(USER_AGENT)
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT),
        }
    }
}

impl HttpClientBuilder {
    /// Set a custom user agent.
    pub fn user_agent(mut self, ua: &str) -> Self {
        self.builder = self.builder.user_agent(ua);
        self
    }

    /// Set connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.builder = self.builder.connect_timeout(timeout);
        self
    }

    /// Set request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.builder = self.builder.timeout(timeout);
        self
    }

    /// Build the client.
    pub fn build(self) -> HttpClient {
        let inner = match self.builder.build() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Failed to build HTTP client with custom config: {}; using defaults", e);
                Client::default()
            }
        };
        HttpClient { inner }
    }
}
