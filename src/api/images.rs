//! Image downloads through the object cache.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::ACCEPT;
use tracing::{debug, instrument};

use super::endpoints::resolve_resource;
use crate::cache::ObjectCache;
use crate::error::ApiError;
use crate::net::HttpClient;

#[derive(Debug, Clone)]
pub struct ImageLoader {
    http: HttpClient,
    base_url: String,
    cache: Arc<ObjectCache>,
}

impl ImageLoader {
    pub fn new(http: HttpClient, base_url: impl Into<String>, cache: Arc<ObjectCache>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<ObjectCache> {
        &self.cache
    }

    /// Bytes for the image at `path`, a server path or an absolute URL.
    ///
    /// Cached under the resolved URL, so both spellings share one entry.
    #[instrument(skip(self))]
    pub async fn load(&self, path: &str) -> Result<Bytes, ApiError> {
        let url = resolve_resource(&self.base_url, path)?;
        let key = url.to_string();
        if let Some(bytes) = self.cache.get_or_load(&key).await {
            return Ok(bytes);
        }

        let (request, request_id) = self.http.request(Method::GET, url);
        debug!(request_id = %request_id, "Downloading image");
        let response = request.header(ACCEPT, "image/*").send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        if !(200..300).contains(&status) {
            return Err(ApiError::Http { status, body });
        }
        if body.is_empty() {
            return Err(ApiError::InvalidResponse);
        }
        self.cache.set(&key, body.clone());
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_second_load_served_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/uploads/car/9.jpg"))
            .and(header("accept", "image/*"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(ObjectCache::new(dir.path(), 8));
        let loader = ImageLoader::new(HttpClient::new(), server.uri(), cache.clone());

        assert_eq!(&loader.load("uploads/car/9.jpg").await.unwrap()[..], b"jpeg");
        let absolute = format!("{}/uploads/car/9.jpg", server.uri());
        assert_eq!(&loader.load(&absolute).await.unwrap()[..], b"jpeg");
        assert_eq!(cache.stats().hits_memory, 1);
    }

    #[tokio::test]
    async fn test_missing_image_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(ObjectCache::new(dir.path(), 8));
        let loader = ImageLoader::new(HttpClient::new(), server.uri(), cache.clone());

        for _ in 0..2 {
            assert!(matches!(
                loader.load("/missing.png").await,
                Err(ApiError::Http { status: 404, .. })
            ));
        }
        assert_eq!(cache.memory_len(), 0);
    }
}
