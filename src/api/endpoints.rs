//! Backend paths and URL resolution.

use crate::error::ApiError;
use url::Url;

pub const LOGOUT: &str = "/auth/logout";
pub const REFRESH: &str = "/auth/refresh";
pub const GOOGLE_SIGN_IN: &str = "/auth/google";
pub const APPLE_SIGN_IN: &str = "/auth/apple";

/// Id the backend resolves to the signed-in user.
pub const CURRENT_USER_ID: i64 = -1;

pub fn user_details(user_id: i64) -> String {
    format!("/user/{}/details", user_id)
}

/// Join an endpoint path (which may carry a query) onto the base URL.
pub fn resolve(base_url: &str, endpoint: &str) -> Result<Url, ApiError> {
    let base = base_url.trim_end_matches('/');
    let raw = if endpoint.starts_with('/') {
        format!("{}{}", base, endpoint)
    } else {
        format!("{}/{}", base, endpoint)
    };
    Url::parse(&raw).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", raw, e)))
}

/// Resolve a resource reference: absolute URLs pass through, anything else is
/// treated as a path under the base URL.
pub fn resolve_resource(base_url: &str, reference: &str) -> Result<Url, ApiError> {
    match Url::parse(reference) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
        _ => resolve(base_url, reference),
    }
}

/// Whether `endpoint` addresses `path`, ignoring any query string.
pub fn is_endpoint(endpoint: &str, path: &str) -> bool {
    endpoint.split('?').next() == Some(path)
}
