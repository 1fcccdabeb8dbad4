use bytes::Bytes;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Every way a request through the API client can fail.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Not an HTTP response, or an empty body where one was required.
    #[error("Invalid response")]
    InvalidResponse,

    #[error("Decoding error: {0}")]
    Decoding(#[from] serde_json::Error),

    #[error("HTTP error {status}")]
    Http { status: u16, body: Bytes },

    #[error("Max retries exceeded")]
    MaxRetriesExceeded,

    #[error("Token expired")]
    TokenExpired,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    PaymentRequired(String),
}

/// Structured error payload the backend returns on failures.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerErrorBody {
    pub error: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
}

impl ApiError {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::PaymentRequired(_) => Some(403),
            _ => None,
        }
    }

    /// `400` and `404` are business-logic answers, never auth failures.
    pub fn is_business_error(&self) -> bool {
        matches!(self.status(), Some(400 | 404))
    }

    /// Parse the raw body of an `Http` error into a caller-chosen shape.
    pub fn parse_body<T: DeserializeOwned>(&self) -> Option<T> {
        match self {
            Self::Http { body, .. } => serde_json::from_slice(body).ok(),
            _ => None,
        }
    }

    /// Build the message carried by `PaymentRequired` from a 403 body.
    pub(crate) fn payment_required(body: &[u8]) -> Self {
        let message = serde_json::from_slice::<ServerErrorBody>(body)
            .ok()
            .and_then(|b| b.message.or(b.error))
            .or_else(|| {
                std::str::from_utf8(body)
                    .ok()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "Payment required".to_string());
        Self::PaymentRequired(message)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            tracing::warn!("Response body could not be read: {}", err);
            Self::InvalidResponse
        } else {
            tracing::warn!("Network error: {}", err);
            Self::Network(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_required_prefers_message() {
        let err = ApiError::payment_required(br#"{"error":"credits","message":"Out of credits"}"#);
        assert_eq!(err.to_string(), "Out of credits");
    }

    #[test]
    fn test_payment_required_falls_back_to_text() {
        let err = ApiError::payment_required(b"  buy more  ");
        assert_eq!(err.to_string(), "buy more");

        let err = ApiError::payment_required(b"");
        assert_eq!(err.to_string(), "Payment required");
    }

    #[test]
    fn test_business_error_classification() {
        let not_found = ApiError::Http {
            status: 404,
            body: Bytes::new(),
        };
        let server = ApiError::Http {
            status: 500,
            body: Bytes::new(),
        };
        assert!(not_found.is_business_error());
        assert!(!server.is_business_error());
        assert!(!ApiError::Unauthorized.is_business_error());
    }

    #[test]
    fn test_parse_body() {
        let err = ApiError::Http {
            status: 400,
            body: Bytes::from_static(br#"{"error":"bad","details":"name taken"}"#),
        };
        let parsed: ServerErrorBody = err.parse_body().unwrap();
        assert_eq!(parsed.details.as_deref(), Some("name taken"));
        assert!(ApiError::TokenExpired.parse_body::<ServerErrorBody>().is_none());
    }
}
