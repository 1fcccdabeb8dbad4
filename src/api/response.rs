//! Status interpretation and body decoding.

use bytes::Bytes;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Deserializer};
use std::any::TypeId;

use crate::error::ApiError;

/// Expected result of endpoints that answer with no meaningful body.
///
/// The only result type for which an empty body decodes successfully.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoContent;

impl<'de> Deserialize<'de> for NoContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IgnoredAny::deserialize(deserializer)?;
        Ok(NoContent)
    }
}

/// First-pass reading of an HTTP status.
#[derive(Debug)]
pub(crate) enum Reply {
    Success(Bytes),
    /// A 401; what it means depends on the call.
    Unauthorized,
    Failed(ApiError),
}

impl Reply {
    pub(crate) fn from_status(status: u16, body: Bytes) -> Self {
        match status {
            200..=299 => Self::Success(body),
            401 => Self::Unauthorized,
            403 => Self::Failed(ApiError::payment_required(&body)),
            _ => Self::Failed(ApiError::Http { status, body }),
        }
    }
}

/// Decode a success body into `T`.
///
/// An empty body is only valid for [`NoContent`]. A JSON `null` where a
/// sequence is expected decodes as an empty sequence.
pub fn decode_body<T: DeserializeOwned + 'static>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        if TypeId::of::<T>() == TypeId::of::<NoContent>() {
            return Ok(serde_json::from_slice(b"null")?);
        }
        return Err(ApiError::InvalidResponse);
    }

    match serde_json::from_slice::<T>(body) {
        Ok(value) => Ok(value),
        Err(e) if is_null(body) => serde_json::from_slice::<T>(b"[]").map_err(|_| ApiError::Decoding(e)),
        Err(e) => Err(ApiError::Decoding(e)),
    }
}

fn is_null(body: &[u8]) -> bool {
    body.trim_ascii() == b"null"
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Car {
        id: i64,
    }

    #[test]
    fn test_null_array_is_empty() {
        let cars: Vec<Car> = decode_body(b"null").unwrap();
        assert!(cars.is_empty());
        let cars: Vec<Car> = decode_body(b" null\n").unwrap();
        assert!(cars.is_empty());
    }

    #[test]
    fn test_null_object_is_decoding_error() {
        assert!(matches!(decode_body::<Car>(b"null"), Err(ApiError::Decoding(_))));
        let maybe: Option<Car> = decode_body(b"null").unwrap();
        assert_eq!(maybe, None);
    }

    #[test]
    fn test_empty_body_only_for_no_content() {
        assert_eq!(decode_body::<NoContent>(b"").unwrap(), NoContent);
        assert!(matches!(decode_body::<Car>(b""), Err(ApiError::InvalidResponse)));
        assert!(matches!(
            decode_body::<Vec<Car>>(b"  "),
            Err(ApiError::InvalidResponse)
        ));
    }

    #[test]
    fn test_no_content_ignores_body() {
        assert_eq!(
            decode_body::<NoContent>(br#"{"message":"ok"}"#).unwrap(),
            NoContent
        );
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(decode_body::<Car>(b"{\"id\":"), Err(ApiError::Decoding(_))));
        let car: Car = decode_body(br#"{"id":3}"#).unwrap();
        assert_eq!(car, Car { id: 3 });
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(Reply::from_status(204, Bytes::new()), Reply::Success(_)));
        assert!(matches!(Reply::from_status(401, Bytes::new()), Reply::Unauthorized));
        assert!(matches!(
            Reply::from_status(403, Bytes::from_static(br#"{"message":"Top up"}"#)),
            Reply::Failed(ApiError::PaymentRequired(m)) if m == "Top up"
        ));
        assert!(matches!(
            Reply::from_status(502, Bytes::from_static(b"bad gateway")),
            Reply::Failed(ApiError::Http { status: 502, .. })
        ));
    }
}
