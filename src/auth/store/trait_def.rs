//! Credential store trait.

use crate::auth::error::CredentialError;
use std::sync::Arc;

/// A durable string map for the session's credentials.
///
/// All implementations must be thread-safe (`Send + Sync`). Values are
/// scalar strings keyed by the fixed identifiers in [`super`].
pub trait CredentialStore: Send + Sync {
    /// Upsert a value. Fails with `StoreWriteFailure` if the backend rejects it.
    fn save(&self, key: &str, value: &str) -> Result<(), CredentialError>;

    /// Load a value. Fails with `NotFound` if absent and `InvalidData` if the
    /// stored bytes are not usable text.
    fn load(&self, key: &str) -> Result<String, CredentialError>;

    /// Delete a value. Absence is not an error.
    fn delete(&self, key: &str) -> Result<(), CredentialError>;

    /// Get the name of this storage backend.
    fn name(&self) -> &str;
}

// Blanket implementation for Arc<T>
impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    fn save(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        (**self).save(key, value)
    }
    fn load(&self, key: &str) -> Result<String, CredentialError> {
        (**self).load(key)
    }
    fn delete(&self, key: &str) -> Result<(), CredentialError> {
        (**self).delete(key)
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

// Blanket implementation for Box<T>
impl<T: CredentialStore + ?Sized> CredentialStore for Box<T> {
    fn save(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        (**self).save(key, value)
    }
    fn load(&self, key: &str) -> Result<String, CredentialError> {
        (**self).load(key)
    }
    fn delete(&self, key: &str) -> Result<(), CredentialError> {
        (**self).delete(key)
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}
