//! In-memory credential storage.

use super::CredentialStore;
use crate::auth::error::CredentialError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// In-memory credential storage.
///
/// Useful for testing and ephemeral sessions. The storage is Clone and
/// clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryCredentialStore {
    /// Create a new empty MemoryCredentialStore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a MemoryCredentialStore seeded with entries.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    /// Get the number of stored values.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Check if storage is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }
}

impl CredentialStore for MemoryCredentialStore {
    #[instrument(skip(self, value))]
    fn save(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        self.inner.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    #[instrument(skip(self))]
    fn load(&self, key: &str) -> Result<String, CredentialError> {
        self.inner
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| CredentialError::NotFound(key.to_string()))
    }

    #[instrument(skip(self))]
    fn delete(&self, key: &str) -> Result<(), CredentialError> {
        self.inner.write().remove(key);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

    #[test]
    fn test_memory_new_is_empty() {
        let storage = MemoryCredentialStore::new();
        assert!(matches!(
            storage.load(ACCESS_TOKEN_KEY),
            Err(CredentialError::NotFound(_))
        ));
        assert!(storage.is_empty());
    }

    #[test]
    fn test_memory_with_entries() {
        let storage = MemoryCredentialStore::with_entries([(ACCESS_TOKEN_KEY, "access")]);
        assert_eq!(storage.load(ACCESS_TOKEN_KEY).unwrap(), "access");
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_memory_save_overwrites() {
        let storage = MemoryCredentialStore::new();
        storage.save(REFRESH_TOKEN_KEY, "first").unwrap();
        storage.save(REFRESH_TOKEN_KEY, "second").unwrap();
        assert_eq!(storage.load(REFRESH_TOKEN_KEY).unwrap(), "second");
    }

    #[test]
    fn test_memory_delete_is_idempotent() {
        let storage = MemoryCredentialStore::with_entries([(ACCESS_TOKEN_KEY, "access")]);
        storage.delete(ACCESS_TOKEN_KEY).unwrap();
        storage.delete(ACCESS_TOKEN_KEY).unwrap();
        assert!(!storage.contains(ACCESS_TOKEN_KEY));
    }

    #[test]
    fn test_memory_clones_share_state() {
        let storage = MemoryCredentialStore::new();
        let other = storage.clone();
        storage.save(ACCESS_TOKEN_KEY, "shared").unwrap();
        assert_eq!(other.load(ACCESS_TOKEN_KEY).unwrap(), "shared");
    }
}
