//! Keyring-based credential storage.

use super::CredentialStore;
use crate::auth::error::CredentialError;
use tracing::instrument;

/// Keyring-based credential storage.
///
/// Uses the system's native credential store. Each key becomes one keyring
/// entry under the configured service name.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    /// Service name for keyring entries.
    service: String,
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringCredentialStore {
    /// Service name for keyring entries.
    const SERVICE_NAME: &'static str = "carbn";

    /// Create a new KeyringCredentialStore with default service name.
    pub fn new() -> Self {
        Self {
            service: Self::SERVICE_NAME.to_string(),
        }
    }

    /// Create a KeyringCredentialStore with a custom service name.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Check if the system keyring is available.
    pub fn is_available() -> bool {
        match keyring::Entry::new("carbn-probe", "availability-check") {
            Ok(entry) => match entry.get_password() {
                Ok(_) => true,
                Err(keyring::Error::NoEntry) => true,
                Err(keyring::Error::NoStorageAccess(_)) => false,
                Err(keyring::Error::PlatformFailure(_)) => false,
                Err(_) => true,
            },
            Err(_) => false,
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, CredentialError> {
        keyring::Entry::new(&self.service, key)
            .map_err(|e| CredentialError::Backend(format!("Failed to create keyring entry: {}", e)))
    }
}

impl CredentialStore for KeyringCredentialStore {
    #[instrument(skip(self, value))]
    fn save(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| CredentialError::StoreWriteFailure(format!("Keyring error: {}", e)))
    }

    #[instrument(skip(self))]
    fn load(&self, key: &str) -> Result<String, CredentialError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(value),
            Err(keyring::Error::NoEntry) => Err(CredentialError::NotFound(key.to_string())),
            Err(keyring::Error::BadEncoding(_)) => Err(CredentialError::InvalidData(format!(
                "{} is not valid UTF-8",
                key
            ))),
            Err(e) => Err(CredentialError::Backend(format!("Keyring error: {}", e))),
        }
    }

    #[instrument(skip(self))]
    fn delete(&self, key: &str) -> Result<(), CredentialError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CredentialError::Backend(format!("Keyring error: {}", e))),
        }
    }

    fn name(&self) -> &str {
        "keyring"
    }
}
