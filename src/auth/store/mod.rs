//! Credential storage implementations.

#[cfg(feature = "system-keyring")]
pub mod keyring;
pub mod memory;
pub mod trait_def;

// Re-exports
pub use memory::MemoryCredentialStore;
pub use trait_def::CredentialStore;

#[cfg(feature = "system-keyring")]
pub use keyring::KeyringCredentialStore;

/// Key holding the bearer access token.
pub const ACCESS_TOKEN_KEY: &str = "authToken";

/// Key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Key holding the access token's expiry, as unix seconds.
pub const TOKEN_EXPIRY_KEY: &str = "tokenExpiry";
