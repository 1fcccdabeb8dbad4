pub mod error;
pub mod service;
pub mod session;
pub mod store;
pub mod tokens;
pub mod traits;
pub mod users;

pub use error::{AuthError, CredentialError, RefreshError};
pub use service::{AuthService, MIN_DISPLAY_NAME_LEN, SignInProvider};
pub use session::{RefreshHandle, SessionManager, SessionState};
pub use store::{CredentialStore, MemoryCredentialStore};
pub use tokens::{AuthResponse, AuthToken};
pub use traits::{LogoutHook, TokenRefresher};
pub use users::{UserProfile, UserState};

#[cfg(feature = "system-keyring")]
pub use store::KeyringCredentialStore;
