//! User lookups, read through the entity cache.

use std::sync::Arc;
use tracing::debug;

use super::client::ApiClient;
use super::endpoints::{CURRENT_USER_ID, user_details};
use crate::auth::{UserProfile, UserState};
use crate::cache::EntityCache;
use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct UserDirectory {
    api: Arc<ApiClient>,
    cache: Arc<EntityCache<UserProfile>>,
    current: Arc<UserState>,
}

impl UserDirectory {
    pub fn new(
        api: Arc<ApiClient>,
        cache: Arc<EntityCache<UserProfile>>,
        current: Arc<UserState>,
    ) -> Self {
        Self {
            api,
            cache,
            current,
        }
    }

    /// A user's profile, from cache when fresh.
    pub async fn user(&self, id: i64) -> Result<UserProfile, ApiError> {
        if let Some(profile) = self.cache.get(&id) {
            debug!(user_id = id, "User cache hit");
            return Ok(profile);
        }
        let profile: UserProfile = self.api.get(&user_details(id)).await?;
        self.cache.set(profile.clone());
        Ok(profile)
    }

    /// Fetch the signed-in user and publish it to the current-user state.
    pub async fn current_user(&self) -> Result<UserProfile, ApiError> {
        let profile: UserProfile = self.api.get(&user_details(CURRENT_USER_ID)).await?;
        self.current.set(profile.clone());
        self.cache.set(profile.clone());
        Ok(profile)
    }
}
