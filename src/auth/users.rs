use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;

use super::traits::LogoutHook;
use crate::cache::Identified;

/// A user as returned by the details endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub currency: i64,
    #[serde(default)]
    pub friend_count: i64,
    /// Fields this client does not model, kept for round-tripping.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identified for UserProfile {
    type Id = i64;

    fn id(&self) -> i64 {
        self.id
    }
}

/// The signed-in user's profile, observable by the app layer.
#[derive(Debug)]
pub struct UserState {
    current: RwLock<Option<UserProfile>>,
    changes: watch::Sender<Option<i64>>,
}

impl UserState {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            current: RwLock::new(None),
            changes,
        }
    }

    pub fn get(&self) -> Option<UserProfile> {
        self.current.read().clone()
    }

    pub fn set(&self, profile: UserProfile) {
        let id = profile.id;
        *self.current.write() = Some(profile);
        self.changes.send_replace(Some(id));
    }

    pub fn clear(&self) {
        *self.current.write() = None;
        self.changes.send_replace(None);
    }

    /// Notified with the current user's id whenever it changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<i64>> {
        self.changes.subscribe()
    }
}

impl Default for UserState {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogoutHook for UserState {
    async fn on_logout(&self) {
        self.clear();
    }

    fn name(&self) -> &str {
        "user-state"
    }
}
