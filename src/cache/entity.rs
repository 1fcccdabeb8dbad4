//! Short-lived in-memory cache for small records keyed by their own id.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::auth::LogoutHook;
use crate::clock::{Clock, default_clock};

/// Entities live for five minutes.
pub const ENTITY_TTL_SECS: i64 = 5 * 60;

/// A record that knows its own cache key.
pub trait Identified {
    type Id: Eq + Hash + Clone + Debug + Send + Sync;

    fn id(&self) -> Self::Id;
}

struct Entry<T> {
    value: T,
    cached_at: DateTime<Utc>,
}

/// Id-keyed cache with a fixed TTL, checked on read.
///
/// All access goes through one mutex.
pub struct EntityCache<T: Identified> {
    entries: Mutex<HashMap<T::Id, Entry<T>>>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
}

impl<T: Identified + Clone> EntityCache<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock: default_clock(),
            ttl: chrono::Duration::seconds(ENTITY_TTL_SECS),
        }
    }

    /// Set the time source (useful for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The cached value, unless absent or expired. Expired entries are dropped.
    pub fn get(&self, id: &T::Id) -> Option<T> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match entries.get(id) {
            None => return None,
            Some(entry) if now - entry.cached_at <= self.ttl => return Some(entry.value.clone()),
            Some(_) => {}
        }
        entries.remove(id);
        None
    }

    /// Cache `value` under its own id, replacing any previous entry.
    pub fn set(&self, value: T) {
        let entry = Entry {
            cached_at: self.clock.now(),
            value,
        };
        self.entries.lock().insert(entry.value.id(), entry);
    }

    pub fn remove(&self, id: &T::Id) {
        self.entries.lock().remove(id);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Entries held, including expired ones not yet observed.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Identified + Clone> Default for EntityCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Identified + Clone> Debug for EntityCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("len", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[async_trait::async_trait]
impl<T> LogoutHook for EntityCache<T>
where
    T: Identified + Clone + Send + Sync + 'static,
{
    async fn on_logout(&self) {
        self.clear();
    }

    fn name(&self) -> &str {
        "entity-cache"
    }
}
