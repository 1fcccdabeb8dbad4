//! Two-tier object cache: a bounded LRU in memory over a file-backed tier.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::disk::DiskStore;
use super::types::{CacheStats, CacheStatsSnapshot, CachedObject};
use crate::auth::LogoutHook;
use crate::clock::{Clock, default_clock};

/// Objects live for 30 days in both tiers.
pub const OBJECT_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Default number of objects kept in memory.
pub const DEFAULT_MEMORY_LIMIT: usize = 200;

/// Default bound on a single disk lookup.
pub const DEFAULT_DISK_TIMEOUT: Duration = Duration::from_secs(5);

enum MemoryLookup {
    Hit(Bytes),
    Expired,
    Miss,
}

/// Tracks the newest pending disk write per key.
///
/// A background write only lands if its ticket is still current, so a
/// `remove` or `clear` issued after `set` is never undone by the write.
#[derive(Debug, Default)]
struct WriteLedger {
    next: u64,
    pending: HashMap<String, u64>,
}

impl WriteLedger {
    fn issue(&mut self, key: &str) -> u64 {
        self.next += 1;
        self.pending.insert(key.to_string(), self.next);
        self.next
    }

    fn is_current(&self, key: &str, ticket: u64) -> bool {
        self.pending.get(key) == Some(&ticket)
    }

    fn settle(&mut self, key: &str, ticket: u64) {
        if self.is_current(key, ticket) {
            self.pending.remove(key);
        }
    }

    fn forget(&mut self, key: &str) {
        self.pending.remove(key);
    }

    fn forget_all(&mut self) {
        self.pending.clear();
    }
}

/// Cache for binary resources such as images.
///
/// `get` and `set` are synchronous against the memory tier; the disk tier is
/// read by [`get_or_load`](Self::get_or_load) and written in the background.
/// Disk failures never reach the caller.
pub struct ObjectCache {
    memory: Mutex<LruCache<String, CachedObject>>,
    disk: Arc<tokio::sync::Mutex<DiskStore>>,
    writes: Arc<Mutex<WriteLedger>>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    disk_timeout: Duration,
    stats: CacheStats,
}

impl ObjectCache {
    /// Create a cache persisting under `dir`, holding at most `memory_limit`
    /// objects in memory. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>, memory_limit: usize) -> Self {
        let capacity = NonZeroUsize::new(memory_limit).unwrap_or(NonZeroUsize::MIN);
        Self {
            memory: Mutex::new(LruCache::new(capacity)),
            disk: Arc::new(tokio::sync::Mutex::new(DiskStore::new(dir))),
            writes: Arc::new(Mutex::new(WriteLedger::default())),
            clock: default_clock(),
            ttl: chrono::Duration::seconds(OBJECT_TTL_SECS),
            disk_timeout: DEFAULT_DISK_TIMEOUT,
            stats: CacheStats::new(),
        }
    }

    /// Set the time source (useful for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_disk_timeout(mut self, timeout: Duration) -> Self {
        self.disk_timeout = timeout;
        self
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of objects currently held in memory.
    pub fn memory_len(&self) -> usize {
        self.memory.lock().len()
    }

    fn lookup_memory(&self, key: &str, now: DateTime<Utc>) -> MemoryLookup {
        let mut memory = self.memory.lock();
        match memory.get(key) {
            None => return MemoryLookup::Miss,
            Some(entry) if !entry.is_expired(now, self.ttl) => {
                return MemoryLookup::Hit(entry.payload.clone());
            }
            Some(_) => {}
        }
        memory.pop(key);
        MemoryLookup::Expired
    }

    /// Memory-only lookup. An expired entry is evicted and reads as a miss.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        match self.lookup_memory(key, self.clock.now()) {
            MemoryLookup::Hit(payload) => {
                self.stats.record_memory_hit();
                Some(payload)
            }
            MemoryLookup::Expired => {
                self.stats.record_miss();
                self.spawn_disk_eviction(key);
                None
            }
            MemoryLookup::Miss => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Memory first, then disk. A disk hit is promoted into memory.
    pub async fn get_or_load(&self, key: &str) -> Option<Bytes> {
        let now = self.clock.now();
        match self.lookup_memory(key, now) {
            MemoryLookup::Hit(payload) => {
                self.stats.record_memory_hit();
                return Some(payload);
            }
            MemoryLookup::Expired => {
                debug!(key, "Memory entry expired");
                self.evict_disk(key).await;
                self.stats.record_miss();
                return None;
            }
            MemoryLookup::Miss => {}
        }

        let load = async {
            let disk = self.disk.lock().await;
            disk.load(key, now, self.ttl).await
        };
        let loaded = match tokio::time::timeout(self.disk_timeout, load).await {
            Ok(loaded) => loaded,
            Err(_) => {
                warn!(key, "Disk cache read timed out");
                None
            }
        };

        match loaded {
            Some(entry) => {
                self.stats.record_disk_hit();
                let payload = entry.payload.clone();
                self.memory.lock().put(key.to_string(), entry);
                Some(payload)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Insert into memory now and persist in the background.
    ///
    /// Must be called from within a Tokio runtime. The returned handle may be
    /// dropped; the write proceeds regardless.
    pub fn set(&self, key: &str, payload: impl Into<Bytes>) -> JoinHandle<()> {
        let entry = CachedObject::new(payload.into(), self.clock.now());
        self.memory.lock().put(key.to_string(), entry.clone());
        let ticket = self.writes.lock().issue(key);

        let disk = Arc::clone(&self.disk);
        let writes = Arc::clone(&self.writes);
        let key = key.to_string();
        tokio::spawn(async move {
            let disk = disk.lock().await;
            if !writes.lock().is_current(&key, ticket) {
                debug!(key, "Skipping superseded cache write");
                return;
            }
            if let Err(e) = disk.write(&key, &entry).await {
                warn!(key, "Failed to persist cache entry: {}", e);
            }
            writes.lock().settle(&key, ticket);
        })
    }

    /// Remove `key` from both tiers.
    pub async fn remove(&self, key: &str) {
        self.memory.lock().pop(key);
        self.evict_disk(key).await;
    }

    /// Empty memory, then wipe and recreate the disk directory.
    pub async fn clear(&self) {
        self.memory.lock().clear();
        self.writes.lock().forget_all();
        let disk = self.disk.lock().await;
        if let Err(e) = disk.clear().await {
            warn!(dir = %disk.dir().display(), "Failed to clear disk cache: {}", e);
        }
    }

    async fn evict_disk(&self, key: &str) {
        self.writes.lock().forget(key);
        self.disk.lock().await.remove(key).await;
    }

    fn spawn_disk_eviction(&self, key: &str) {
        self.writes.lock().forget(key);
        // Outside a runtime the stale files stay until the next get_or_load.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let disk = Arc::clone(&self.disk);
        let key = key.to_string();
        handle.spawn(async move {
            disk.lock().await.remove(&key).await;
        });
    }
}

impl std::fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCache")
            .field("memory_len", &self.memory_len())
            .field("ttl", &self.ttl)
            .field("disk_timeout", &self.disk_timeout)
            .finish()
    }
}

#[async_trait::async_trait]
impl LogoutHook for ObjectCache {
    async fn on_logout(&self) {
        self.clear().await;
    }

    fn name(&self) -> &str {
        "object-cache"
    }
}
