use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// Cached object and its on-disk metadata
// ---------------------------------------------------------------------------

/// A payload and the instant it was cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedObject {
    pub payload: Bytes,
    pub cached_at: DateTime<Utc>,
}

impl CachedObject {
    pub fn new(payload: Bytes, cached_at: DateTime<Utc>) -> Self {
        Self { payload, cached_at }
    }

    /// Expired once strictly more than `ttl` has elapsed.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.cached_at > ttl
    }
}

/// Sidecar JSON written next to each payload file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheMetadata {
    /// Unix seconds, fractional.
    pub timestamp: f64,
    pub key: String,
}

impl CacheMetadata {
    pub fn new(key: &str, cached_at: DateTime<Utc>) -> Self {
        Self {
            timestamp: cached_at.timestamp_millis() as f64 / 1000.0,
            key: key.to_string(),
        }
    }

    pub fn cached_at(&self) -> Option<DateTime<Utc>> {
        if !self.timestamp.is_finite() {
            return None;
        }
        Utc.timestamp_millis_opt((self.timestamp * 1000.0).round() as i64)
            .single()
    }
}

// ---------------------------------------------------------------------------
// Stats (atomic counters, lock-free)
// ---------------------------------------------------------------------------

/// Runtime cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits_memory: AtomicU64,
    pub hits_disk: AtomicU64,
    pub misses: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_memory_hit(&self) {
        self.hits_memory.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disk_hit(&self) {
        self.hits_disk.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let memory = self.hits_memory.load(Ordering::Relaxed);
        let disk = self.hits_disk.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = memory + disk + misses;
        let hit_rate = if total > 0 {
            (memory + disk) as f64 / total as f64
        } else {
            0.0
        };
        CacheStatsSnapshot {
            hits_memory: memory,
            hits_disk: disk,
            misses,
            hit_rate,
        }
    }
}

/// Serializable snapshot of cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits_memory: u64,
    pub hits_disk: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Internal disk-tier failures. Never surfaced past the cache.
#[derive(Debug, thiserror::Error)]
pub enum DiskError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Invalid timestamp in metadata")]
    Timestamp,

    #[error("Payload and metadata files out of sync")]
    Incomplete,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
