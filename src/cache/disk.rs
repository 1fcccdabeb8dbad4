//! Disk tier: one payload file and one JSON sidecar per entry.

use chrono::{DateTime, Duration, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

use super::key::{file_name, metadata_file_name};
use super::types::{CacheMetadata, CachedObject, DiskError};

/// Directory permissions (Unix only): owner read/write/execute.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// Content-addressed file store under a single directory.
///
/// Not synchronized; the object cache serializes access to it.
#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `(payload, metadata)` paths for `key`.
    pub fn paths(&self, key: &str) -> (PathBuf, PathBuf) {
        (
            self.dir.join(file_name(key)),
            self.dir.join(metadata_file_name(key)),
        )
    }

    /// Load a live entry. Expired, partial or unreadable entries are deleted
    /// and reported as absent.
    #[instrument(skip(self))]
    pub async fn load(&self, key: &str, now: DateTime<Utc>, ttl: Duration) -> Option<CachedObject> {
        match self.read_entry(key).await {
            Ok(None) => None,
            Ok(Some(entry)) if entry.is_expired(now, ttl) => {
                debug!("Disk entry expired");
                self.remove(key).await;
                None
            }
            Ok(Some(entry)) => Some(entry),
            Err(e) => {
                warn!("Discarding unreadable disk entry: {}", e);
                self.remove(key).await;
                None
            }
        }
    }

    async fn read_entry(&self, key: &str) -> Result<Option<CachedObject>, DiskError> {
        let (payload_path, metadata_path) = self.paths(key);
        let has_payload = tokio::fs::try_exists(&payload_path).await?;
        let has_metadata = tokio::fs::try_exists(&metadata_path).await?;
        match (has_payload, has_metadata) {
            (false, false) => return Ok(None),
            (true, true) => {}
            _ => return Err(DiskError::Incomplete),
        }

        let raw = tokio::fs::read(&metadata_path).await?;
        let metadata: CacheMetadata = serde_json::from_slice(&raw)?;
        let cached_at = metadata.cached_at().ok_or(DiskError::Timestamp)?;
        let payload = tokio::fs::read(&payload_path).await?;

        Ok(Some(CachedObject::new(payload.into(), cached_at)))
    }

    /// Write an entry: payload first, then metadata, each via temp file and rename.
    #[instrument(skip(self, entry), fields(bytes = entry.payload.len()))]
    pub async fn write(&self, key: &str, entry: &CachedObject) -> Result<(), DiskError> {
        self.ensure_dir().await?;
        let (payload_path, metadata_path) = self.paths(key);
        let metadata = serde_json::to_vec(&CacheMetadata::new(key, entry.cached_at))?;

        write_atomic(&payload_path, &entry.payload).await?;
        write_atomic(&metadata_path, &metadata).await?;
        Ok(())
    }

    /// Delete both files for `key`. Missing files are fine.
    #[instrument(skip(self))]
    pub async fn remove(&self, key: &str) {
        let (payload_path, metadata_path) = self.paths(key);
        for path in [payload_path, metadata_path] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), "Failed to remove cache file: {}", e),
            }
        }
    }

    /// Remove the whole directory, then recreate it empty.
    pub async fn clear(&self) -> Result<(), DiskError> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.ensure_dir().await
    }

    async fn ensure_dir(&self) -> Result<(), DiskError> {
        if tokio::fs::try_exists(&self.dir).await? {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.dir).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(DIR_MODE);
            tokio::fs::set_permissions(&self.dir, perms).await?;
        }
        Ok(())
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), DiskError> {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    tokio::fs::write(&temp_path, contents).await?;
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}
