use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Content-addressed file names
// ---------------------------------------------------------------------------

/// Suffix of the sidecar holding an entry's metadata.
pub const METADATA_SUFFIX: &str = ".metadata";

/// Map a logical cache key (usually a URL) to the file name of its payload.
///
/// Lowercase SHA-256 hex, so external strings never reach the filesystem.
pub fn file_name(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// File name of the metadata sidecar for `key`.
pub fn metadata_file_name(key: &str) -> String {
    format!("{}{}", file_name(key), METADATA_SUFFIX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
