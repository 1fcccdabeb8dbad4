//! Offline caches.
//!
//! - [`ObjectCache`]: binary payloads (images) in a bounded memory tier over
//!   content-addressed files, 30-day TTL.
//! - [`EntityCache`]: small decoded records keyed by id, 5-minute TTL.
//!
//! Both expire lazily on read and are cleared on logout.

pub mod disk;
pub mod entity;
pub mod key;
pub mod object;
pub mod types;

pub use disk::DiskStore;
pub use entity::{ENTITY_TTL_SECS, EntityCache, Identified};
pub use object::{OBJECT_TTL_SECS, ObjectCache};
pub use types::{CacheStatsSnapshot, CachedObject};
