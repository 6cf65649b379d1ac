//! Edge-side persistence: the snapshot file and its read cache

mod cache;
mod file;

pub use cache::{SNAPSHOT_CACHE_KEY, SnapshotCache, SnapshotCacheConfig};
pub use file::{DEFAULT_SNAPSHOT_PATH, SnapshotFile};
