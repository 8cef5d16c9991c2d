//! Local snapshot cache.
//!
//! A synchronous key-value store that survives restarts. The engine keeps the
//! last known snapshot under a single key. A missing or unreadable entry is
//! never fatal: it reads as "no cached snapshot".

mod file;
mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

use crate::error::Result;
use crate::types::Snapshot;

/// Default key the snapshot is cached under.
pub const DEFAULT_CACHE_KEY: &str = "vitalstore.snapshot";

/// Synchronous key-value persistence.
pub trait LocalCache: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`. Returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool>;
}

/// Load the cached snapshot, falling back to an empty one.
///
/// Read and parse failures are logged and treated as a cold start.
pub fn load_snapshot(cache: &dyn LocalCache, key: &str) -> Snapshot {
    let text = match cache.get(key) {
        Ok(Some(text)) => text,
        Ok(None) => return Snapshot::default(),
        Err(e) if e.is_local_decode() => {
            tracing::warn!(key, error = %e, "cached snapshot corrupt, starting empty");
            return Snapshot::default();
        }
        Err(e) => {
            tracing::error!(key, error = %e, "cached snapshot unreadable, starting empty");
            return Snapshot::default();
        }
    };

    match Snapshot::from_json_str(&text) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!(key, error = %e, "cached snapshot failed to parse, starting empty");
            Snapshot::default()
        }
    }
}

/// Write the snapshot to the cache.
pub fn store_snapshot(cache: &dyn LocalCache, key: &str, snapshot: &Snapshot) -> Result<()> {
    cache.set(key, &snapshot.to_json_string()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_entry_is_empty_snapshot() {
        let cache = MemoryCache::new();
        assert_eq!(load_snapshot(&cache, DEFAULT_CACHE_KEY), Snapshot::default());
    }

    #[test]
    fn test_garbage_entry_is_empty_snapshot() {
        let cache = MemoryCache::with_entry(DEFAULT_CACHE_KEY, "{not json");
        assert_eq!(load_snapshot(&cache, DEFAULT_CACHE_KEY), Snapshot::default());
    }

    #[test]
    fn test_store_then_load() {
        let cache = MemoryCache::new();
        let mut snapshot = Snapshot::default();
        snapshot.water = 300.0;
        snapshot.profile.name = "Ana".into();

        store_snapshot(&cache, DEFAULT_CACHE_KEY, &snapshot).unwrap();
        assert_eq!(load_snapshot(&cache, DEFAULT_CACHE_KEY), snapshot);
    }
}
