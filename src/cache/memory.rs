//! In-memory local cache.

use crate::cache::LocalCache;
use crate::error::{Result, StoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<String, String>>,
    writes: AtomicU64,
    fail_writes: AtomicBool,
}

/// Process-local cache. Clones share the same entries, so a test can keep a
/// handle while the store owns another.
#[derive(Clone, Default)]
pub struct MemoryCache {
    inner: Arc<Inner>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache pre-seeded with one entry.
    pub fn with_entry(key: &str, value: impl Into<String>) -> Self {
        let cache = Self::new();
        cache
            .inner
            .entries
            .lock()
            .insert(key.to_string(), value.into());
        cache
    }

    /// Number of successful `set` calls so far.
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent `set` fail with an IO error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "cache writes disabled",
            )));
        }
        self.inner
            .entries
            .lock()
            .insert(key.to_string(), value.to_string());
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.inner.entries.lock().remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_entries() {
        let cache = MemoryCache::new();
        let other = cache.clone();

        cache.set("k", "v").unwrap();
        assert_eq!(other.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(other.write_count(), 1);

        assert!(other.remove("k").unwrap());
        assert!(cache.get("k").unwrap().is_none());
    }

    #[test]
    fn test_failing_writes() {
        let cache = MemoryCache::with_entry("k", "old");
        cache.set_fail_writes(true);

        assert!(cache.set("k", "new").is_err());
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("old"));
        assert_eq!(cache.write_count(), 0);
    }
}
