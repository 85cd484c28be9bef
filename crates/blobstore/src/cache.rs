use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Bounded LRU map from raw location bytes to decoded values.
///
/// Shared by every thread reading one open blob store. All access goes
/// through a single lock; a lookup counts as a use and refreshes the entry.
/// Capacity 0 builds a disabled cache that never stores anything.
pub struct ValueCache {
    inner: Option<Mutex<LruCache<Vec<u8>, Vec<u8>>>>,
}

impl ValueCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn get(&self, location: &[u8]) -> Option<Vec<u8>> {
        let cache = self.inner.as_ref()?;
        cache.lock().get(location).cloned()
    }

    /// Inserts `value`, evicting the least recently used entry when full.
    pub fn insert(&self, location: &[u8], value: &[u8]) {
        if let Some(cache) = &self.inner {
            cache.lock().put(location.to_vec(), value.to_vec());
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |c| c.lock().len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.as_ref().map_or(0, |c| c.lock().cap().get())
    }

    pub fn clear(&self) {
        if let Some(cache) = &self.inner {
            cache.lock().clear();
        }
    }
}

impl std::fmt::Debug for ValueCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
