use std::{collections::HashMap, hash::Hash};

/// Retention hook for the session caches.
///
/// The default policy keeps every entry for the lifetime of the cache.
pub trait CachePolicy<K>: Send + Sync {
    /// Whether a cached entry may still be served.
    fn is_valid(&self, _key: &K) -> bool {
        true
    }

    /// Observe an insert.
    fn on_insert(&mut self, _key: &K) {}

    /// Key to evict after an insert brought the cache to `len` entries.
    fn next_eviction(&mut self, _len: usize) -> Option<K> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetainForever;

impl<K> CachePolicy<K> for RetainForever {}

/// Session scoped map with a pluggable retention policy.
///
/// Not synchronized; callers sharing one across tasks must lock around it.
pub struct SessionCache<K, V> {
    entries: HashMap<K, V>,
    policy: Box<dyn CachePolicy<K>>,
}

impl<K: Eq + Hash, V> Default for SessionCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V> SessionCache<K, V> {
    pub fn new() -> Self {
        Self::with_policy(RetainForever)
    }

    pub fn with_policy(policy: impl CachePolicy<K> + 'static) -> Self {
        Self {
            entries: HashMap::new(),
            policy: Box::new(policy),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.entries.contains_key(key) && !self.policy.is_valid(key) {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.policy.on_insert(&key);
        self.entries.insert(key, value);
        while let Some(victim) = self.policy.next_eviction(self.entries.len()) {
            if self.entries.remove(&victim).is_none() {
                break;
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K, V> std::fmt::Debug for SessionCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("len", &self.entries.len())
            .finish()
    }
}
