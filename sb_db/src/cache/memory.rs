//! ABOUTME: Bounded in-process LRU tier that fronts the file cache
//! ABOUTME: Entries carry their own expiry so they never outlive the backing file

use linked_hash_map::LinkedHashMap;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// LRU map with per-entry TTL
#[derive(Debug)]
pub(crate) struct LruCache<T: Clone> {
    data: HashMap<String, CacheEntry<T>>,
    access_order: LinkedHashMap<String, ()>,
    max_size: usize,
}

impl<T: Clone> LruCache<T> {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            data: HashMap::new(),
            access_order: LinkedHashMap::new(),
            max_size,
        }
    }

    pub(crate) fn get(&mut self, key: &str) -> Option<T> {
        let expired = match self.data.get(key) {
            Some(entry) if !entry.is_expired() => {
                let value = entry.value.clone();
                self.access_order.remove(key);
                self.access_order.insert(key.to_string(), ());
                debug!("Memory tier hit for key: {}", key);
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.data.remove(key);
            self.access_order.remove(key);
            debug!("Memory tier entry expired for key: {}", key);
        }
        None
    }

    pub(crate) fn put(&mut self, key: String, value: T, ttl: Duration) {
        if self.max_size == 0 {
            return;
        }

        if self.data.remove(&key).is_some() {
            self.access_order.remove(&key);
        }

        while self.data.len() >= self.max_size {
            match self.access_order.pop_front() {
                Some((lru_key, _)) => {
                    self.data.remove(&lru_key);
                    debug!("Evicted LRU key: {}", lru_key);
                }
                None => break,
            }
        }

        self.data.insert(key.clone(), CacheEntry::new(value, ttl));
        self.access_order.insert(key, ());
    }

    pub(crate) fn invalidate(&mut self, key: &str) -> bool {
        if self.data.remove(key).is_some() {
            self.access_order.remove(key);
            return true;
        }
        false
    }

    /// Drop every entry whose key starts with `prefix`
    pub(crate) fn invalidate_prefix(&mut self, prefix: &str) -> usize {
        let doomed: Vec<String> = self
            .data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in &doomed {
            self.data.remove(key);
            self.access_order.remove(key);
        }
        doomed.len()
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear();
        self.access_order.clear();
    }

    pub(crate) fn size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_cache_basic_operations() {
        let mut cache = LruCache::new(2);

        cache.put("key1".to_string(), "value1".to_string(), Duration::from_secs(60));
        cache.put("key2".to_string(), "value2".to_string(), Duration::from_secs(60));

        assert_eq!(cache.get("key1"), Some("value1".to_string()));
        assert_eq!(cache.get("key2"), Some("value2".to_string()));
        assert_eq!(cache.size(), 2);
    }

    #[test]
    fn test_lru_cache_eviction() {
        let mut cache = LruCache::new(2);

        cache.put("key1".to_string(), 1, Duration::from_secs(60));
        cache.put("key2".to_string(), 2, Duration::from_secs(60));

        // key1 becomes most recently used
        cache.get("key1");

        cache.put("key3".to_string(), 3, Duration::from_secs(60));

        assert_eq!(cache.get("key1"), Some(1));
        assert_eq!(cache.get("key2"), None);
        assert_eq!(cache.get("key3"), Some(3));
    }

    #[test]
    fn test_lru_cache_ttl_expiry() {
        let mut cache = LruCache::new(10);

        cache.put("short".to_string(), 1, Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_lru_cache_prefix_invalidation() {
        let mut cache = LruCache::new(10);
        let ttl = Duration::from_secs(60);

        cache.put("query_companies_a".to_string(), 1, ttl);
        cache.put("query_companies_b".to_string(), 2, ttl);
        cache.put("query_news_a".to_string(), 3, ttl);

        assert_eq!(cache.invalidate_prefix("query_companies"), 2);
        assert_eq!(cache.get("query_news_a"), Some(3));
        assert!(cache.invalidate("query_news_a"));
        assert!(!cache.invalidate("query_news_a"));

        cache.put("x".to_string(), 4, ttl);
        cache.clear();
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_zero_capacity_never_stores() {
        let mut cache = LruCache::new(0);
        cache.put("k".to_string(), 1, Duration::from_secs(60));
        assert_eq!(cache.get("k"), None);
    }
}
