//! Per-processor bounded LRU cache.
//!
//! Each processor owns one cache per node, keyed by element key. An entry
//! is promoted to most-recently-used on every read and write; when the
//! cache grows past its capacity the least-recently-used entry is evicted.
//! Entries carry a last-access timestamp which feeds the [`CacheStats`]
//! report; eviction order comes from the recency list, not from time.
//!
//! All operations take a single lock and run O(1) critical sections, so the
//! cache is safe to share across the runtime's tasks.
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Instant;

use lru::LruCache;

struct Entry<V> {
    value: V,
    touched: Instant,
}

pub struct Cache<V> {
    inner: Mutex<LruCache<u64, Entry<V>>>,
}

/// A point-in-time snapshot of a cache's occupancy.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub len: usize,
    pub capacity: usize,
    /// Last-access time of the least-recently-used entry, if any.
    pub oldest_access: Option<Instant>,
}

impl<V: Clone> Cache<V> {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(to_capacity(capacity))),
        }
    }

    /// Returns the stored value and promotes it to most-recently-used.
    pub fn get(&self, key: u64) -> Option<V> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.get_mut(&key).map(|entry| {
            entry.touched = Instant::now();
            entry.value.clone()
        })
    }

    /// Inserts or overwrites, promoting the entry and evicting from the
    /// tail if the cache is over capacity.
    pub fn set(&self, key: u64, value: V) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.put(
            key,
            Entry {
                value,
                touched: Instant::now(),
            },
        );
    }

    /// Inserts only when the key is missing; an existing entry is promoted
    /// and left unchanged.
    pub fn set_if_absent(&self, key: u64, value: V) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        match inner.get_mut(&key) {
            Some(entry) => entry.touched = Instant::now(),
            None => {
                inner.put(
                    key,
                    Entry {
                        value,
                        touched: Instant::now(),
                    },
                );
            }
        }
    }

    /// Stores a contiguous run of values starting at `start`. The whole
    /// run is inserted under one lock acquisition, so all entries are
    /// visible before any subsequent `get`.
    pub fn set_slice(&self, start: u64, values: &[V]) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let now = Instant::now();
        for (i, value) in values.iter().enumerate() {
            inner.put(
                start + i as u64,
                Entry {
                    value: value.clone(),
                    touched: now,
                },
            );
        }
    }

    /// Removes the entry; returns whether it was present.
    pub fn delete(&self, key: u64) -> bool {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.pop(&key).is_some()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.clear();
    }

    /// Changes the capacity, evicting from the tail as needed.
    pub fn set_capacity(&self, capacity: u64) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.resize(to_capacity(capacity));
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("cache lock poisoned");
        CacheStats {
            len: inner.len(),
            capacity: inner.cap().get(),
            oldest_access: inner.peek_lru().map(|(_, entry)| entry.touched),
        }
    }
}

fn to_capacity(capacity: u64) -> NonZeroUsize {
    NonZeroUsize::new(capacity.max(1) as usize).expect("capacity clamped to >= 1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state() {
        let cache: Cache<i32> = Cache::new(5);
        let stats = cache.stats();
        assert_eq!(stats.len, 0);
        assert_eq!(stats.capacity, 5);
        assert!(stats.oldest_access.is_none());
    }

    #[test]
    fn set_inserts_value() {
        let cache = Cache::new(100);
        cache.set(100, 3);
        assert_eq!(cache.get(100), Some(3));
    }

    #[test]
    fn set_with_old_key_updates_value() {
        let cache = Cache::new(100);
        cache.set(101, 3);
        cache.set(101, 20);
        assert_eq!(cache.get(101), Some(20));
    }

    #[test]
    fn get_nonexistent() {
        let cache: Cache<i32> = Cache::new(100);
        assert_eq!(cache.get(333), None);
    }

    #[test]
    fn set_if_absent_keeps_existing() {
        let cache = Cache::new(100);
        cache.set(7, 1);
        cache.set_if_absent(7, 2);
        assert_eq!(cache.get(7), Some(1));
        cache.set_if_absent(8, 2);
        assert_eq!(cache.get(8), Some(2));
    }

    #[test]
    fn delete() {
        let cache = Cache::new(100);
        assert!(!cache.delete(101));
        cache.set(101, 1);
        assert!(cache.delete(101));
        assert_eq!(cache.stats().len, 0);
        assert_eq!(cache.get(101), None);
    }

    #[test]
    fn clear() {
        let cache = Cache::new(100);
        cache.set(100, 1);
        cache.clear();
        assert_eq!(cache.stats().len, 0);
    }

    #[test]
    fn capacity_is_obeyed() {
        let cache = Cache::new(3);
        cache.set(101, 1);
        cache.set(102, 1);
        cache.set(103, 1);
        assert_eq!(cache.stats().len, 3);
        // One more insert; something must be evicted to make room.
        cache.set(104, 1);
        assert_eq!(cache.stats().len, 3);
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let cache = Cache::new(3);
        cache.set(101, 1);
        cache.set(102, 1);
        cache.set(103, 1);
        // lru: [103, 102, 101]
        cache.get(103);
        cache.get(102);
        cache.get(101);
        // lru: [101, 102, 103]
        cache.set(100, 1);
        // lru: [100, 101, 102]
        assert_eq!(cache.get(103), None);
    }

    #[test]
    fn read_promotes_against_eviction() {
        let cache = Cache::new(3);
        cache.set(1, 1);
        cache.set(2, 2);
        cache.set(3, 3);
        cache.get(1);
        cache.set(4, 4);
        // 2 was the least recently used; 1 was promoted by the read.
        assert_eq!(cache.get(2), None);
        assert_eq!(cache.get(1), Some(1));
    }

    #[test]
    fn set_slice_fills_run() {
        let cache = Cache::new(100);
        cache.set_slice(40, &[0, 1, 2, 3]);
        for i in 0..4u64 {
            assert_eq!(cache.get(40 + i), Some(i as i32));
        }
        assert_eq!(cache.get(44), None);
    }

    #[test]
    fn shrinking_capacity_evicts() {
        let cache = Cache::new(10);
        for k in 0..10 {
            cache.set(k, k as i32);
        }
        cache.set_capacity(4);
        let stats = cache.stats();
        assert_eq!(stats.capacity, 4);
        assert_eq!(stats.len, 4);
        // The most recent inserts survive.
        assert_eq!(cache.get(9), Some(9));
        assert_eq!(cache.get(0), None);
    }
}
