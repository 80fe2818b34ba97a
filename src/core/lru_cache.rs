//! Bounded key -> value cache with LRU eviction and an eviction callback.
//!
//! Backs the frame cache: keys are frame numbers, values are resource handles,
//! and the callback is where evicted handles get released.
//!
//! Every removal path goes through the callback exactly once per entry:
//! - capacity overflow on `set()` (least recently used first)
//! - replacing an existing key (old value, before the new one is installed)
//! - `delete()`, `clear()`, `set_capacity()` shrink, `evict_lru()`
//!
//! `get()` promotes to most-recently-used, `peek()`/`contains()` never touch recency.
//! Pinned keys are skipped by capacity eviction (the displayed frame lives there).

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::trace;
use lru::LruCache;

/// Called with every entry that leaves the cache.
pub type EvictFn<K, V> = Box<dyn FnMut(K, V) + Send>;

/// Cache statistics for monitoring performance
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.hits() + self.misses()
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 { 0.0 } else { self.hits() as f64 / total as f64 }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

/// Fixed-capacity LRU store.
///
/// Not internally synchronized: owners wrap it in a `Mutex` so that `set`,
/// eviction and the callback run as one atomic step.
pub struct BoundedCache<K, V> {
    /// Recency-ordered storage; unbounded, capacity is enforced here so every
    /// eviction passes through `on_evict`
    entries: LruCache<K, V>,
    capacity: usize,
    on_evict: Option<EvictFn<K, V>>,
    pinned: HashSet<K>,
    stats: Arc<CacheStats>,
}

impl<K: Hash + Eq, V> std::fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("pinned", &self.pinned.len())
            .finish()
    }
}

impl<K: Hash + Eq + Clone, V> BoundedCache<K, V> {
    /// Cache without eviction callback (evicted values are just dropped).
    ///
    /// Capacity below 1 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            capacity: capacity.max(1),
            on_evict: None,
            pinned: HashSet::new(),
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// Cache that hands every evicted entry to `on_evict`.
    pub fn with_evict(capacity: usize, on_evict: impl FnMut(K, V) + Send + 'static) -> Self {
        let mut cache = Self::new(capacity);
        cache.on_evict = Some(Box::new(on_evict));
        cache
    }

    /// Look up and promote to most-recently-used.
    ///
    /// Presence is decided by the key alone, so a stored "empty" value
    /// (e.g. `None` in a `BoundedCache<K, Option<T>>`) is returned and promoted too.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if !self.entries.contains(key) {
            self.stats.record_miss();
            return None;
        }
        self.stats.record_hit();
        self.entries.get(key)
    }

    /// Look up without changing recency order.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.peek(key)
    }

    /// Mark as most-recently-used without counting a hit. Returns false if absent.
    pub fn promote(&mut self, key: &K) -> bool {
        if !self.entries.contains(key) {
            return false;
        }
        self.entries.promote(key);
        true
    }

    /// Presence check without changing recency order. Agrees with `peek`/`get`.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    /// Insert or replace.
    ///
    /// Replacing hands the old value to the eviction callback before the new
    /// value is installed. Afterwards LRU entries are evicted until the cache
    /// fits its capacity again.
    pub fn set(&mut self, key: K, value: V) {
        if let Some(old) = self.entries.pop(&key) {
            trace!("BoundedCache: replacing existing entry");
            self.notify(key.clone(), old);
        }
        self.entries.put(key, value);
        self.trim();
    }

    /// Remove one entry, invoking the eviction callback. Returns true if it existed.
    pub fn delete(&mut self, key: &K) -> bool {
        match self.entries.pop_entry(key) {
            Some((k, v)) => {
                self.pinned.remove(key);
                self.notify(k, v);
                true
            }
            None => false,
        }
    }

    /// Remove every entry, oldest first, invoking the callback once per entry.
    pub fn clear(&mut self) {
        // Snapshot keys: the callback path mutates `entries`
        let keys: Vec<K> = self.entries.iter().rev().map(|(k, _)| k.clone()).collect();
        for key in keys {
            if let Some((k, v)) = self.entries.pop_entry(&key) {
                self.notify(k, v);
            }
        }
        self.pinned.clear();
    }

    /// Change capacity; shrinking evicts LRU entries until `len <= capacity`.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.trim();
    }

    /// Evict the least-recently-used unpinned entry. Returns its key.
    pub fn evict_lru(&mut self) -> Option<K> {
        let victim = self
            .entries
            .iter()
            .rev()
            .map(|(k, _)| k)
            .find(|k| !self.pinned.contains(*k))
            .cloned()?;
        let (k, v) = self.entries.pop_entry(&victim)?;
        self.stats.record_eviction();
        self.notify(k, v);
        Some(victim)
    }

    /// Exempt a key from capacity eviction. The key need not be present yet.
    pub fn pin(&mut self, key: K) {
        self.pinned.insert(key);
    }

    pub fn unpin(&mut self, key: &K) {
        self.pinned.remove(key);
    }

    pub fn is_pinned(&self, key: &K) -> bool {
        self.pinned.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys from most- to least-recently-used.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    fn trim(&mut self) {
        while self.entries.len() > self.capacity {
            if self.evict_lru().is_none() {
                // Everything left is pinned
                break;
            }
        }
    }

    fn notify(&mut self, key: K, value: V) {
        match self.on_evict.as_mut() {
            Some(cb) => cb(key, value),
            None => drop(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<(i32, &'static str)>>>;

    fn logged_cache(capacity: usize) -> (BoundedCache<i32, &'static str>, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let cache = BoundedCache::with_evict(capacity, move |k, v| sink.lock().unwrap().push((k, v)));
        (cache, log)
    }

    fn sorted_keys<V>(cache: &BoundedCache<i32, V>) -> Vec<i32> {
        let mut keys: Vec<i32> = cache.keys().copied().collect();
        keys.sort();
        keys
    }

    #[test]
    fn test_set_then_get() {
        let (mut cache, _) = logged_cache(4);
        cache.set(1, "a");
        assert!(cache.contains(&1));
        assert_eq!(cache.get(&1), Some(&"a"));
        assert_eq!(cache.peek(&1), Some(&"a"));
    }

    #[test]
    fn test_empty_value_is_still_present() {
        let mut cache: BoundedCache<i32, Option<u32>> = BoundedCache::new(2);
        cache.set(1, None);
        cache.set(2, Some(7));

        assert!(cache.contains(&1));
        assert_eq!(cache.peek(&1), Some(&None));
        // get() promotes the empty entry, so 2 becomes the LRU victim
        assert_eq!(cache.get(&1), Some(&None));
        cache.set(3, Some(9));
        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
    }

    #[test]
    fn test_capacity_scenario() {
        let (mut cache, log) = logged_cache(4);
        for f in 8..=11 {
            cache.set(f, "frame");
        }
        assert_eq!(sorted_keys(&cache), vec![8, 9, 10, 11]);

        cache.set(12, "frame");
        assert_eq!(sorted_keys(&cache), vec![9, 10, 11, 12]);
        assert_eq!(*log.lock().unwrap(), vec![(8, "frame")]);
    }

    #[test]
    fn test_get_protects_peek_does_not() {
        let (mut cache, log) = logged_cache(3);
        cache.set(1, "a");
        cache.set(2, "b");
        cache.set(3, "c");

        // peek leaves 1 as the LRU victim
        assert_eq!(cache.peek(&1), Some(&"a"));
        cache.set(4, "d");
        assert!(!cache.contains(&1));

        // get moves 2 to the front, so 3 goes next
        assert_eq!(cache.get(&2), Some(&"b"));
        cache.set(5, "e");
        assert!(cache.contains(&2));
        assert!(!cache.contains(&3));

        let evicted: Vec<i32> = log.lock().unwrap().iter().map(|(k, _)| *k).collect();
        assert_eq!(evicted, vec![1, 3]);
    }

    #[test]
    fn test_promote_reorders_without_hit() {
        let (mut cache, log) = logged_cache(3);
        let stats = cache.stats();
        cache.set(1, "a");
        cache.set(2, "b");
        cache.set(3, "c");

        assert!(cache.promote(&1));
        assert!(!cache.promote(&9));
        cache.set(4, "d");
        assert!(cache.contains(&1));
        assert_eq!(*log.lock().unwrap(), vec![(2, "b")]);
        assert_eq!(stats.hits(), 0);
        assert_eq!(stats.misses(), 0);
        assert_eq!(format!("{:?}", cache), "BoundedCache { len: 3, capacity: 3, pinned: 0 }");
    }

    #[test]
    fn test_replace_evicts_old_value() {
        let (mut cache, log) = logged_cache(4);
        cache.set(1, "old");
        cache.set(1, "new");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.peek(&1), Some(&"new"));
        assert_eq!(*log.lock().unwrap(), vec![(1, "old")]);
    }

    #[test]
    fn test_delete_invokes_callback() {
        let (mut cache, log) = logged_cache(4);
        cache.set(1, "a");
        assert!(cache.delete(&1));
        assert!(!cache.delete(&1));
        assert!(cache.is_empty());
        assert_eq!(*log.lock().unwrap(), vec![(1, "a")]);
    }

    #[test]
    fn test_clear_visits_every_entry_once() {
        let (mut cache, log) = logged_cache(8);
        for f in 0..5 {
            cache.set(f, "x");
        }
        cache.clear();
        assert!(cache.is_empty());

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 5);
        let mut keys: Vec<i32> = log.iter().map(|(k, _)| *k).collect();
        keys.sort();
        assert_eq!(keys, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_shrink_capacity_evicts_oldest() {
        let (mut cache, log) = logged_cache(5);
        for f in 0..5 {
            cache.set(f, "x");
        }
        cache.set_capacity(2);
        assert_eq!(cache.capacity(), 2);
        assert_eq!(sorted_keys(&cache), vec![3, 4]);
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_pinned_key_survives_pressure() {
        let (mut cache, _) = logged_cache(2);
        cache.set(50, "center");
        cache.pin(50);
        for f in 51..60 {
            cache.set(f, "ahead");
        }
        assert!(cache.contains(&50));
        assert_eq!(cache.len(), 2);

        cache.unpin(&50);
        cache.set(70, "x");
        assert!(!cache.contains(&50));
    }

    #[test]
    fn test_all_pinned_overflows_instead_of_looping() {
        let mut cache: BoundedCache<i32, u8> = BoundedCache::new(1);
        cache.pin(1);
        cache.pin(2);
        cache.set(1, 0);
        cache.set(2, 0);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.evict_lru(), None);
    }

    #[test]
    fn test_stats() {
        let mut cache: BoundedCache<i32, u8> = BoundedCache::new(1);
        let stats = cache.stats();
        cache.set(1, 1);
        let _ = cache.get(&1);
        let _ = cache.get(&2);
        cache.set(2, 2);
        assert_eq!(stats.hits(), 1);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.evictions(), 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }
}
