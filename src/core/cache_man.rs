//! Frame cache memory budget and preload epoch.
//!
//! The byte budget bounds what the frame cache may hold on top of its entry
//! count limit. The epoch is the cancellation token for speculative loads:
//! every preload pass bumps it, and queued jobs carrying an older epoch are
//! dropped before they reach the decoder.

use log::{debug, info};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use sysinfo::System;

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Memory budget + epoch shared by the frame cache and its loader jobs.
#[derive(Debug)]
pub struct CacheManager {
    /// Bytes currently accounted to cached frames
    memory_usage: AtomicUsize,
    /// Byte limit; atomic so settings can change it through `&self`
    max_memory_bytes: AtomicUsize,
    /// Preload generation counter
    current_epoch: AtomicU64,
}

impl CacheManager {
    /// Budget derived from available system memory.
    ///
    /// * `mem_fraction` - fraction of available memory (0.0-1.0)
    /// * `reserve_gb` - memory kept back for the system
    pub fn new(mem_fraction: f64, reserve_gb: f64) -> Self {
        let limit = Self::limit_from_system(mem_fraction, reserve_gb);
        Self::with_limit(limit)
    }

    /// Budget with an explicit byte limit.
    pub fn with_limit(max_memory_bytes: usize) -> Self {
        Self {
            memory_usage: AtomicUsize::new(0),
            max_memory_bytes: AtomicUsize::new(max_memory_bytes),
            current_epoch: AtomicU64::new(0),
        }
    }

    /// No byte limit, only the cache's entry count applies.
    pub fn unlimited() -> Self {
        Self::with_limit(usize::MAX)
    }

    fn limit_from_system(mem_fraction: f64, reserve_gb: f64) -> usize {
        let mut sys = System::new();
        sys.refresh_memory();

        let available = sys.available_memory() as usize;
        let reserve = (reserve_gb.max(0.0) * GB) as usize;
        let usable = available.saturating_sub(reserve);
        let limit = (usable as f64 * mem_fraction.clamp(0.0, 1.0)) as usize;

        info!(
            "Frame cache budget: available={} MB, reserve={} MB, limit={} MB ({}%)",
            available / 1024 / 1024,
            reserve / 1024 / 1024,
            limit / 1024 / 1024,
            (mem_fraction * 100.0) as u32
        );
        limit
    }

    /// Start a new preload generation; returns it.
    pub fn increment_epoch(&self) -> u64 {
        let new_epoch = self.current_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("Epoch incremented: {}", new_epoch);
        new_epoch
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch.load(Ordering::Acquire)
    }

    /// True while no newer preload pass has started.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.current_epoch() == epoch
    }

    /// True when accounted bytes exceed the limit.
    pub fn check_memory_limit(&self) -> bool {
        self.memory_usage.load(Ordering::Relaxed) > self.max_memory_bytes.load(Ordering::Relaxed)
    }

    /// (usage, limit) in bytes
    pub fn mem(&self) -> (usize, usize) {
        let usage = self.memory_usage.load(Ordering::Relaxed);
        let limit = self.max_memory_bytes.load(Ordering::Relaxed);
        (usage, limit)
    }

    /// Usage as a fraction of the limit (0.0-1.0+)
    pub fn mem_usage_fraction(&self) -> f64 {
        let (usage, limit) = self.mem();
        if limit == 0 { 0.0 } else { usage as f64 / limit as f64 }
    }

    pub fn add_memory(&self, bytes: usize) {
        let new_usage = self.memory_usage.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let limit = self.max_memory_bytes.load(Ordering::Relaxed);
        if new_usage > limit {
            debug!(
                "Memory limit exceeded: {} MB / {} MB",
                new_usage / 1024 / 1024,
                limit / 1024 / 1024
            );
        }
    }

    /// Saturating: never underflows when accounting drifts.
    pub fn free_memory(&self, bytes: usize) {
        let _ = self
            .memory_usage
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    /// Recompute the limit from system memory (settings changed).
    pub fn set_memory_limit(&self, mem_fraction: f64, reserve_gb: f64) {
        let limit = Self::limit_from_system(mem_fraction, reserve_gb);
        self.max_memory_bytes.store(limit, Ordering::Relaxed);
    }

    pub fn set_limit_bytes(&self, bytes: usize) {
        self.max_memory_bytes.store(bytes, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_budget() {
        let manager = CacheManager::new(0.5, 1.0);
        assert_eq!(manager.current_epoch(), 0);
        let (usage, _limit) = manager.mem();
        assert_eq!(usage, 0);
    }

    #[test]
    fn test_epoch_token() {
        let manager = CacheManager::unlimited();
        let first = manager.increment_epoch();
        assert_eq!(first, 1);
        assert!(manager.is_current(first));

        let second = manager.increment_epoch();
        assert_eq!(second, 2);
        assert!(!manager.is_current(first));
        assert!(manager.is_current(second));
    }

    #[test]
    fn test_memory_tracking() {
        let manager = CacheManager::with_limit(1024);
        manager.add_memory(1000);
        assert!(!manager.check_memory_limit());
        manager.add_memory(100);
        assert!(manager.check_memory_limit());

        manager.free_memory(600);
        assert_eq!(manager.mem(), (500, 1024));

        // Saturating free
        manager.free_memory(10_000);
        assert_eq!(manager.mem().0, 0);
    }
}
