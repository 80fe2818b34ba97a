//! Test-only resources that count their releases.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::handle::Resource;

/// Shared release counter for a family of test resources.
#[derive(Debug, Clone, Default)]
pub struct ReleaseCounter {
    releases: Arc<AtomicUsize>,
}

impl ReleaseCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(&self, id: i32) -> Arc<CountingResource> {
        Arc::new(CountingResource::reusable(self, id))
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

/// Resource that bumps its counter on the first `release()` only.
#[derive(Debug)]
pub struct CountingResource {
    id: i32,
    mem: usize,
    released: AtomicBool,
    counter: Arc<AtomicUsize>,
}

impl CountingResource {
    pub fn reusable(counter: &ReleaseCounter, id: i32) -> Self {
        Self::with_mem(counter, id, 0)
    }

    pub fn with_mem(counter: &ReleaseCounter, id: i32, mem: usize) -> Self {
        Self {
            id,
            mem,
            released: AtomicBool::new(false),
            counter: Arc::clone(&counter.releases),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    /// Make the resource wrappable again (simulates a recycled allocation).
    pub fn reset(&self) {
        self.released.store(false, Ordering::SeqCst);
    }
}

impl Resource for CountingResource {
    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn mem(&self) -> usize {
        self.mem
    }
}
