//! Reference-counted ownership of externally allocated resources (GPU frame
//! buffers, decoder surfaces).
//!
//! A `ResourceHandle` is one counted reference. The count starts at 1 on
//! `wrap()`, `acquire()` adds one, and dropping (or `release()`) a handle
//! removes one. When the last reference goes away the resource's own
//! `release()` runs exactly once.
//!
//! Handles are deliberately not `Clone`: sharing is always an explicit
//! `acquire()` so it shows up at the call site.
//!
//! `HandleRegistry` is the explicit context every handle is created through.
//! It rejects double wrapping of the same raw resource and counts outstanding
//! handles so tests can assert that everything was released. Its leak report
//! is advisory only.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::{trace, warn};

/// Externally allocated object with an explicit release operation.
pub trait Resource: Send + Sync + 'static {
    /// Free the underlying allocation. Calls after the first must be harmless.
    fn release(&self);

    /// True once `release()` has run (or the owner released it out of band).
    fn is_released(&self) -> bool;

    /// Approximate size in bytes, used for cache memory accounting.
    fn mem(&self) -> usize {
        0
    }
}

/// Handle misuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    /// The raw resource already has a live handle
    AlreadyWrapped,
    /// The raw resource was released before wrapping
    AlreadyReleased,
    /// Acquire on a handle whose resource has been released
    Released,
}

impl fmt::Display for HandleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleError::AlreadyWrapped => write!(f, "resource is already wrapped by a live handle"),
            HandleError::AlreadyReleased => write!(f, "cannot wrap a released resource"),
            HandleError::Released => write!(f, "handle has been released"),
        }
    }
}

impl std::error::Error for HandleError {}

/// Identity of a raw resource: address of its shared allocation.
type ResourceKey = usize;

fn resource_key<R>(resource: &Arc<R>) -> ResourceKey {
    Arc::as_ptr(resource) as *const () as usize
}

/// Explicit handle context: live-resource table plus counters.
///
/// Created by the owner (coordinator, test) and passed to everything that wraps.
#[derive(Default)]
pub struct HandleRegistry {
    /// Live resources -> debug label
    live: Mutex<HashMap<ResourceKey, String>>,
    wrapped: AtomicU64,
    released: AtomicU64,
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("outstanding", &self.outstanding())
            .field("wrapped", &self.wrapped_total())
            .field("released", &self.released_total())
            .finish()
    }
}

impl HandleRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wrap a resource in a new handle with refcount 1.
    pub fn wrap<R: Resource>(self: &Arc<Self>, resource: Arc<R>) -> Result<ResourceHandle<R>, HandleError> {
        self.wrap_labeled(resource, "")
    }

    /// Same as `wrap`, with a label shown in leak reports.
    pub fn wrap_labeled<R: Resource>(
        self: &Arc<Self>,
        resource: Arc<R>,
        label: impl Into<String>,
    ) -> Result<ResourceHandle<R>, HandleError> {
        if resource.is_released() {
            return Err(HandleError::AlreadyReleased);
        }
        let key = resource_key(&resource);
        {
            let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
            if live.contains_key(&key) {
                return Err(HandleError::AlreadyWrapped);
            }
            live.insert(key, label.into());
        }
        self.wrapped.fetch_add(1, Ordering::Relaxed);
        trace!("Handle wrapped: {:#x}", key);

        Ok(ResourceHandle {
            shared: Arc::new(HandleShared {
                resource,
                key,
                registry: Arc::clone(self),
            }),
        })
    }

    /// Number of wrapped resources not yet released.
    pub fn outstanding(&self) -> usize {
        self.live.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn wrapped_total(&self) -> u64 {
        self.wrapped.load(Ordering::Relaxed)
    }

    pub fn released_total(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    /// Log every outstanding handle. Returns how many there are.
    ///
    /// Advisory: a handle held by a live owner is not a leak yet.
    pub fn report_leaks(&self) -> usize {
        let live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        for (key, label) in live.iter() {
            warn!("Outstanding resource handle {:#x} {}", key, label);
        }
        live.len()
    }

    fn on_released(&self, key: ResourceKey) {
        self.live.lock().unwrap_or_else(|e| e.into_inner()).remove(&key);
        self.released.fetch_add(1, Ordering::Relaxed);
        trace!("Handle released: {:#x}", key);
    }
}

/// Shared state behind all handles of one resource; its drop is the single release.
struct HandleShared<R: Resource> {
    resource: Arc<R>,
    key: ResourceKey,
    registry: Arc<HandleRegistry>,
}

impl<R: Resource> Drop for HandleShared<R> {
    fn drop(&mut self) {
        self.resource.release();
        self.registry.on_released(self.key);
    }
}

/// One counted reference to a wrapped resource.
pub struct ResourceHandle<R: Resource> {
    shared: Arc<HandleShared<R>>,
}

impl<R: Resource> fmt::Debug for ResourceHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("key", &format_args!("{:#x}", self.shared.key))
            .field("refs", &self.ref_count())
            .finish()
    }
}

impl<R: Resource> ResourceHandle<R> {
    /// New reference to the same resource (refcount + 1).
    ///
    /// Fails if the resource was released out of band.
    pub fn acquire(&self) -> Result<Self, HandleError> {
        if self.shared.resource.is_released() {
            return Err(HandleError::Released);
        }
        Ok(Self {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Give up this reference. The resource is released with the last one.
    pub fn release(self) {
        drop(self);
    }

    /// Non-owning reference that can re-acquire while the resource is alive.
    pub fn downgrade(&self) -> WeakHandle<R> {
        WeakHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn resource(&self) -> &R {
        &self.shared.resource
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }

    pub fn mem(&self) -> usize {
        self.shared.resource.mem()
    }

    /// True if both handles reference the same wrapped resource.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

/// Non-owning view of a handle. Does not keep the resource alive.
pub struct WeakHandle<R: Resource> {
    shared: Weak<HandleShared<R>>,
}

impl<R: Resource> Clone for WeakHandle<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<R: Resource> fmt::Debug for WeakHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHandle").field("alive", &self.is_alive()).finish()
    }
}

impl<R: Resource> WeakHandle<R> {
    /// Take a counted reference. Errors once the last handle was released.
    pub fn acquire(&self) -> Result<ResourceHandle<R>, HandleError> {
        let shared = self.shared.upgrade().ok_or(HandleError::Released)?;
        if shared.resource.is_released() {
            return Err(HandleError::Released);
        }
        Ok(ResourceHandle { shared })
    }

    pub fn is_alive(&self) -> bool {
        self.shared.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{CountingResource, ReleaseCounter};

    #[test]
    fn test_wrap_release_once() {
        let registry = HandleRegistry::new();
        let counter = ReleaseCounter::new();
        let res = counter.resource(1);

        let handle = registry.wrap(Arc::clone(&res)).unwrap();
        assert_eq!(handle.ref_count(), 1);
        assert_eq!(registry.outstanding(), 1);

        handle.release();
        assert_eq!(counter.releases(), 1);
        assert!(res.is_released());
        assert_eq!(registry.outstanding(), 0);
    }

    #[test]
    fn test_acquire_defers_release_until_last() {
        let registry = HandleRegistry::new();
        let counter = ReleaseCounter::new();

        let first = registry.wrap(counter.resource(1)).unwrap();
        let second = first.acquire().unwrap();
        assert_eq!(first.ref_count(), 2);
        assert!(first.ptr_eq(&second));

        first.release();
        assert_eq!(counter.releases(), 0);
        assert_eq!(second.ref_count(), 1);

        second.release();
        assert_eq!(counter.releases(), 1);
    }

    #[test]
    fn test_double_wrap_rejected() {
        let registry = HandleRegistry::new();
        let counter = ReleaseCounter::new();
        let res = counter.resource(1);

        let handle = registry.wrap(Arc::clone(&res)).unwrap();
        assert_eq!(registry.wrap(Arc::clone(&res)).unwrap_err(), HandleError::AlreadyWrapped);
        assert_eq!(registry.wrapped_total(), 1);

        drop(handle);
        assert_eq!(counter.releases(), 1);
    }

    #[test]
    fn test_wrap_released_resource_rejected() {
        let registry = HandleRegistry::new();
        let counter = ReleaseCounter::new();
        let res = counter.resource(1);
        res.release();

        assert_eq!(registry.wrap(res).unwrap_err(), HandleError::AlreadyReleased);
        assert_eq!(registry.outstanding(), 0);
    }

    #[test]
    fn test_weak_acquire_after_release_fails() {
        let registry = HandleRegistry::new();
        let counter = ReleaseCounter::new();

        let handle = registry.wrap(counter.resource(1)).unwrap();
        let weak = handle.downgrade();
        let again = weak.acquire().unwrap();
        drop(again);
        assert!(weak.is_alive());

        handle.release();
        assert!(!weak.is_alive());
        assert_eq!(weak.acquire().unwrap_err(), HandleError::Released);
        assert_eq!(counter.releases(), 1);
    }

    #[test]
    fn test_acquire_after_external_release_fails() {
        let registry = HandleRegistry::new();
        let counter = ReleaseCounter::new();
        let res = counter.resource(1);

        let handle = registry.wrap(Arc::clone(&res)).unwrap();
        res.release();
        assert_eq!(handle.acquire().unwrap_err(), HandleError::Released);

        // Dropping still runs the (now harmless) release path once
        drop(handle);
        assert_eq!(counter.releases(), 1);
        assert_eq!(registry.outstanding(), 0);
    }

    #[test]
    fn test_rewrap_after_release_is_allowed() {
        let registry = HandleRegistry::new();
        let counter = ReleaseCounter::new();
        let res = Arc::new(CountingResource::reusable(&counter, 9));

        registry.wrap(Arc::clone(&res)).unwrap().release();
        res.reset();
        let handle = registry.wrap(Arc::clone(&res)).unwrap();
        assert_eq!(registry.outstanding(), 1);
        drop(handle);
        assert_eq!(counter.releases(), 2);
    }

    #[test]
    fn test_registry_baseline() {
        let registry = HandleRegistry::new();
        let counter = ReleaseCounter::new();
        let baseline = registry.outstanding();

        let handles: Vec<_> = (0..10).map(|i| registry.wrap(counter.resource(i)).unwrap()).collect();
        assert_eq!(registry.outstanding(), baseline + 10);
        assert_eq!(registry.report_leaks(), 10);

        drop(handles);
        assert_eq!(registry.outstanding(), baseline);
        assert_eq!(registry.released_total(), 10);
        assert_eq!(counter.releases(), 10);
    }
}
