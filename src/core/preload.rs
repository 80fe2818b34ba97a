//! Frame preload coordinator: fetches frames through a caller-supplied loader,
//! caches them as resource handles and keeps a window of frames warm around
//! the playhead.
//!
//! # Request coalescing
//!
//! Every uncached frame has at most one in-flight `RequestSlot`. A second
//! `fetch()` for the same frame gets a `FrameRequest` on the same slot, so the
//! decoder runs once and every waiter sees the same handle (or the same error).
//!
//! # Window shape
//!
//! - Scrubbing: symmetric `scrub_radius` around the center.
//! - Playing: `ahead_radius` in the playback direction, `behind_radius` opposite.
//!
//! Frames are queued center first, then by distance (ahead side first), and
//! the worker queue is FIFO, so queue order is priority order. A window
//! larger than the cache is cut to its nearest `capacity` frames, and the
//! cached part is promoted farthest-first so LRU eviction takes frames that
//! left the window before frames near the playhead.
//!
//! # Displayed frame
//!
//! The center of the latest preload pass is pinned in the cache, and the cache
//! is never smaller than `ahead_radius + 1`. Loading neighbours can therefore
//! never evict the frame the renderer is about to read.
//!
//! # Cancellation
//!
//! Each preload pass bumps the `CacheManager` epoch. A queued speculative load
//! whose pass is stale resolves as `Cancelled` without calling the loader.
//! Explicit `fetch()` requests are never epoch-cancelled. After `dispose()`,
//! loads that were already running release their result instead of caching it.
//!
//! # Byte budget
//!
//! Bytes are added when a frame is cached and freed when its last reference
//! goes. A frame evicted while a request or node still holds it keeps
//! counting against the `CacheManager` limit until that reference drops.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use super::cache_man::CacheManager;
use super::handle::{HandleError, HandleRegistry, Resource, ResourceHandle, WeakHandle};
use super::lru_cache::BoundedCache;
use super::workers::Workers;
use crate::config::EngineConfig;

/// Epoch value for explicit requests: never considered stale
const EXPLICIT: u64 = 0;

/// Decoder seam: produces the resource for one frame.
///
/// Runs on loader threads. Calling it twice for the same frame must be safe,
/// the coordinator just never does so concurrently.
pub trait FrameLoader<R>: Send + Sync + 'static {
    fn load(&self, frame: i32) -> anyhow::Result<R>;
}

impl<R, F> FrameLoader<R> for F
where
    F: Fn(i32) -> anyhow::Result<R> + Send + Sync + 'static,
{
    fn load(&self, frame: i32) -> anyhow::Result<R> {
        self(frame)
    }
}

/// Per-frame fetch failure. `Clone` so coalesced waiters share it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Loader failed; the frame stays uncached and may be retried
    Load { frame: i32, reason: String },
    /// Speculative load dropped because a newer preload pass started
    Cancelled { frame: i32 },
    /// Coordinator was disposed
    Disposed,
    /// Loaded resource could not be wrapped or acquired
    Handle(HandleError),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Load { frame, reason } => write!(f, "frame {} failed to load: {}", frame, reason),
            FetchError::Cancelled { frame } => write!(f, "preload of frame {} cancelled", frame),
            FetchError::Disposed => write!(f, "preload coordinator disposed"),
            FetchError::Handle(e) => write!(f, "resource handle error: {}", e),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Handle(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HandleError> for FetchError {
    fn from(e: HandleError) -> Self {
        FetchError::Handle(e)
    }
}

/// Playback direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    pub fn sign(self) -> i32 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

/// Selects the preload window shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Not playing: symmetric window
    #[default]
    Scrubbing,
    /// Playing: asymmetric window biased toward `Direction`
    Playing(Direction),
}

/// Frames to keep warm around a center frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadWindow {
    pub ahead: u32,
    pub behind: u32,
    pub direction: Direction,
}

impl PreloadWindow {
    pub fn symmetric(radius: u32) -> Self {
        Self {
            ahead: radius,
            behind: radius,
            direction: Direction::Forward,
        }
    }

    pub fn playback(ahead: u32, behind: u32, direction: Direction) -> Self {
        Self { ahead, behind, direction }
    }

    /// Smallest cache that can hold the center plus the ahead side.
    pub fn min_capacity(&self) -> usize {
        self.ahead as usize + 1
    }

    /// Frames in the unclamped window, center included.
    pub fn span(&self) -> usize {
        self.ahead as usize + self.behind as usize + 1
    }

    /// Window frames in priority order, optionally clamped to an inclusive range.
    /// Empty when the range excludes the whole window.
    pub fn frames(&self, center: i32, range: Option<(i32, i32)>) -> Vec<i32> {
        self.frames_limited(center, range, usize::MAX)
    }

    /// Like `frames`, keeping only the `limit` highest-priority frames.
    fn frames_limited(&self, center: i32, range: Option<(i32, i32)>, limit: usize) -> Vec<i32> {
        let in_range = |f: i32| range.is_none_or(|(start, end)| f >= start && f <= end);
        let sign = self.direction.sign();
        let mut frames = Vec::new();

        // Saturate radii past i32::MAX, and stop once every range frame is behind us
        let mut reach = i64::from(self.ahead.max(self.behind));
        if let Some((start, end)) = range {
            let to_edge = (i64::from(end) - i64::from(center))
                .abs()
                .max((i64::from(center) - i64::from(start)).abs());
            reach = reach.min(to_edge);
        }
        let reach = i32::try_from(reach).unwrap_or(i32::MAX);

        if in_range(center) {
            frames.push(center);
        }
        for dist in 1..=reach {
            if frames.len() >= limit {
                break;
            }
            if dist as u32 <= self.ahead
                && let Some(f) = center.checked_add(sign * dist)
                && in_range(f)
            {
                frames.push(f);
            }
            if dist as u32 <= self.behind
                && let Some(f) = center.checked_sub(sign * dist)
                && in_range(f)
            {
                frames.push(f);
            }
        }
        frames.truncate(limit);
        frames
    }
}

enum SlotState<R: Resource> {
    Pending,
    Done(Result<ResourceHandle<R>, FetchError>),
}

/// One in-flight load, shared by every request for that frame.
struct RequestSlot<R: Resource> {
    frame: i32,
    state: Mutex<SlotState<R>>,
    ready: Condvar,
    /// Preload pass that wants this frame, or `EXPLICIT`
    epoch: AtomicU64,
}

impl<R: Resource> RequestSlot<R> {
    fn new(frame: i32, epoch: u64) -> Self {
        Self {
            frame,
            state: Mutex::new(SlotState::Pending),
            ready: Condvar::new(),
            epoch: AtomicU64::new(epoch),
        }
    }

    fn resolved(frame: i32, result: Result<ResourceHandle<R>, FetchError>) -> Self {
        Self {
            frame,
            state: Mutex::new(SlotState::Done(result)),
            ready: Condvar::new(),
            epoch: AtomicU64::new(EXPLICIT),
        }
    }

    /// Another request joins: explicit requests pin the slot, preload
    /// requests refresh its epoch so the newer pass keeps it alive.
    fn join(&self, epoch: u64) {
        let _ = self.epoch.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            if current == EXPLICIT { None } else { Some(epoch) }
        });
    }

    fn is_stale(&self, manager: &CacheManager) -> bool {
        let epoch = self.epoch.load(Ordering::Acquire);
        epoch != EXPLICIT && !manager.is_current(epoch)
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<R>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// First resolution wins; later ones are dropped (releasing their handle).
    fn resolve(&self, result: Result<ResourceHandle<R>, FetchError>) {
        let mut state = self.lock();
        if matches!(*state, SlotState::Pending) {
            *state = SlotState::Done(result);
            self.ready.notify_all();
        }
    }

    fn outcome(state: &SlotState<R>) -> Option<Result<ResourceHandle<R>, FetchError>> {
        match state {
            SlotState::Pending => None,
            SlotState::Done(Ok(handle)) => Some(handle.acquire().map_err(FetchError::Handle)),
            SlotState::Done(Err(e)) => Some(Err(e.clone())),
        }
    }
}

/// Ticket for one frame fetch. Clones share the same slot.
///
/// Each successful `wait`/`try_get` returns a separately acquired handle.
/// A resolved request keeps its frame alive until the request is dropped.
pub struct FrameRequest<R: Resource> {
    slot: Arc<RequestSlot<R>>,
}

impl<R: Resource> Clone for FrameRequest<R> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<R: Resource> fmt::Debug for FrameRequest<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameRequest")
            .field("frame", &self.slot.frame)
            .field("done", &self.is_done())
            .finish()
    }
}

impl<R: Resource> FrameRequest<R> {
    pub fn frame(&self) -> i32 {
        self.slot.frame
    }

    pub fn is_done(&self) -> bool {
        !matches!(*self.slot.lock(), SlotState::Pending)
    }

    /// Result if resolved, without blocking.
    pub fn try_get(&self) -> Option<Result<ResourceHandle<R>, FetchError>> {
        RequestSlot::outcome(&self.slot.lock())
    }

    /// Block until the load resolves.
    pub fn wait(&self) -> Result<ResourceHandle<R>, FetchError> {
        let mut state = self.slot.lock();
        loop {
            if let Some(result) = RequestSlot::outcome(&state) {
                return result;
            }
            state = self.slot.ready.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Block up to `timeout`; `None` if still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<ResourceHandle<R>, FetchError>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.slot.lock();
        loop {
            if let Some(result) = RequestSlot::outcome(&state) {
                return Some(result);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            state = self
                .slot
                .ready
                .wait_timeout(state, remaining)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }

    /// True if both tickets share one in-flight load.
    pub fn same_request(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

/// Per-frame outcome of a preload batch
pub type FrameOutcome = (i32, Result<(), FetchError>);

/// Requests issued by one preload pass.
#[derive(Debug)]
pub struct PreloadBatch<R: Resource> {
    center: i32,
    epoch: u64,
    window_frames: Vec<i32>,
    already_cached: Vec<i32>,
    requests: Vec<FrameRequest<R>>,
}

impl<R: Resource> PreloadBatch<R> {
    pub fn center(&self) -> i32 {
        self.center
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Full window in priority order (cached or not)
    pub fn window_frames(&self) -> &[i32] {
        &self.window_frames
    }

    /// Frames that were already cached when the pass started
    pub fn already_cached(&self) -> &[i32] {
        &self.already_cached
    }

    /// Frames this pass had to fetch
    pub fn requested(&self) -> Vec<i32> {
        self.requests.iter().map(|r| r.frame()).collect()
    }

    pub fn requests(&self) -> &[FrameRequest<R>] {
        &self.requests
    }

    pub fn is_done(&self) -> bool {
        self.requests.iter().all(|r| r.is_done())
    }

    /// Wait for every request. One failure never hides the others.
    pub fn wait_all(&self) -> Vec<FrameOutcome> {
        self.requests
            .iter()
            .map(|r| (r.frame(), r.wait().map(|_handle| ())))
            .collect()
    }
}

/// Snapshot for status bars and tests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinatorStats {
    pub cached: usize,
    pub capacity: usize,
    pub in_flight: usize,
    pub queued: usize,
    pub active: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub mem_usage: usize,
    pub mem_limit: usize,
}

struct State<R: Resource> {
    cache: BoundedCache<i32, ResourceHandle<R>>,
    in_flight: HashMap<i32, Arc<RequestSlot<R>>>,
    /// Pinned display frame
    protected: Option<i32>,
    playback: PlaybackState,
    scrub_radius: u32,
    ahead_radius: u32,
    behind_radius: u32,
    frame_range: Option<(i32, i32)>,
}

impl<R: Resource> State<R> {
    fn protect(&mut self, frame: Option<i32>) {
        if let Some(prev) = self.protected
            && Some(prev) != frame
        {
            self.cache.unpin(&prev);
        }
        self.protected = frame;
        if let Some(f) = frame {
            self.cache.pin(f);
        }
    }

    fn remove_in_flight(&mut self, slot: &Arc<RequestSlot<R>>) {
        if let Some(current) = self.in_flight.get(&slot.frame)
            && Arc::ptr_eq(current, slot)
        {
            self.in_flight.remove(&slot.frame);
        }
    }
}

/// Evicted frames still referenced outside the cache, with their byte size
type Detached<R> = Arc<Mutex<Vec<(WeakHandle<R>, usize)>>>;

/// State shared with loader jobs.
struct Shared<R: Resource> {
    loader: Box<dyn FrameLoader<R>>,
    registry: Arc<HandleRegistry>,
    manager: Arc<CacheManager>,
    detached: Detached<R>,
    /// Written under the state lock, readable without it
    disposed: AtomicBool,
    state: Mutex<State<R>>,
}

impl<R: Resource> Shared<R> {
    fn lock_state(&self) -> MutexGuard<'_, State<R>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Stop accounting bytes of evicted frames whose last reference is gone.
    fn reclaim_detached(&self) {
        let mut detached = self.detached.lock().unwrap_or_else(|e| e.into_inner());
        detached.retain(|(weak, mem)| {
            if weak.is_alive() {
                return true;
            }
            self.manager.free_memory(*mem);
            false
        });
    }

    /// Loader job body.
    fn run_load(&self, slot: Arc<RequestSlot<R>>) {
        let frame = slot.frame;
        if self.is_disposed() {
            self.finish(&slot, Err(FetchError::Disposed));
            return;
        }
        {
            // Joins happen under the state lock, so an explicit fetch either
            // lands before this check or finds the slot gone
            let mut state = self.lock_state();
            if slot.is_stale(&self.manager) {
                state.remove_in_flight(&slot);
                drop(state);
                trace!("Preload of frame {} skipped: stale epoch", frame);
                slot.resolve(Err(FetchError::Cancelled { frame }));
                return;
            }
        }

        let started = Instant::now();
        match self.loader.load(frame) {
            Ok(resource) => self.store(&slot, resource, started),
            Err(e) => {
                warn!("Frame {} failed to load: {:#}", frame, e);
                self.finish(
                    &slot,
                    Err(FetchError::Load {
                        frame,
                        reason: format!("{:#}", e),
                    }),
                );
            }
        }
    }

    /// Cache a freshly loaded resource and resolve its waiters.
    fn store(&self, slot: &Arc<RequestSlot<R>>, resource: R, started: Instant) {
        let frame = slot.frame;
        let resource = Arc::new(resource);
        let mut state = self.lock_state();

        if self.is_disposed() {
            drop(state);
            debug!("Frame {} arrived after dispose, releasing", frame);
            resource.release();
            slot.resolve(Err(FetchError::Disposed));
            return;
        }

        let handle = match self.registry.wrap_labeled(Arc::clone(&resource), format!("frame {}", frame)) {
            Ok(handle) => handle,
            Err(e) => {
                // Never leak what the loader allocated
                resource.release();
                state.remove_in_flight(slot);
                drop(state);
                warn!("Frame {} could not be wrapped: {}", frame, e);
                slot.resolve(Err(FetchError::Handle(e)));
                return;
            }
        };
        let waiter = handle.acquire().map_err(FetchError::Handle);

        self.manager.add_memory(handle.mem());
        state.cache.set(frame, handle);
        self.reclaim_detached();
        while self.manager.check_memory_limit() {
            if state.cache.evict_lru().is_none() {
                break;
            }
        }
        state.remove_in_flight(slot);
        drop(state);

        debug!("Cached frame {} ({:.1} ms)", frame, started.elapsed().as_secs_f64() * 1000.0);
        slot.resolve(waiter);
    }

    fn finish(&self, slot: &Arc<RequestSlot<R>>, result: Result<ResourceHandle<R>, FetchError>) {
        self.lock_state().remove_in_flight(slot);
        slot.resolve(result);
    }
}

/// Fetches, deduplicates, caches and preloads frames.
pub struct PreloadCoordinator<R: Resource> {
    shared: Arc<Shared<R>>,
    workers: Workers,
}

impl<R: Resource> fmt::Debug for PreloadCoordinator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreloadCoordinator")
            .field("stats", &self.stats())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl<R: Resource> PreloadCoordinator<R> {
    /// Coordinator with explicit handle registry and memory budget.
    pub fn new(
        config: &EngineConfig,
        loader: impl FrameLoader<R>,
        registry: Arc<HandleRegistry>,
        manager: Arc<CacheManager>,
    ) -> Self {
        let config = config.clone().validate();

        let detached: Detached<R> = Arc::new(Mutex::new(Vec::new()));
        let evict_manager = Arc::clone(&manager);
        let evict_detached = Arc::clone(&detached);
        let cache = BoundedCache::with_evict(config.cache_capacity, move |frame: i32, handle: ResourceHandle<R>| {
            let mem = handle.mem();
            if mem > 0 && handle.ref_count() > 1 {
                // Pixels stay alive with the other owners; keep counting them
                trace!("Frame {} left the cache, still referenced", frame);
                evict_detached
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push((handle.downgrade(), mem));
            } else {
                evict_manager.free_memory(mem);
                trace!("Frame {} left the cache", frame);
            }
            handle.release();
        });

        debug!(
            "PreloadCoordinator created: capacity={}, max_in_flight={}, scrub={}, ahead={}, behind={}",
            config.cache_capacity, config.max_in_flight, config.scrub_radius, config.ahead_radius, config.behind_radius
        );

        Self {
            shared: Arc::new(Shared {
                loader: Box::new(loader),
                registry,
                manager,
                detached,
                disposed: AtomicBool::new(false),
                state: Mutex::new(State {
                    cache,
                    in_flight: HashMap::new(),
                    protected: None,
                    playback: PlaybackState::Scrubbing,
                    scrub_radius: config.scrub_radius,
                    ahead_radius: config.ahead_radius,
                    behind_radius: config.behind_radius,
                    frame_range: config.frame_range,
                }),
            }),
            workers: Workers::new(config.max_in_flight),
        }
    }

    /// Coordinator with its own registry and a system-memory budget.
    pub fn with_config(config: &EngineConfig, loader: impl FrameLoader<R>) -> Self {
        let manager = Arc::new(CacheManager::new(config.mem_fraction, config.reserve_gb));
        Self::new(config, loader, HandleRegistry::new(), manager)
    }

    /// Fetch one frame. Cached frames resolve immediately; in-flight frames
    /// share the running load; otherwise a load is queued.
    pub fn fetch(&self, frame: i32) -> Result<FrameRequest<R>, FetchError> {
        self.request(frame, EXPLICIT)
    }

    fn request(&self, frame: i32, epoch: u64) -> Result<FrameRequest<R>, FetchError> {
        let mut state = self.shared.lock_state();
        if self.shared.is_disposed() {
            return Err(FetchError::Disposed);
        }

        let hit = state.cache.get(&frame).map(|h| h.acquire());
        match hit {
            Some(Ok(handle)) => {
                trace!("Frame {} cache hit", frame);
                return Ok(FrameRequest {
                    slot: Arc::new(RequestSlot::resolved(frame, Ok(handle))),
                });
            }
            Some(Err(e)) => {
                warn!("Cached frame {} is unusable ({}), reloading", frame, e);
                state.cache.delete(&frame);
            }
            None => {}
        }

        if let Some(slot) = state.in_flight.get(&frame) {
            slot.join(epoch);
            trace!("Frame {} already loading, joining request", frame);
            return Ok(FrameRequest { slot: Arc::clone(slot) });
        }

        let slot = Arc::new(RequestSlot::new(frame, epoch));
        state.in_flight.insert(frame, Arc::clone(&slot));
        drop(state);

        let shared = Arc::clone(&self.shared);
        let job_slot = Arc::clone(&slot);
        self.workers.execute(move || shared.run_load(job_slot));
        Ok(FrameRequest { slot })
    }

    /// Preload the window for the current playback state.
    pub fn preload_around(&self, center: i32) -> Result<PreloadBatch<R>, FetchError> {
        let window = self.current_window();
        self.preload_window(center, window)
    }

    /// Preload an explicit window. The center is pinned as the display frame
    /// and queued first; speculative loads of earlier passes are cancelled.
    ///
    /// The window is cut to the cache capacity, nearest frames kept, and the
    /// cached part is promoted farthest-first. New frames then evict frames
    /// outside the window before any frame inside it.
    pub fn preload_window(&self, center: i32, window: PreloadWindow) -> Result<PreloadBatch<R>, FetchError> {
        let epoch = self.shared.manager.increment_epoch();
        let (frames, already_cached) = {
            let mut state = self.shared.lock_state();
            if self.shared.is_disposed() {
                return Err(FetchError::Disposed);
            }
            let floor = window.min_capacity();
            if state.cache.capacity() < floor {
                warn!(
                    "Cache capacity {} below preload floor, raising to {}",
                    state.cache.capacity(),
                    floor
                );
                state.cache.set_capacity(floor);
            }
            state.protect(Some(center));

            let capacity = state.cache.capacity();
            let frames = window.frames_limited(center, state.frame_range, capacity);
            if frames.len() < window.span() {
                trace!("Preload window around {} cut to {} frames", center, frames.len());
            }

            let mut cached: Vec<i32> = frames
                .iter()
                .rev()
                .copied()
                .filter(|f| state.cache.promote(f))
                .collect();
            cached.reverse();
            (frames, cached)
        };

        let mut requests = Vec::new();
        for &frame in &frames {
            if already_cached.contains(&frame) {
                continue;
            }
            requests.push(self.request(frame, epoch)?);
        }

        trace!(
            "Preload around {}: {} frames, {} cached, {} requested (epoch {})",
            center,
            frames.len(),
            already_cached.len(),
            requests.len(),
            epoch
        );

        Ok(PreloadBatch {
            center,
            epoch,
            window_frames: frames,
            already_cached,
            requests,
        })
    }

    /// Window used by `preload_around` right now.
    pub fn current_window(&self) -> PreloadWindow {
        let state = self.shared.lock_state();
        match state.playback {
            PlaybackState::Scrubbing => PreloadWindow::symmetric(state.scrub_radius),
            PlaybackState::Playing(direction) => {
                PreloadWindow::playback(state.ahead_radius, state.behind_radius, direction)
            }
        }
    }

    /// Switch window shape for future passes. Cached frames are untouched.
    pub fn set_playback(&self, playback: PlaybackState) {
        let mut state = self.shared.lock_state();
        if state.playback != playback {
            debug!("Playback state: {:?} -> {:?}", state.playback, playback);
            state.playback = playback;
        }
    }

    pub fn playback(&self) -> PlaybackState {
        self.shared.lock_state().playback
    }

    pub fn set_radii(&self, scrub: u32, ahead: u32, behind: u32) {
        let mut state = self.shared.lock_state();
        state.scrub_radius = scrub;
        state.ahead_radius = ahead;
        state.behind_radius = behind;
    }

    /// Clamp future windows to an inclusive work area.
    pub fn set_frame_range(&self, range: Option<(i32, i32)>) {
        self.shared.lock_state().frame_range = range;
    }

    /// Pin a frame as the one being displayed (or clear the pin).
    pub fn set_display_frame(&self, frame: Option<i32>) {
        self.shared.lock_state().protect(frame);
    }

    pub fn display_frame(&self) -> Option<i32> {
        self.shared.lock_state().protected
    }

    /// Cached handle, promoted to most-recently-used.
    pub fn get_cached(&self, frame: i32) -> Option<ResourceHandle<R>> {
        let mut state = self.shared.lock_state();
        state.cache.get(&frame).and_then(|h| h.acquire().ok())
    }

    /// Cache presence without touching recency.
    pub fn contains(&self, frame: i32) -> bool {
        self.shared.lock_state().cache.contains(&frame)
    }

    pub fn is_loading(&self, frame: i32) -> bool {
        self.shared.lock_state().in_flight.contains_key(&frame)
    }

    /// Cached frames, most recently used first.
    pub fn cached_frames(&self) -> Vec<i32> {
        self.shared.lock_state().cache.keys().copied().collect()
    }

    /// Shrinking evicts LRU frames but never the display frame.
    pub fn set_capacity(&self, capacity: usize) {
        self.shared.lock_state().cache.set_capacity(capacity);
    }

    pub fn capacity(&self) -> usize {
        self.shared.lock_state().cache.capacity()
    }

    /// Drop one cached frame (e.g. the source changed on disk).
    pub fn invalidate_frame(&self, frame: i32) -> bool {
        self.shared.lock_state().cache.delete(&frame)
    }

    /// Drop every cached frame. The display pin is kept for future loads.
    pub fn clear_cache(&self) {
        let mut state = self.shared.lock_state();
        state.cache.clear();
        let protected = state.protected;
        state.protect(protected);
        debug!("Frame cache cleared");
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.shared.reclaim_detached();
        let state = self.shared.lock_state();
        let cache_stats = state.cache.stats();
        let (mem_usage, mem_limit) = self.shared.manager.mem();
        CoordinatorStats {
            cached: state.cache.len(),
            capacity: state.cache.capacity(),
            in_flight: state.in_flight.len(),
            queued: self.workers.queued(),
            active: self.workers.active(),
            hits: cache_stats.hits(),
            misses: cache_stats.misses(),
            evictions: cache_stats.evictions(),
            mem_usage,
            mem_limit,
        }
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.shared.registry
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.shared.manager
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Cancel pending requests and release every cached handle. Idempotent.
    pub fn dispose(&self) {
        let pending: Vec<Arc<RequestSlot<R>>> = {
            let mut state = self.shared.lock_state();
            if self.shared.disposed.swap(true, Ordering::AcqRel) {
                return;
            }
            self.shared.manager.increment_epoch();
            let pending = state.in_flight.drain().map(|(_, slot)| slot).collect();
            state.cache.clear();
            state.protected = None;
            pending
        };

        debug!("PreloadCoordinator disposed: {} pending requests dropped", pending.len());
        for slot in pending {
            slot.resolve(Err(FetchError::Disposed));
        }
    }
}

impl<R: Resource> Drop for PreloadCoordinator<R> {
    fn drop(&mut self) {
        self.dispose();
    }
}
