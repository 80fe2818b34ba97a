//! Core engine modules - cache, resource handles, memory budget, workers, preload
//!
//! These modules form the frame-serving engine, independent of the node graph.

pub mod cache_man;
pub mod handle;
pub mod lru_cache;
pub mod preload;
pub mod workers;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use cache_man::CacheManager;
pub use handle::{HandleError, HandleRegistry, Resource, ResourceHandle, WeakHandle};
pub use lru_cache::{BoundedCache, CacheStats};
pub use preload::{
    CoordinatorStats, Direction, FetchError, FrameLoader, FrameRequest, PlaybackState, PreloadBatch,
    PreloadCoordinator, PreloadWindow,
};
pub use workers::Workers;
