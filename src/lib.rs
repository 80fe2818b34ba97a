//! PLAYA core - frame cache, preloading and node graph evaluation
//!
//! Re-exports the commonly used types of all modules.

// Core engine (cache, handles, workers, preload)
pub mod core;

pub mod config;
pub mod entities;

pub use config::EngineConfig;
pub use core::cache_man::CacheManager;
pub use core::handle::{HandleRegistry, Resource, ResourceHandle};
pub use core::lru_cache::BoundedCache;
pub use core::preload::{PlaybackState, PreloadCoordinator, PreloadWindow};

pub use entities::{AttrValue, Attrs, EvalContext, Frame, Graph, NodeRegistry};
