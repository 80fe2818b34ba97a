//! Abstract frame source for dependency inversion.
//!
//! Source nodes only see `FrameSource`; the preload coordinator implements
//! it, tests substitute in-memory sources.

use log::debug;

use crate::core::handle::ResourceHandle;
use crate::core::preload::{FetchError, FrameRequest, PreloadCoordinator};

use super::frame::FrameResource;

/// Outcome of a finished lookup
pub type FrameResult = Result<ResourceHandle<FrameResource>, FetchError>;

/// A requested frame that is still decoding.
pub trait PendingFrame: Send + Sync {
    /// `None` while still loading.
    fn poll(&self) -> Option<FrameResult>;
}

impl PendingFrame for FrameRequest<FrameResource> {
    fn poll(&self) -> Option<FrameResult> {
        self.try_get()
    }
}

/// Non-blocking answer to a frame request.
pub enum FrameLookup {
    /// Decoded; the handle is a counted reference owned by the caller
    Ready(ResourceHandle<FrameResource>),
    /// Requested, not decoded yet; poll the ticket instead of asking again
    Pending(Box<dyn PendingFrame>),
    Failed(FetchError),
}

impl std::fmt::Debug for FrameLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameLookup::Ready(h) => f.debug_tuple("Ready").field(h).finish(),
            FrameLookup::Pending(_) => f.write_str("Pending"),
            FrameLookup::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

impl From<FrameResult> for FrameLookup {
    fn from(result: FrameResult) -> Self {
        match result {
            Ok(handle) => FrameLookup::Ready(handle),
            Err(e) => FrameLookup::Failed(e),
        }
    }
}

pub trait FrameSource: Send + Sync {
    /// Look up a frame, starting a load if needed. Never blocks on decode.
    fn request(&self, frame: i32) -> FrameLookup;

    /// Hint that playback is now around `center`. Default: no-op.
    fn preload(&self, _center: i32) {}
}

impl FrameSource for PreloadCoordinator<FrameResource> {
    fn request(&self, frame: i32) -> FrameLookup {
        match self.fetch(frame) {
            Ok(request) => match request.try_get() {
                Some(result) => result.into(),
                None => FrameLookup::Pending(Box::new(request)),
            },
            Err(e) => FrameLookup::Failed(e),
        }
    }

    fn preload(&self, center: i32) {
        if let Err(e) = self.preload_around(center) {
            debug!("Preload around {} skipped: {}", center, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::cache_man::CacheManager;
    use crate::core::handle::HandleRegistry;
    use crate::entities::frame::Frame;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn settle(lookup: FrameLookup) -> FrameResult {
        let deadline = Instant::now() + Duration::from_secs(5);
        match lookup {
            FrameLookup::Ready(h) => Ok(h),
            FrameLookup::Failed(e) => Err(e),
            FrameLookup::Pending(ticket) => loop {
                if let Some(result) = ticket.poll() {
                    break result;
                }
                assert!(Instant::now() < deadline, "frame never resolved");
                std::thread::sleep(Duration::from_millis(2));
            },
        }
    }

    #[test]
    fn test_coordinator_as_frame_source() {
        let cfg = EngineConfig {
            cache_capacity: 8,
            max_in_flight: 2,
            ..Default::default()
        };
        let loader = |frame: i32| {
            if frame < 0 {
                anyhow::bail!("negative frame {}", frame);
            }
            Ok(FrameResource::new(Frame::solid(2, 2, [frame as f32, 0.0, 0.0, 1.0])))
        };
        let coord = PreloadCoordinator::new(&cfg, loader, HandleRegistry::new(), Arc::new(CacheManager::unlimited()));

        let handle = settle(coord.request(4)).unwrap();
        let frame = handle.resource().frame().unwrap();
        assert_eq!(frame.pixel(0, 0), Some([4.0, 0.0, 0.0, 1.0]));

        // Cached now: answered without a ticket
        assert!(matches!(coord.request(4), FrameLookup::Ready(_)));

        let failed = settle(coord.request(-1)).unwrap_err();
        assert!(matches!(failed, FetchError::Load { frame: -1, .. }));
    }
}
