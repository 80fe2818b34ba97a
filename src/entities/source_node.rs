//! Source node: pulls decoded frames from a `FrameSource`.
//!
//! The node holds one counted reference to the frame it last produced, so the
//! artifact stays valid even if the frame cache evicts it meanwhile. While the
//! frame is decoding the node keeps the pending ticket, produces nothing and
//! reports not-ready, which keeps it (and its consumers) dirty until the
//! decode lands.

use std::sync::Arc;

use log::{trace, warn};

use crate::core::handle::{HandleError, ResourceHandle};
use crate::core::preload::FetchError;

use super::attrs::Attrs;
use super::frame::{Frame, FrameResource};
use super::keys::A_OFFSET;
use super::node::{EvalContext, Processor};
use super::traits::{FrameLookup, FrameSource, PendingFrame};

pub struct SourceNode {
    source: Arc<dyn FrameSource>,
    /// Frame number + reference to the last delivered frame
    held: Option<(i32, ResourceHandle<FrameResource>)>,
    /// Ticket for a frame still decoding
    pending: Option<(i32, Box<dyn PendingFrame>)>,
    /// Last frame a preload hint was sent for
    hinted: Option<i32>,
    ready: bool,
    last_error: Option<FetchError>,
}

impl std::fmt::Debug for SourceNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceNode")
            .field("held", &self.held_frame())
            .field("pending", &self.pending.as_ref().map(|(f, _)| *f))
            .field("ready", &self.ready)
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl SourceNode {
    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self {
            source,
            held: None,
            pending: None,
            hinted: None,
            ready: true,
            last_error: None,
        }
    }

    /// Frame number currently referenced by this node
    pub fn held_frame(&self) -> Option<i32> {
        self.held.as_ref().map(|(f, _)| *f)
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    fn lookup(&mut self, frame: i32) -> FrameLookup {
        if let Some((f, ticket)) = self.pending.take()
            && f == frame
        {
            return match ticket.poll() {
                Some(result) => result.into(),
                None => FrameLookup::Pending(ticket),
            };
        }

        let lookup = self.source.request(frame);
        if self.hinted != Some(frame) {
            self.hinted = Some(frame);
            self.source.preload(frame);
        }
        lookup
    }

    fn fail(&mut self, frame: i32, error: FetchError) -> Option<Frame> {
        warn!("Source frame {} unavailable: {}", frame, error);
        self.last_error = Some(error);
        // Failure is final for this evaluation; a later invalidate retries
        self.ready = true;
        None
    }
}

impl Processor for SourceNode {
    fn node_type(&self) -> &str {
        "Source"
    }

    fn process(&mut self, ctx: &EvalContext, attrs: &Attrs, _inputs: &[Option<Frame>]) -> Option<Frame> {
        let frame = ctx.frame.saturating_add(attrs.get_i32_or(A_OFFSET, 0));

        if let Some((f, handle)) = &self.held
            && *f == frame
            && let Some(image) = handle.resource().frame()
        {
            self.ready = true;
            return Some(image);
        }
        // Different frame requested: let go of the old one
        self.held = None;

        match self.lookup(frame) {
            FrameLookup::Ready(handle) => match handle.resource().frame() {
                Some(image) => {
                    trace!("Source frame {} ready", frame);
                    self.held = Some((frame, handle));
                    self.ready = true;
                    self.last_error = None;
                    Some(image)
                }
                None => self.fail(frame, FetchError::Handle(HandleError::Released)),
            },
            FrameLookup::Pending(ticket) => {
                trace!("Source frame {} still loading", frame);
                self.pending = Some((frame, ticket));
                self.ready = false;
                None
            }
            FrameLookup::Failed(e) => self.fail(frame, e),
        }
    }

    fn invalidate(&mut self) {
        self.held = None;
        self.last_error = None;
    }

    fn dispose(&mut self) {
        self.held = None;
        self.pending = None;
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}
