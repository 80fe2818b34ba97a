//! Processing node: one vertex of the evaluation graph.
//!
//! A node owns its properties (`Attrs`), its processor (`NodeKind`, or an
//! attached `ProcessingStrategy`) and a memoized output. Edges are stored on
//! both ends but owned by the `Graph`: `inputs` is the ordered list of
//! producers, `consumers` a non-owning set of ids that read this node.
//!
//! ## Memo validity
//!
//! The memo is returned only while the node is clean and the `EvalContext`
//! matches the one it was produced with. After processing, the node stays
//! dirty if an input is still dirty or the processor reports it is not ready
//! (a source frame still loading), so the next pull retries.

use enum_dispatch::enum_dispatch;
use indexmap::IndexSet;
use log::trace;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DEFAULT_DIM;

use super::attrs::{AttrValue, Attrs};
use super::frame::Frame;
use super::keys::A_NAME;
use super::node_kind::{CustomNode, NodeKind};

/// Evaluation quality. Draft renders at half resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Quality {
    Draft,
    #[default]
    Full,
}

/// Everything a memoized output depends on besides attrs and inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvalContext {
    pub frame: i32,
    /// Target size (width, height)
    pub size: (u32, u32),
    pub quality: Quality,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new(0)
    }
}

impl EvalContext {
    pub fn new(frame: i32) -> Self {
        Self {
            frame,
            size: DEFAULT_DIM,
            quality: Quality::Full,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = (width, height);
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn at_frame(mut self, frame: i32) -> Self {
        self.frame = frame;
        self
    }

    /// Pixel size to render at, after quality scaling.
    pub fn output_size(&self) -> (usize, usize) {
        let (w, h) = (self.size.0 as usize, self.size.1 as usize);
        match self.quality {
            Quality::Full => (w.max(1), h.max(1)),
            Quality::Draft => ((w / 2).max(1), (h / 2).max(1)),
        }
    }
}

/// Built-in node behavior, dispatched statically over `NodeKind`.
#[enum_dispatch]
pub trait Processor: Send {
    /// Type tag ("Solid", "Gain", ...)
    fn node_type(&self) -> &str;

    /// Produce the output for `ctx`. `inputs` is ordered like the node's
    /// input edges; absent entries are inputs that produced nothing.
    fn process(&mut self, ctx: &EvalContext, attrs: &Attrs, inputs: &[Option<Frame>]) -> Option<Frame>;

    /// Drop derived state (the node went dirty).
    fn invalidate(&mut self) {}

    /// Release everything; the node is being removed.
    fn dispose(&mut self) {}

    /// False while the last output is provisional.
    fn is_ready(&self) -> bool {
        true
    }
}

/// Externally supplied node behavior. A node with a strategy attached
/// delegates `process`/`invalidate`/`dispose` to it instead of its kind.
pub trait ProcessingStrategy: Send {
    fn process(&mut self, ctx: &EvalContext, inputs: &[Option<Frame>]) -> Option<Frame>;

    fn invalidate(&mut self) {}

    fn dispose(&mut self) {}

    fn is_ready(&self) -> bool {
        true
    }
}

impl<F> ProcessingStrategy for F
where
    F: FnMut(&EvalContext, &[Option<Frame>]) -> Option<Frame> + Send,
{
    fn process(&mut self, ctx: &EvalContext, inputs: &[Option<Frame>]) -> Option<Frame> {
        self(ctx, inputs)
    }
}

#[derive(Debug, Clone)]
struct Memo {
    ctx: EvalContext,
    output: Option<Frame>,
}

/// Graph vertex.
pub struct Node {
    id: Uuid,
    kind: NodeKind,
    attrs: Attrs,
    strategy: Option<Box<dyn ProcessingStrategy>>,
    pub(crate) inputs: Vec<Uuid>,
    pub(crate) consumers: IndexSet<Uuid>,
    dirty: bool,
    memo: Option<Memo>,
    disposed: bool,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("type", &self.node_type())
            .field("inputs", &self.inputs)
            .field("consumers", &self.consumers)
            .field("dirty", &self.dirty)
            .field("strategy", &self.strategy.is_some())
            .finish()
    }
}

impl Node {
    /// New node, dirty until first evaluated.
    pub fn new(name: impl Into<String>, kind: impl Into<NodeKind>) -> Self {
        let mut attrs = Attrs::new();
        attrs.set(A_NAME, AttrValue::Str(name.into()));
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            attrs,
            strategy: None,
            inputs: Vec::new(),
            consumers: IndexSet::new(),
            dirty: true,
            memo: None,
            disposed: false,
        }
    }

    /// Node whose behavior comes entirely from `strategy`.
    pub fn with_strategy(
        name: impl Into<String>,
        type_name: impl Into<String>,
        strategy: Box<dyn ProcessingStrategy>,
    ) -> Self {
        let mut node = Self::new(name, CustomNode::new(type_name));
        node.strategy = Some(strategy);
        node
    }

    /// Builder-style attribute, for construction before the node joins a graph.
    pub fn with_attr(mut self, key: &str, value: AttrValue) -> Self {
        self.attrs.set(key, value);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        self.attrs.get_str(A_NAME).unwrap_or("")
    }

    pub fn node_type(&self) -> &str {
        self.kind.node_type()
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    /// Producers, in input order
    pub fn inputs(&self) -> &[Uuid] {
        &self.inputs
    }

    /// Nodes reading this one
    pub fn consumers(&self) -> impl Iterator<Item = &Uuid> + '_ {
        self.consumers.iter()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn has_strategy(&self) -> bool {
        self.strategy.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Memoized output for `ctx`, if still valid.
    pub(crate) fn memoized(&self, ctx: &EvalContext) -> Option<Option<Frame>> {
        if self.dirty {
            return None;
        }
        self.memo
            .as_ref()
            .filter(|m| m.ctx == *ctx)
            .map(|m| m.output.clone())
    }

    /// Process with already evaluated inputs and memoize the result.
    pub(crate) fn run(&mut self, ctx: &EvalContext, inputs: &[Option<Frame>], inputs_clean: bool) -> Option<Frame> {
        let (output, ready) = match self.strategy.as_mut() {
            Some(strategy) => {
                let out = strategy.process(ctx, inputs);
                (out, strategy.is_ready())
            }
            None => {
                let out = self.kind.process(ctx, &self.attrs, inputs);
                (out, self.kind.is_ready())
            }
        };

        self.memo = Some(Memo {
            ctx: *ctx,
            output: output.clone(),
        });
        self.dirty = !(inputs_clean && ready);
        if self.dirty {
            trace!("Node {} ({}) stays dirty: inputs_clean={}, ready={}", self.name(), self.id, inputs_clean, ready);
        }
        output
    }

    /// Store a property. Returns true if the value changed.
    pub(crate) fn set_attr(&mut self, key: &str, value: AttrValue) -> bool {
        self.attrs.set(key, value)
    }

    /// Mark dirty and drop derived state.
    pub(crate) fn invalidate(&mut self) {
        self.dirty = true;
        self.memo = None;
        match self.strategy.as_mut() {
            Some(strategy) => strategy.invalidate(),
            None => self.kind.invalidate(),
        }
    }

    /// Replace the strategy; the previous one is disposed.
    pub(crate) fn attach_strategy(&mut self, strategy: Option<Box<dyn ProcessingStrategy>>) {
        if let Some(mut old) = self.strategy.take() {
            old.dispose();
        }
        // The kind stops processing while a strategy is attached
        self.kind.invalidate();
        self.strategy = strategy;
        self.dirty = true;
        self.memo = None;
    }

    /// Idempotent.
    pub(crate) fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(mut strategy) = self.strategy.take() {
            strategy.dispose();
        }
        self.kind.dispose();
        self.memo = None;
        self.dirty = true;
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.dispose();
    }
}
