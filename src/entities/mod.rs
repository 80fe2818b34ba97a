//! Entities module - frames, attributes, nodes and the processing graph
//!
//! `node` must come before `node_kind`: the `Processor` trait is registered
//! with enum_dispatch there and consumed by the `NodeKind` enum.

pub mod attrs;
pub mod frame;
pub mod keys;
pub mod node;
pub mod node_kind;

pub mod effects;
pub mod graph;
pub mod merge_node;
pub mod registry;
pub mod solid_node;
pub mod source_node;
pub mod traits;

pub use attrs::{AttrValue, Attrs};
pub use frame::{Frame, FrameError, FrameResource, PixelBuffer, PixelFormat};
pub use graph::{Graph, GraphError};
pub use node::{EvalContext, Node, ProcessingStrategy, Processor, Quality};
pub use node_kind::{CustomNode, NodeKind};
pub use registry::NodeRegistry;
pub use traits::{FrameLookup, FrameSource, PendingFrame};
