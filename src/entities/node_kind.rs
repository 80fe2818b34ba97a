//! NodeKind - enum wrapper for all built-in processor types.
//!
//! `Processor` calls are dispatched statically through `enum_dispatch`.
//! Types registered at runtime with a strategy factory use `Custom`, which
//! carries only a type name and produces nothing on its own.

use enum_dispatch::enum_dispatch;
use log::trace;

use super::attrs::Attrs;
use super::effects::GainNode;
use super::frame::Frame;
use super::merge_node::MergeNode;
use super::node::{EvalContext, Processor};
use super::solid_node::SolidNode;
use super::source_node::SourceNode;

#[enum_dispatch(Processor)]
#[derive(Debug)]
pub enum NodeKind {
    Source(SourceNode),
    Solid(SolidNode),
    Gain(GainNode),
    Merge(MergeNode),
    Custom(CustomNode),
}

impl NodeKind {
    pub fn is_source(&self) -> bool {
        matches!(self, NodeKind::Source(_))
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, NodeKind::Custom(_))
    }

    pub fn as_source(&self) -> Option<&SourceNode> {
        match self {
            NodeKind::Source(n) => Some(n),
            _ => None,
        }
    }
}

/// Placeholder processor for strategy-backed node types.
#[derive(Debug, Clone)]
pub struct CustomNode {
    type_name: String,
}

impl CustomNode {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
        }
    }
}

impl Processor for CustomNode {
    fn node_type(&self) -> &str {
        &self.type_name
    }

    fn process(&mut self, _ctx: &EvalContext, _attrs: &Attrs, _inputs: &[Option<Frame>]) -> Option<Frame> {
        trace!("{} node has no strategy attached", self.type_name);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_dispatch() {
        let kind: NodeKind = SolidNode::default().into();
        assert_eq!(kind.node_type(), "Solid");
        assert!(!kind.is_source());

        let mut custom: NodeKind = CustomNode::new("Blur").into();
        assert!(custom.is_custom());
        assert_eq!(custom.node_type(), "Blur");
        assert!(custom.process(&EvalContext::new(0), &Attrs::new(), &[]).is_none());
    }
}
