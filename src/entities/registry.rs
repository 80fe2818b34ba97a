//! Node type registry: type name -> constructor.
//!
//! Populated explicitly at startup. `with_builtins()` registers the types that
//! need no external collaborators; `Source` needs a `FrameSource` and is added
//! with `register_source`. Strategy-backed types get a `Custom` kind with the
//! strategy attached.

use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;

use super::effects::GainNode;
use super::graph::GraphError;
use super::merge_node::MergeNode;
use super::node::{Node, ProcessingStrategy};
use super::node_kind::NodeKind;
use super::solid_node::SolidNode;
use super::source_node::SourceNode;
use super::traits::FrameSource;

pub type NodeCtor = Box<dyn Fn() -> NodeKind + Send + Sync>;
pub type StrategyFactory = Box<dyn Fn() -> Box<dyn ProcessingStrategy> + Send + Sync>;

enum Constructor {
    Kind(NodeCtor),
    Strategy(StrategyFactory),
}

#[derive(Default)]
pub struct NodeRegistry {
    types: IndexMap<String, Constructor>,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry").field("types", &self.type_names()).finish()
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `Solid`, `Gain` and `Merge`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.insert("Solid", Constructor::Kind(Box::new(|| SolidNode.into())));
        registry.insert("Gain", Constructor::Kind(Box::new(|| GainNode.into())));
        registry.insert("Merge", Constructor::Kind(Box::new(|| MergeNode.into())));
        registry
    }

    fn insert(&mut self, type_name: &str, ctor: Constructor) {
        self.types.insert(type_name.to_string(), ctor);
    }

    fn check_free(&self, type_name: &str) -> Result<(), GraphError> {
        if self.types.contains_key(type_name) {
            return Err(GraphError::DuplicateType(type_name.to_string()));
        }
        Ok(())
    }

    /// Register a built-in kind under `type_name`.
    pub fn register(
        &mut self,
        type_name: &str,
        ctor: impl Fn() -> NodeKind + Send + Sync + 'static,
    ) -> Result<(), GraphError> {
        self.check_free(type_name)?;
        self.insert(type_name, Constructor::Kind(Box::new(ctor)));
        debug!("Registered node type {}", type_name);
        Ok(())
    }

    /// Register `Source` nodes reading from `source`.
    pub fn register_source(&mut self, source: Arc<dyn FrameSource>) -> Result<(), GraphError> {
        self.register("Source", move || SourceNode::new(Arc::clone(&source)).into())
    }

    /// Register a type whose behavior is a fresh strategy per node.
    pub fn register_strategy(
        &mut self,
        type_name: &str,
        factory: impl Fn() -> Box<dyn ProcessingStrategy> + Send + Sync + 'static,
    ) -> Result<(), GraphError> {
        self.check_free(type_name)?;
        self.insert(type_name, Constructor::Strategy(Box::new(factory)));
        debug!("Registered strategy node type {}", type_name);
        Ok(())
    }

    /// Build a node of a registered type.
    pub fn create(&self, type_name: &str, name: &str) -> Result<Node, GraphError> {
        match self.types.get(type_name) {
            Some(Constructor::Kind(ctor)) => Ok(Node::new(name, ctor())),
            Some(Constructor::Strategy(factory)) => Ok(Node::with_strategy(name, type_name, factory())),
            None => Err(GraphError::UnknownType(type_name.to_string())),
        }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Registered names in registration order
    pub fn type_names(&self) -> Vec<&str> {
        self.types.keys().map(|k| k.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::frame::Frame;
    use crate::entities::node::EvalContext;
    use crate::entities::traits::FrameLookup;

    struct NoFrames;

    impl FrameSource for NoFrames {
        fn request(&self, frame: i32) -> FrameLookup {
            FrameLookup::Failed(crate::core::preload::FetchError::Cancelled { frame })
        }
    }

    #[test]
    fn test_builtins() {
        let registry = NodeRegistry::with_builtins();
        assert_eq!(registry.type_names(), vec!["Solid", "Gain", "Merge"]);

        let node = registry.create("Gain", "grade").unwrap();
        assert_eq!(node.node_type(), "Gain");
        assert_eq!(node.name(), "grade");
    }

    #[test]
    fn test_unknown_and_duplicate() {
        let mut registry = NodeRegistry::with_builtins();
        assert_eq!(
            registry.create("Blur", "x").unwrap_err(),
            GraphError::UnknownType("Blur".into())
        );
        assert_eq!(
            registry.register("Solid", || SolidNode.into()).unwrap_err(),
            GraphError::DuplicateType("Solid".into())
        );
    }

    #[test]
    fn test_source_registration() {
        let mut registry = NodeRegistry::with_builtins();
        registry.register_source(Arc::new(NoFrames)).unwrap();
        let node = registry.create("Source", "plate").unwrap();
        assert!(node.kind().is_source());
        assert!(registry.register_source(Arc::new(NoFrames)).is_err());
    }

    #[test]
    fn test_strategy_type_gets_fresh_strategy() {
        let mut registry = NodeRegistry::new();
        registry
            .register_strategy("Invert", || {
                Box::new(|_ctx: &EvalContext, inputs: &[Option<Frame>]| {
                    let src = inputs.first()?.as_ref()?;
                    let (w, h) = src.resolution();
                    let data = src.to_f32().chunks(4).flat_map(|p| [1.0 - p[0], 1.0 - p[1], 1.0 - p[2], p[3]]).collect();
                    Frame::from_f32(w, h, data).ok()
                })
            })
            .unwrap();

        let a = registry.create("Invert", "a").unwrap();
        let b = registry.create("Invert", "b").unwrap();
        assert!(a.has_strategy() && b.has_strategy());
        assert_eq!(a.node_type(), "Invert");
        assert_ne!(a.id(), b.id());
    }
}
