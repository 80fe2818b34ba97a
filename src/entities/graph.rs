//! Processing graph: owns nodes, edges and evaluation.
//!
//! # Edges
//!
//! `connect(producer, consumer)` makes `consumer` read `producer`. The edge is
//! rejected, with the graph unchanged, when `producer` already depends on
//! `consumer` (walk from `producer` along existing input edges). That walk is
//! the only cycle check needed: every edge goes through it, so the graph is
//! acyclic at all times.
//!
//! # Dirty propagation
//!
//! Any property change, edge change or explicit invalidation dirties the node
//! and every transitive consumer (iterative walk with a visited set, so
//! diamonds are visited once).
//!
//! # Evaluation
//!
//! Pull-based and depth-first: a clean node with a matching context returns its
//! memo, otherwise its inputs are evaluated first, in input order.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use indexmap::IndexMap;
use log::{debug, trace};
use uuid::Uuid;

use super::attrs::{AttrValue, Attrs};
use super::frame::Frame;
use super::node::{EvalContext, Node, ProcessingStrategy};
use super::registry::NodeRegistry;

/// Structural and lifecycle errors. The graph is unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    UnknownNode(Uuid),
    UnknownType(String),
    DuplicateType(String),
    /// Edge would close a cycle (`producer` already depends on `consumer`)
    Cycle { producer: Uuid, consumer: Uuid },
    AlreadyConnected { producer: Uuid, consumer: Uuid },
    NotConnected { producer: Uuid, consumer: Uuid },
    /// Graph was disposed
    Disposed,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::UnknownNode(id) => write!(f, "Unknown node {}", id),
            GraphError::UnknownType(t) => write!(f, "Unknown node type '{}'", t),
            GraphError::DuplicateType(t) => write!(f, "Node type '{}' is already registered", t),
            GraphError::Cycle { producer, consumer } => {
                write!(f, "Connecting {} -> {} would create a cycle", producer, consumer)
            }
            GraphError::AlreadyConnected { producer, consumer } => {
                write!(f, "{} is already an input of {}", producer, consumer)
            }
            GraphError::NotConnected { producer, consumer } => {
                write!(f, "{} is not an input of {}", producer, consumer)
            }
            GraphError::Disposed => write!(f, "Graph has been disposed"),
        }
    }
}

impl std::error::Error for GraphError {}

/// DAG of processing nodes.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: IndexMap<Uuid, Node>,
    disposed: bool,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_alive(&self) -> Result<(), GraphError> {
        if self.disposed { Err(GraphError::Disposed) } else { Ok(()) }
    }

    fn get(&self, id: Uuid) -> Result<&Node, GraphError> {
        self.check_alive()?;
        self.nodes.get(&id).ok_or(GraphError::UnknownNode(id))
    }

    fn get_mut(&mut self, id: Uuid) -> Result<&mut Node, GraphError> {
        self.check_alive()?;
        self.nodes.get_mut(&id).ok_or(GraphError::UnknownNode(id))
    }

    /// Take ownership of a node. Edges it carries from elsewhere are dropped.
    pub fn add_node(&mut self, mut node: Node) -> Result<Uuid, GraphError> {
        self.check_alive()?;
        node.inputs.clear();
        node.consumers.clear();
        let id = node.id();
        debug!("Graph: added {} node '{}' ({})", node.node_type(), node.name(), id);
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Create a node through the registry and add it.
    pub fn create_node(&mut self, registry: &NodeRegistry, type_name: &str, name: &str) -> Result<Uuid, GraphError> {
        self.check_alive()?;
        let node = registry.create(type_name, name)?;
        self.add_node(node)
    }

    pub fn node(&self, id: Uuid) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Node ids in insertion order
    pub fn ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.nodes.keys().copied()
    }

    /// True if `node` reads `dependency`, directly or transitively.
    pub fn depends_on(&self, node: Uuid, dependency: Uuid) -> bool {
        let mut stack: Vec<Uuid> = match self.nodes.get(&node) {
            Some(n) => n.inputs.clone(),
            None => return false,
        };
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == dependency {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(n) = self.nodes.get(&current) {
                stack.extend(n.inputs.iter().copied());
            }
        }
        false
    }

    /// Append `producer` to `consumer`'s inputs.
    pub fn connect(&mut self, producer: Uuid, consumer: Uuid) -> Result<(), GraphError> {
        self.get(producer)?;
        if self.get(consumer)?.inputs.contains(&producer) {
            return Err(GraphError::AlreadyConnected { producer, consumer });
        }
        if producer == consumer || self.depends_on(producer, consumer) {
            debug!("Graph: rejected {} -> {} (cycle)", producer, consumer);
            return Err(GraphError::Cycle { producer, consumer });
        }

        self.get_mut(consumer)?.inputs.push(producer);
        self.get_mut(producer)?.consumers.insert(consumer);
        trace!("Graph: connected {} -> {}", producer, consumer);
        self.mark_dirty(consumer);
        Ok(())
    }

    /// Remove the `producer` -> `consumer` edge.
    pub fn disconnect(&mut self, producer: Uuid, consumer: Uuid) -> Result<(), GraphError> {
        self.get(producer)?;
        let consumer_node = self.get_mut(consumer)?;
        let Some(pos) = consumer_node.inputs.iter().position(|&i| i == producer) else {
            return Err(GraphError::NotConnected { producer, consumer });
        };
        consumer_node.inputs.remove(pos);
        self.get_mut(producer)?.consumers.shift_remove(&consumer);
        trace!("Graph: disconnected {} -> {}", producer, consumer);
        self.mark_dirty(consumer);
        Ok(())
    }

    /// Detach a node from every input and consumer, then drop it.
    pub fn remove_node(&mut self, id: Uuid) -> Result<(), GraphError> {
        let node = self.get(id)?;
        // Disconnecting edits both lists, so iterate over copies
        let inputs = node.inputs.clone();
        let consumers: Vec<Uuid> = node.consumers.iter().copied().collect();

        for producer in inputs {
            self.disconnect(producer, id)?;
        }
        for consumer in consumers {
            self.disconnect(id, consumer)?;
        }

        if let Some(mut node) = self.nodes.shift_remove(&id) {
            debug!("Graph: removed {} node '{}' ({})", node.node_type(), node.name(), id);
            node.dispose();
        }
        Ok(())
    }

    /// Set a property. Dirties the node and its consumers if the value changed.
    pub fn set_attr(&mut self, id: Uuid, key: &str, value: AttrValue) -> Result<bool, GraphError> {
        let changed = self.get_mut(id)?.set_attr(key, value);
        if changed {
            self.mark_dirty(id);
        }
        Ok(changed)
    }

    pub fn attrs(&self, id: Uuid) -> Result<&Attrs, GraphError> {
        Ok(self.get(id)?.attrs())
    }

    /// Attach (or with `None`, detach) an external processing strategy.
    pub fn attach_strategy(&mut self, id: Uuid, strategy: Option<Box<dyn ProcessingStrategy>>) -> Result<(), GraphError> {
        let node = self.get_mut(id)?;
        node.attach_strategy(strategy);
        let consumers: Vec<Uuid> = node.consumers.iter().copied().collect();
        for consumer in consumers {
            self.mark_dirty(consumer);
        }
        Ok(())
    }

    /// Explicitly dirty a node and everything downstream.
    pub fn invalidate(&mut self, id: Uuid) -> Result<(), GraphError> {
        self.get(id)?;
        self.mark_dirty(id);
        Ok(())
    }

    pub fn is_dirty(&self, id: Uuid) -> Result<bool, GraphError> {
        Ok(self.get(id)?.is_dirty())
    }

    fn mark_dirty(&mut self, id: Uuid) {
        let mut stack = vec![id];
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get_mut(&current) {
                node.invalidate();
                stack.extend(node.consumers.iter().copied());
            }
        }
        trace!("Graph: {} node(s) dirtied from {}", visited.len(), id);
    }

    /// Pull the output of `id` for `ctx`.
    pub fn evaluate(&mut self, id: Uuid, ctx: &EvalContext) -> Result<Option<Frame>, GraphError> {
        self.get(id)?;
        Ok(self.eval_node(id, ctx))
    }

    fn eval_node(&mut self, id: Uuid, ctx: &EvalContext) -> Option<Frame> {
        let node = self.nodes.get(&id)?;
        if let Some(output) = node.memoized(ctx) {
            return output;
        }

        let inputs = node.inputs.clone();
        let mut artifacts = Vec::with_capacity(inputs.len());
        let mut inputs_clean = true;
        for input in inputs {
            artifacts.push(self.eval_node(input, ctx));
            inputs_clean &= self.nodes.get(&input).is_some_and(|n| !n.is_dirty());
        }

        let node = self.nodes.get_mut(&id)?;
        trace!("Graph: processing '{}' at frame {}", node.name(), ctx.frame);
        node.run(ctx, &artifacts, inputs_clean)
    }

    /// All nodes, each after all of its inputs. Ties keep insertion order.
    pub fn evaluation_order(&self) -> Vec<Uuid> {
        let mut pending: IndexMap<Uuid, usize> = self.nodes.iter().map(|(id, n)| (*id, n.inputs.len())).collect();
        let mut ready: VecDeque<Uuid> = pending.iter().filter(|(_, deg)| **deg == 0).map(|(id, _)| *id).collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = ready.pop_front() {
            order.push(id);
            let Some(node) = self.nodes.get(&id) else { continue };
            for consumer in &node.consumers {
                if let Some(deg) = pending.get_mut(consumer) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push_back(*consumer);
                    }
                }
            }
        }

        debug_assert_eq!(order.len(), self.nodes.len(), "graph contains a cycle");
        order
    }

    /// Dispose every node and refuse further use. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        let count = self.nodes.len();
        for (_, mut node) in self.nodes.drain(..) {
            node.dispose();
        }
        debug!("Graph disposed ({} nodes)", count);
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.dispose();
    }
}
