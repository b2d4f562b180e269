use crate::coder::CoderRegistry;
use crate::node::Node;
use crate::type_token::{VecOps, vec_ops_for};
use crate::window::WindowedValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Unique numeric identifier for a node in a pipeline graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A deferred graph of nodes. Cloning yields another handle onto the same graph.
#[derive(Clone, Default)]
pub struct Pipeline {
    pub(crate) inner: Arc<Mutex<PipelineInner>>,
}

#[derive(Default)]
pub(crate) struct PipelineInner {
    pub(crate) next_id: u64,
    pub(crate) nodes: HashMap<NodeId, Node>,
    /// `(from, to)`; a node's parents are read in insertion order.
    pub(crate) edges: Vec<(NodeId, NodeId)>,
    /// Splitting/cloning helpers for each node's output element type.
    pub(crate) vec_ops: HashMap<NodeId, Arc<dyn VecOps>>,
    pub(crate) coders: CoderRegistry,
}

pub(crate) struct GraphSnapshot {
    pub(crate) nodes: HashMap<NodeId, Node>,
    pub(crate) edges: Vec<(NodeId, NodeId)>,
    pub(crate) vec_ops: HashMap<NodeId, Arc<dyn VecOps>>,
}

impl Pipeline {
    fn lock(&self) -> MutexGuard<'_, PipelineInner> {
        // A poisoned graph is still structurally valid: nodes are only ever added.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a node producing elements of type `T`.
    pub(crate) fn insert_node<T>(&self, node: Node) -> NodeId
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut g = self.lock();
        let id = NodeId(g.next_id);
        g.next_id += 1;
        g.nodes.insert(id, node);
        g.vec_ops.insert(id, vec_ops_for::<WindowedValue<T>>());
        id
    }

    pub(crate) fn connect(&self, from: NodeId, to: NodeId) {
        self.lock().edges.push((from, to));
    }

    /// Copy of the graph for one run.
    pub(crate) fn snapshot(&self) -> GraphSnapshot {
        let g = self.lock();
        GraphSnapshot {
            nodes: g.nodes.clone(),
            edges: g.edges.clone(),
            vec_ops: g.vec_ops.clone(),
        }
    }

    /// A copy of the coder registry combine stages consult at construction.
    pub fn coder_registry(&self) -> CoderRegistry {
        self.lock().coders.clone()
    }

    /// Replace the coder registry.
    pub fn set_coder_registry(&self, coders: CoderRegistry) {
        self.lock().coders = coders;
    }

    /// Register the serde coder for `T` so combine stages can encode it.
    pub fn register_coder<T>(&self)
    where
        T: serde::Serialize + serde::de::DeserializeOwned + 'static,
    {
        self.lock().coders.register::<T>();
    }

    /// Number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }
}
