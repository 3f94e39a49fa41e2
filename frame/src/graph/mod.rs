//! Pass dependency graph.
//!
//! A [`PassGraph`] collects the passes of one command stream submission
//! together with explicit dependency edges, orders them topologically and
//! dispatches them into the stream.
//!
//! # Architecture
//!
//! | Layer | Type | Purpose |
//! |-------|------|---------|
//! | Pipeline | [`FramePipeline`](crate::pipeline::FramePipeline) | Frames in flight |
//! | **Graph** | [`PassGraph`] | Pass dependencies (this module) |
//! | Pass | [`RenderPass`], [`ComputePass`], [`BlitPass`] | Single GPU operation |
//!
//! Nodes live in an arena addressed by [`NodeId`]; edges are index pairs.
//! A graph is single-use: [`PassGraph::dispatch`] consumes it, and the next
//! frame builds a fresh one.
//!
//! # Ordering
//!
//! Kahn's algorithm with a FIFO queue. Nodes that become ready at the same
//! time keep their registration order, so a fixed registration sequence
//! always produces the same dispatch order.
//!
//! # Example
//!
//! ```ignore
//! let mut graph = PassGraph::new();
//! let lighting = graph.register_node(RenderPass::new("lighting", |s| { /* ... */ }), &[]);
//! let shadows = graph.register_node(RenderPass::new("shadows", |s| { /* ... */ }), &[]);
//! graph.add_dependency(lighting, shadows);
//!
//! let mut stream = device.create_command_stream("frame");
//! graph.dispatch(&mut stream); // shadows, lighting
//! ```

mod pass;

use std::collections::VecDeque;

use thiserror::Error;

use crate::command::{CommandStream, PassDescriptor};

pub use pass::{BlitPass, ComputePass, Pass, RenderPass};

/// Handle to a node in a [`PassGraph`].
///
/// `NodeId` is `Copy` and only valid within the graph that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Registration index of the node.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The passes of one submission and their dependency edges.
#[derive(Default)]
pub struct PassGraph {
    nodes: Vec<Box<dyn Pass>>,
    /// Dependency edges stored as (dependency, dependent) pairs.
    edges: Vec<(NodeId, NodeId)>,
}

impl PassGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pass that runs after every node in `dependencies`.
    pub fn register_node(&mut self, pass: impl Pass + 'static, dependencies: &[NodeId]) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        log::trace!(
            "PassGraph: registered '{}' as node {} with {} dependencies",
            pass.name(),
            id.index(),
            dependencies.len()
        );
        self.nodes.push(Box::new(pass));
        for &dependency in dependencies {
            self.add_dependency(id, dependency);
        }
        id
    }

    /// Make `dependent` run after `dependency`.
    ///
    /// # Panics
    ///
    /// Fatal if either handle is unknown or a node would depend on itself.
    pub fn add_dependency(&mut self, dependent: NodeId, dependency: NodeId) {
        let count = self.nodes.len();
        if dependent.index() >= count {
            crate::fatal!(
                "Invalid dependent node {} (dependency {}, graph has {count} passes)",
                dependent.index(),
                dependency.index()
            );
        }
        if dependency.index() >= count {
            crate::fatal!(
                "Invalid dependency node {} (dependent {}, graph has {count} passes)",
                dependency.index(),
                dependent.index()
            );
        }
        if dependent == dependency {
            crate::fatal!("Pass cannot depend on itself (node {})", dependent.index());
        }

        if !self.edges.contains(&(dependency, dependent)) {
            self.edges.push((dependency, dependent));
        }
    }

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Name of a node's pass.
    pub fn name(&self, id: NodeId) -> &str {
        self.nodes[id.index()].name()
    }

    /// Direct dependencies of a node, in the order they were declared.
    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|(_, dependent)| *dependent == id)
            .map(|(dependency, _)| *dependency)
            .collect()
    }

    /// Compute a dispatch order consistent with every dependency edge.
    ///
    /// Returns [`GraphError::CyclicDependency`] listing the nodes that could
    /// not be ordered when the edges contain a cycle.
    pub fn compile(&self) -> Result<CompiledGraph, GraphError> {
        let count = self.nodes.len();
        let mut in_degree = vec![0usize; count];
        let mut successors: Vec<Vec<NodeId>> = vec![Vec::new(); count];

        for &(dependency, dependent) in &self.edges {
            in_degree[dependent.index()] += 1;
            successors[dependency.index()].push(dependent);
        }

        let mut ready: VecDeque<NodeId> = (0..count)
            .filter(|&index| in_degree[index] == 0)
            .map(NodeId::new)
            .collect();
        let mut order = Vec::with_capacity(count);

        while let Some(node) = ready.pop_front() {
            order.push(node);
            for &successor in &successors[node.index()] {
                in_degree[successor.index()] -= 1;
                if in_degree[successor.index()] == 0 {
                    ready.push_back(successor);
                }
            }
        }

        if order.len() < count {
            let involved = (0..count)
                .filter(|&index| in_degree[index] > 0)
                .map(NodeId::new)
                .collect();
            return Err(GraphError::CyclicDependency { involved });
        }

        Ok(CompiledGraph { order })
    }

    /// Order the passes, encode each into `stream`, then finish the stream.
    ///
    /// Consumes the graph. A dependency cycle is a fatal configuration error:
    /// the names of the passes on the cycle are logged and the process
    /// terminates.
    pub fn dispatch(mut self, stream: &mut CommandStream) -> CompiledGraph {
        crate::profile_function!();

        let compiled = match self.compile() {
            Ok(compiled) => compiled,
            Err(GraphError::CyclicDependency { involved }) => {
                let names: Vec<&str> = involved.iter().map(|&id| self.name(id)).collect();
                crate::fatal!(
                    "pass graph for '{}' contains a dependency cycle among {} passes: {:?}",
                    stream.label(),
                    names.len(),
                    names
                );
            }
        };

        for &id in compiled.order() {
            let pass = &mut self.nodes[id.index()];
            let descriptor = PassDescriptor::new(pass.kind(), pass.name())
                .with_timestamps(pass.timestamps().cloned());
            stream.begin_pass(&descriptor);
            pass.encode(stream);
            stream.end_pass();
        }
        stream.finish();

        log::trace!(
            "PassGraph: dispatched {} passes into '{}'",
            compiled.len(),
            stream.label()
        );
        compiled
    }
}

impl std::fmt::Debug for PassGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.nodes.iter().map(|pass| pass.name()).collect();
        f.debug_struct("PassGraph")
            .field("nodes", &names)
            .field("edges", &self.edges)
            .finish()
    }
}

/// A dispatch order for a [`PassGraph`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledGraph {
    order: Vec<NodeId>,
}

impl CompiledGraph {
    /// Node execution order.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Number of ordered nodes.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the order is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Position of a node in the order.
    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.order.iter().position(|&node| node == id)
    }
}

/// Errors that can occur during graph compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The dependency edges contain a cycle through `involved`.
    #[error("pass graph contains a cyclic dependency among {} nodes", involved.len())]
    CyclicDependency { involved: Vec<NodeId> },
}
