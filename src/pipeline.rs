//! The pipeline layer: graph validation (acyclicity, single connected
//! component) and whole-graph orchestration over an arbitrary set of
//! heterogeneously-typed nodes.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::connector::ConnectorHandle;
use crate::error::{Error, Result};
use crate::ids::{NodeId, PipelineId};
use crate::node::{Node, NodeAction};

/// Object-safe view of a [`Node`], independent of its `NodeAction::Item`
/// type. A `Pipeline` holds nodes only through this trait so it can mix
/// nodes whose items are `u32`, `String`, or whatever else in one graph.
pub trait PipelineNode: Send + Sync {
    /// This node's stable identity.
    fn id(&self) -> NodeId;
    /// This node's human-readable name.
    fn name(&self) -> String;
    /// Type-erased handles to this node's owned inputs.
    fn input_handles(&self) -> Vec<Box<dyn ConnectorHandle>>;
    /// Type-erased handles to this node's owned outputs.
    fn output_handles(&self) -> Vec<Box<dyn ConnectorHandle>>;
    /// Checks that this node has at least one connector and that every
    /// connector it owns has a partner.
    fn validate(&self) -> Result<()>;
    /// Starts this node's worker pool without waiting for it.
    fn start_async(&self) -> Result<()>;
    /// Joins this node's worker pool.
    fn join(&self) -> Result<()>;
    /// Kills this node's worker pool.
    fn kill(&self) -> Result<()>;
    /// True iff every worker in this node's pool has reported completion.
    fn is_finished(&self) -> bool;
}

impl<A: NodeAction> PipelineNode for Node<A> {
    fn id(&self) -> NodeId {
        Node::id(self)
    }

    fn name(&self) -> String {
        Node::name(self).to_string()
    }

    fn input_handles(&self) -> Vec<Box<dyn ConnectorHandle>> {
        Node::input_handles(self)
    }

    fn output_handles(&self) -> Vec<Box<dyn ConnectorHandle>> {
        Node::output_handles(self)
    }

    fn validate(&self) -> Result<()> {
        Node::validate(self)
    }

    fn start_async(&self) -> Result<()> {
        Node::start_async(self)
    }

    fn join(&self) -> Result<()> {
        Node::join(self)
    }

    fn kill(&self) -> Result<()> {
        Node::kill(self)
    }

    fn is_finished(&self) -> bool {
        Node::is_finished(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// An ordered collection of nodes, validated as a directed acyclic graph
/// that forms exactly one connected component before it can run.
pub struct Pipeline {
    id: PipelineId,
    name: String,
    nodes: Vec<Arc<dyn PipelineNode>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("nodes", &self.nodes.iter().map(|n| n.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Pipeline {
    /// Creates an empty, unvalidated pipeline named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { id: PipelineId::new(), name: name.into(), nodes: Vec::new() }
    }

    /// This pipeline's stable identity.
    pub fn id(&self) -> PipelineId {
        self.id
    }

    /// This pipeline's human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a node with the pipeline. Order of registration has no
    /// bearing on execution order; every node's workers run concurrently.
    pub fn add_node<A: NodeAction>(&mut self, node: Node<A>) -> &mut Self {
        self.nodes.push(Arc::new(node));
        self
    }

    /// Every registered node, in registration order.
    pub fn nodes(&self) -> &[Arc<dyn PipelineNode>] {
        &self.nodes
    }

    /// Validates every node individually, then validates the graph itself:
    /// acyclic, and a single connected component spanning every node.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            tracing::warn!(pipeline = %self.id, "rejected validating a pipeline with no nodes");
            return Err(Error::PipelineValidation("pipeline has no nodes".into()));
        }
        for node in &self.nodes {
            node.validate()?;
        }
        self.check_acyclic()?;
        self.check_connected()?;
        Ok(())
    }

    /// Maps each node to the set of node ids its outputs feed into.
    fn adjacency(&self) -> HashMap<NodeId, HashSet<NodeId>> {
        let mut adjacency: HashMap<NodeId, HashSet<NodeId>> =
            self.nodes.iter().map(|n| (n.id(), HashSet::new())).collect();
        for node in &self.nodes {
            for output in node.output_handles() {
                for partner_id in output.partner_ids() {
                    if let Some(downstream) = self.node_owning_connector(partner_id) {
                        adjacency.get_mut(&node.id()).unwrap().insert(downstream);
                    }
                }
            }
        }
        adjacency
    }

    fn node_owning_connector(&self, connector: crate::ids::ConnectorId) -> Option<NodeId> {
        for node in &self.nodes {
            for input in node.input_handles() {
                if input.id() == connector {
                    return Some(node.id());
                }
            }
        }
        None
    }

    /// Three-color DFS cycle detection: a back-edge into a `Gray` node
    /// means the graph is cyclic.
    fn check_acyclic(&self) -> Result<()> {
        let adjacency = self.adjacency();
        let mut color: HashMap<NodeId, Color> =
            self.nodes.iter().map(|n| (n.id(), Color::White)).collect();

        for node in &self.nodes {
            if color[&node.id()] == Color::White {
                self.visit_acyclic(node.id(), &adjacency, &mut color)?;
            }
        }
        Ok(())
    }

    fn visit_acyclic(
        &self,
        current: NodeId,
        adjacency: &HashMap<NodeId, HashSet<NodeId>>,
        color: &mut HashMap<NodeId, Color>,
    ) -> Result<()> {
        color.insert(current, Color::Gray);
        for &next in adjacency.get(&current).into_iter().flatten() {
            match color[&next] {
                Color::White => self.visit_acyclic(next, adjacency, color)?,
                Color::Gray => {
                    tracing::warn!(pipeline = %self.id, node = %next, "cycle detected during pipeline validation");
                    return Err(Error::PipelineValidation(format!(
                        "cycle detected: node {next} is reachable from itself"
                    )));
                }
                Color::Black => {}
            }
        }
        color.insert(current, Color::Black);
        Ok(())
    }

    /// Treats the graph as undirected and confirms a single traversal from
    /// any node reaches every other node.
    fn check_connected(&self) -> Result<()> {
        let directed = self.adjacency();
        let mut undirected: HashMap<NodeId, HashSet<NodeId>> =
            self.nodes.iter().map(|n| (n.id(), HashSet::new())).collect();
        for (from, tos) in &directed {
            for &to in tos {
                undirected.get_mut(from).unwrap().insert(to);
                undirected.get_mut(&to).unwrap().insert(*from);
            }
        }

        let start = self.nodes[0].id();
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for &next in undirected.get(&current).into_iter().flatten() {
                if !visited.contains(&next) {
                    stack.push(next);
                }
            }
        }

        if visited.len() != self.nodes.len() {
            tracing::warn!(
                pipeline = %self.id,
                reachable = visited.len(),
                total = self.nodes.len(),
                "pipeline is not a single connected component"
            );
            return Err(Error::PipelineValidation(format!(
                "pipeline is not a single connected component: {} of {} nodes reachable from {start}",
                visited.len(),
                self.nodes.len(),
            )));
        }
        Ok(())
    }

    /// Validates the graph, then starts every node's worker pool without
    /// waiting for any of them.
    pub fn run_async(&self) -> Result<()> {
        self.validate()?;
        for node in &self.nodes {
            node.start_async()?;
        }
        tracing::debug!(pipeline = %self.id, nodes = self.nodes.len(), "pipeline started");
        Ok(())
    }

    /// `run_async` followed by `join`.
    pub fn run(&self) -> Result<()> {
        self.run_async()?;
        self.join()
    }

    /// Joins every node, collecting the first error encountered while
    /// still joining the rest.
    pub fn join(&self) -> Result<()> {
        let mut first_err = None;
        for node in &self.nodes {
            if let Err(e) = node.join() {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Kills every node's worker pool.
    pub fn kill(&self) -> Result<()> {
        let mut first_err = None;
        for node in &self.nodes {
            if let Err(e) = node.kill() {
                first_err.get_or_insert(e);
            }
        }
        tracing::warn!(pipeline = %self.id, "pipeline killed");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// True iff every registered node reports finished.
    pub fn is_finished(&self) -> bool {
        self.nodes.iter().all(|n| n.is_finished())
    }
}
