//! The mutable task graph.
//!
//! Nodes live in an id-addressed arena and keep their insertion order, which
//! every traversal and query uses as the tiebreaker. Levels (longest-path
//! depth from the roots) are maintained incrementally on edge insertion and
//! removal.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use lattice_core::error::{Result, RuntimeError};
use lattice_core::log_trace;
use lattice_core::types::NodeId;
use lattice_device::Device;

use crate::node::{NodeOp, TaskNode};

/// A directed acyclic graph of task nodes.
#[derive(Debug, Default)]
pub struct Graph {
    order: Vec<NodeId>,
    nodes: HashMap<NodeId, TaskNode>,
}

impl Graph {
    pub fn new() -> Graph {
        Graph::default()
    }

    /// Insert a node with no dependencies. Returns its process-unique id.
    pub fn add_node(&mut self, op: NodeOp) -> NodeId {
        let node = TaskNode::new(op);
        let id = node.id();
        log_trace!("graph", node = id, kind = %node.kind(), "Added node");
        self.order.push(id);
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node, detaching every edge first so no neighbor keeps a
    /// reference to it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        self.node(id)?;
        for parent in self.nodes[&id].dependencies().to_vec() {
            self.remove_edge(parent, id)?;
        }
        for child in self.nodes[&id].dependents().to_vec() {
            self.remove_edge(id, child)?;
        }
        self.order.retain(|&n| n != id);
        self.nodes.remove(&id);
        log_trace!("graph", node = id, "Removed node");
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Result<&TaskNode> {
        self.nodes.get(&id).ok_or(RuntimeError::NodeNotFound(id))
    }

    /// Mutable access to a node's operation; used by plan update.
    pub fn op_mut(&mut self, id: NodeId) -> Result<&mut NodeOp> {
        self.nodes
            .get_mut(&id)
            .map(TaskNode::op_mut)
            .ok_or(RuntimeError::NodeNotFound(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> &[NodeId] {
        &self.order
    }

    /// Every edge as `(parent, child)`, parents in insertion order.
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        let mut out = Vec::new();
        for &id in &self.order {
            for &child in self.nodes[&id].dependents() {
                out.push((id, child));
            }
        }
        out
    }

    pub fn edge_count(&self) -> usize {
        self.order.iter().map(|id| self.nodes[id].out_degree()).sum()
    }

    /// Add the dependency `parent -> child`.
    ///
    /// Rejects self-edges and edges that would close a cycle with
    /// [`RuntimeError::CycleDetected`], and repeated insertions with
    /// [`RuntimeError::DuplicateEdge`]. On success the child's level is
    /// raised to at least `parent.level + 1` and the increase is propagated
    /// through its descendants.
    pub fn add_edge(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if parent == child {
            return Err(RuntimeError::CycleDetected { parent, child });
        }
        self.node(parent)?;
        self.node(child)?;
        if self.nodes[&parent].dependents().contains(&child) {
            return Err(RuntimeError::DuplicateEdge { parent, child });
        }
        if self.reaches(child, parent) {
            return Err(RuntimeError::CycleDetected { parent, child });
        }

        if let Some(node) = self.nodes.get_mut(&parent) {
            node.edges_mut().push(child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.deps_mut().push(parent);
        }
        log_trace!("graph", parent = parent, child = child, "Added edge");

        let floor = self.nodes[&parent].level() + 1;
        self.raise_level(child, floor);
        Ok(())
    }

    /// Remove the dependency `parent -> child`.
    ///
    /// Only the child's level is recomputed; descendants keep the level the
    /// removed edge gave them until an insertion raises them again.
    pub fn remove_edge(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.node(parent)?;
        self.node(child)?;
        let position = self.nodes[&parent]
            .dependents()
            .iter()
            .position(|&e| e == child)
            .ok_or(RuntimeError::EdgeNotFound { parent, child })?;
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.edges_mut().remove(position);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            if let Some(pos) = node.deps_mut().iter().position(|&d| d == parent) {
                node.deps_mut().remove(pos);
            }
        }
        log_trace!("graph", parent = parent, child = child, "Removed edge");

        let level = self.nodes[&child]
            .dependencies()
            .iter()
            .map(|d| self.nodes[d].level() + 1)
            .max()
            .unwrap_or(0);
        if let Some(node) = self.nodes.get_mut(&child) {
            node.set_level(level);
        }
        Ok(())
    }

    /// True if `to` is reachable from `from` along dependency edges.
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(v) = stack.pop() {
            if v == to {
                return true;
            }
            if seen.insert(v) {
                stack.extend(self.nodes[&v].dependents().iter().copied());
            }
        }
        false
    }

    /// Raise `start`'s level to at least `floor` and propagate increases.
    fn raise_level(&mut self, start: NodeId, floor: u32) {
        if self.nodes[&start].level() >= floor {
            return;
        }
        if let Some(node) = self.nodes.get_mut(&start) {
            node.set_level(floor);
        }
        let mut worklist = vec![start];
        while let Some(v) = worklist.pop() {
            let next = self.nodes[&v].level() + 1;
            let children: Vec<NodeId> = self.nodes[&v].dependents().to_vec();
            for child in children {
                if self.nodes[&child].level() < next {
                    if let Some(node) = self.nodes.get_mut(&child) {
                        node.set_level(next);
                    }
                    worklist.push(child);
                }
            }
        }
    }

    /// Nodes with no dependencies, in insertion order.
    pub fn root_nodes(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.nodes[id].in_degree() == 0)
            .collect()
    }

    /// Nodes with no dependents, in insertion order.
    pub fn leaf_nodes(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.nodes[id].out_degree() == 0)
            .collect()
    }

    /// All nodes ordered by ascending level, insertion order within a level.
    pub fn level_order(&self) -> Vec<NodeId> {
        let mut ids = self.order.clone();
        ids.sort_by_key(|id| self.nodes[id].level());
        ids
    }

    /// Structural deep copy with fresh node ids.
    ///
    /// Returns the clone together with the old-id to new-id mapping so
    /// callers can translate node references into the clone.
    pub fn clone_with_map(&self) -> (Graph, HashMap<NodeId, NodeId>) {
        let mut clone = Graph::new();
        let mut map = HashMap::with_capacity(self.order.len());
        for &id in &self.order {
            let new_id = clone.add_node(self.nodes[&id].op().duplicate());
            map.insert(id, new_id);
        }
        for &id in &self.order {
            let node = &self.nodes[&id];
            let new_id = map[&id];
            let level = node.level();
            let deps: Vec<NodeId> = node.dependencies().iter().map(|d| map[d]).collect();
            let edges: Vec<NodeId> = node.dependents().iter().map(|e| map[e]).collect();
            if let Some(new_node) = clone.nodes.get_mut(&new_id) {
                new_node.set_level(level);
                *new_node.deps_mut() = deps;
                *new_node.edges_mut() = edges;
            }
        }
        (clone, map)
    }

    /// Copy node parameters from a structurally identical graph.
    ///
    /// The graphs must have the same node count and matching kinds position
    /// by position in insertion order; topology is not re-checked beyond
    /// that, callers compare edges separately when they need to.
    pub fn copy_params_from(&mut self, other: &Graph) -> Result<()> {
        if self.order.len() != other.order.len() {
            return Err(RuntimeError::TopologyMismatch(format!(
                "graph has {} nodes, replacement has {}",
                self.order.len(),
                other.order.len()
            )));
        }
        let ids: Vec<NodeId> = self.order.clone();
        for (dst_id, src_id) in ids.into_iter().zip(other.order.iter().copied()) {
            let src_op = other.nodes[&src_id].op();
            self.op_mut(dst_id)?.set_params(src_op)?;
        }
        Ok(())
    }

    /// Validate every node's parameters against the device.
    pub fn validate(&self, device: &Device) -> Result<()> {
        for &id in &self.order {
            self.nodes[&id].op().validate(device)?;
        }
        Ok(())
    }

    /// Render the graph in Graphviz dot format, one node per line labeled
    /// with its kind and level.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph lattice {\n");
        for &id in &self.order {
            let node = &self.nodes[&id];
            let _ = writeln!(
                out,
                "  n{id} [label=\"{} (L{})\"];",
                node.kind(),
                node.level()
            );
        }
        for (parent, child) in self.edges() {
            let _ = writeln!(out, "  n{parent} -> n{child};");
        }
        out.push_str("}\n");
        out
    }
}
