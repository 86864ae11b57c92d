//! Graph nodes and the operations they carry.

use std::sync::atomic::{AtomicU64, Ordering};

use lattice_core::error::{Result, RuntimeError};
use lattice_core::types::{NodeId, NodeKind};
use lattice_device::Device;

use crate::graph::Graph;
use crate::ops::{
    EventNodeParams, HostParams, KernelParams, Memcpy1dParams, Memcpy3dParams, MemsetParams,
    SymbolCopyParams,
};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_node_id() -> NodeId {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// The work a node performs, together with its parameters.
#[derive(Debug)]
pub enum NodeOp {
    Kernel(KernelParams),
    Memcpy(Memcpy3dParams),
    Memcpy1d(Memcpy1dParams),
    MemcpyToSymbol(SymbolCopyParams),
    MemcpyFromSymbol(SymbolCopyParams),
    Memset(MemsetParams),
    EventRecord(EventNodeParams),
    EventWait(EventNodeParams),
    Host(HostParams),
    /// Owns a private clone of the graph it was created from.
    ChildGraph(Graph),
    Empty,
}

impl NodeOp {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeOp::Kernel(_) => NodeKind::Kernel,
            NodeOp::Memcpy(_) => NodeKind::Memcpy,
            NodeOp::Memcpy1d(_) => NodeKind::Memcpy1d,
            NodeOp::MemcpyToSymbol(_) => NodeKind::MemcpyToSymbol,
            NodeOp::MemcpyFromSymbol(_) => NodeKind::MemcpyFromSymbol,
            NodeOp::Memset(_) => NodeKind::Memset,
            NodeOp::EventRecord(_) => NodeKind::EventRecord,
            NodeOp::EventWait(_) => NodeKind::EventWait,
            NodeOp::Host(_) => NodeKind::Host,
            NodeOp::ChildGraph(_) => NodeKind::ChildGraph,
            NodeOp::Empty => NodeKind::Empty,
        }
    }

    /// Deep copy. A child graph is re-cloned with fresh node ids.
    pub fn duplicate(&self) -> NodeOp {
        match self {
            NodeOp::Kernel(p) => NodeOp::Kernel(p.clone()),
            NodeOp::Memcpy(p) => NodeOp::Memcpy(p.clone()),
            NodeOp::Memcpy1d(p) => NodeOp::Memcpy1d(p.clone()),
            NodeOp::MemcpyToSymbol(p) => NodeOp::MemcpyToSymbol(p.clone()),
            NodeOp::MemcpyFromSymbol(p) => NodeOp::MemcpyFromSymbol(p.clone()),
            NodeOp::Memset(p) => NodeOp::Memset(p.clone()),
            NodeOp::EventRecord(p) => NodeOp::EventRecord(p.clone()),
            NodeOp::EventWait(p) => NodeOp::EventWait(p.clone()),
            NodeOp::Host(p) => NodeOp::Host(p.clone()),
            NodeOp::ChildGraph(graph) => NodeOp::ChildGraph(graph.clone_with_map().0),
            NodeOp::Empty => NodeOp::Empty,
        }
    }

    /// Replace this op's parameters with `other`'s. The kinds must match;
    /// for child graphs the nested topologies must match as well.
    pub fn set_params(&mut self, other: &NodeOp) -> Result<()> {
        if self.kind() != other.kind() {
            return Err(RuntimeError::KindMismatch {
                expected: self.kind(),
                found: other.kind(),
            });
        }
        match (self, other) {
            (NodeOp::Kernel(dst), NodeOp::Kernel(src)) => *dst = src.clone(),
            (NodeOp::Memcpy(dst), NodeOp::Memcpy(src)) => *dst = src.clone(),
            (NodeOp::Memcpy1d(dst), NodeOp::Memcpy1d(src)) => *dst = src.clone(),
            (NodeOp::MemcpyToSymbol(dst), NodeOp::MemcpyToSymbol(src)) => *dst = src.clone(),
            (NodeOp::MemcpyFromSymbol(dst), NodeOp::MemcpyFromSymbol(src)) => *dst = src.clone(),
            (NodeOp::Memset(dst), NodeOp::Memset(src)) => *dst = src.clone(),
            (NodeOp::EventRecord(dst), NodeOp::EventRecord(src)) => *dst = src.clone(),
            (NodeOp::EventWait(dst), NodeOp::EventWait(src)) => *dst = src.clone(),
            (NodeOp::Host(dst), NodeOp::Host(src)) => *dst = src.clone(),
            (NodeOp::ChildGraph(dst), NodeOp::ChildGraph(src)) => dst.copy_params_from(src)?,
            (NodeOp::Empty, NodeOp::Empty) => {}
            // kind() already matched above
            _ => unreachable!("kind check admits only matching variants"),
        }
        Ok(())
    }

    /// Check the parameters against device limits and operand bounds.
    pub fn validate(&self, device: &Device) -> Result<()> {
        match self {
            NodeOp::Kernel(p) => p.validate(device),
            NodeOp::Memcpy(p) => p.validate(device),
            NodeOp::Memcpy1d(p) => p.validate(device),
            NodeOp::MemcpyToSymbol(p) => p.validate(device, true),
            NodeOp::MemcpyFromSymbol(p) => p.validate(device, false),
            NodeOp::Memset(p) => p.validate(device),
            NodeOp::ChildGraph(graph) => graph.validate(device),
            NodeOp::EventRecord(_) | NodeOp::EventWait(_) | NodeOp::Host(_) | NodeOp::Empty => {
                Ok(())
            }
        }
    }
}

/// A node of the task graph: an operation plus its structural position.
#[derive(Debug)]
pub struct TaskNode {
    id: NodeId,
    op: NodeOp,
    level: u32,
    deps: Vec<NodeId>,
    edges: Vec<NodeId>,
}

impl TaskNode {
    pub(crate) fn new(op: NodeOp) -> TaskNode {
        TaskNode {
            id: next_node_id(),
            op,
            level: 0,
            deps: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn op(&self) -> &NodeOp {
        &self.op
    }

    pub(crate) fn op_mut(&mut self) -> &mut NodeOp {
        &mut self.op
    }

    pub fn kind(&self) -> NodeKind {
        self.op.kind()
    }

    /// Longest-path depth from the roots; roots are level 0.
    pub fn level(&self) -> u32 {
        self.level
    }

    pub(crate) fn set_level(&mut self, level: u32) {
        self.level = level;
    }

    pub fn in_degree(&self) -> usize {
        self.deps.len()
    }

    pub fn out_degree(&self) -> usize {
        self.edges.len()
    }

    /// Parents, in the order their edges were added.
    pub fn dependencies(&self) -> &[NodeId] {
        &self.deps
    }

    /// Children, in the order their edges were added.
    pub fn dependents(&self) -> &[NodeId] {
        &self.edges
    }

    pub(crate) fn deps_mut(&mut self) -> &mut Vec<NodeId> {
        &mut self.deps
    }

    pub(crate) fn edges_mut(&mut self) -> &mut Vec<NodeId> {
        &mut self.edges
    }
}
