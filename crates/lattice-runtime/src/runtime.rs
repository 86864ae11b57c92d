//! The runtime facade: handle-based graph building, instantiation, and replay.

use std::sync::Arc;

use lattice_core::error::{Result, RuntimeError};
use lattice_core::log_info;
use lattice_core::types::NodeKind;
use lattice_device::{Device, Event, HostFn, Stream};
use lattice_graph::{
    Graph, KernelParams, Memcpy1dParams, Memcpy3dParams, MemsetParams, NodeOp, SymbolCopyParams,
};
use parking_lot::Mutex;

use crate::plan::ExecPlan;
use crate::registry::{GraphHandle, HandleTable, NodeHandle, PlanHandle};

/// Owns the device, the graph registry, and the plan registry.
///
/// All methods take plain `Copy` handles, so the runtime can be shared
/// freely; lookups through destroyed handles fail with
/// [`RuntimeError::InvalidHandle`].
pub struct GraphRuntime {
    device: Device,
    graphs: HandleTable<Graph>,
    plans: HandleTable<Arc<Mutex<ExecPlan>>>,
}

impl GraphRuntime {
    pub fn new(device: Device) -> GraphRuntime {
        GraphRuntime {
            device,
            graphs: HandleTable::new("graph"),
            plans: HandleTable::new("plan"),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn create_stream(&self) -> Result<Stream> {
        self.device.create_stream()
    }

    // ---- graph construction -------------------------------------------

    pub fn create_graph(&self) -> GraphHandle {
        GraphHandle(self.graphs.insert(Graph::new()))
    }

    pub fn destroy_graph(&self, handle: GraphHandle) -> Result<()> {
        self.graphs.remove(handle.0).map(|_| ())
    }

    pub fn is_graph_valid(&self, handle: GraphHandle) -> bool {
        self.graphs.contains(handle.0)
    }

    /// Structural deep copy of a graph under a new handle.
    pub fn clone_graph(&self, handle: GraphHandle) -> Result<GraphHandle> {
        let clone = self.graphs.with(handle.0, |g| g.clone_with_map().0)?;
        Ok(GraphHandle(self.graphs.insert(clone)))
    }

    /// Insert a node with the given dependencies.
    ///
    /// The dependency list must name distinct, existing nodes of the same
    /// graph; on any failure the graph is left unchanged.
    pub fn add_node(
        &self,
        graph: GraphHandle,
        op: NodeOp,
        deps: &[NodeHandle],
    ) -> Result<NodeHandle> {
        for dep in deps {
            if dep.graph != graph {
                return Err(RuntimeError::InvalidHandle { kind: "node" });
            }
        }
        let node = self.graphs.with_mut(graph.0, |g| -> Result<_> {
            for (index, dep) in deps.iter().enumerate() {
                if !g.contains(dep.node) {
                    return Err(RuntimeError::NodeNotFound(dep.node));
                }
                if deps[..index].iter().any(|d| d.node == dep.node) {
                    return Err(RuntimeError::InvalidState(format!(
                        "dependency {} listed twice",
                        dep.node
                    )));
                }
            }
            let id = g.add_node(op);
            for dep in deps {
                g.add_edge(dep.node, id)?;
            }
            Ok(id)
        })??;
        Ok(NodeHandle { graph, node })
    }

    pub fn add_empty_node(&self, graph: GraphHandle, deps: &[NodeHandle]) -> Result<NodeHandle> {
        self.add_node(graph, NodeOp::Empty, deps)
    }

    pub fn add_kernel_node(
        &self,
        graph: GraphHandle,
        deps: &[NodeHandle],
        params: KernelParams,
    ) -> Result<NodeHandle> {
        self.add_node(graph, NodeOp::Kernel(params), deps)
    }

    pub fn add_memcpy_node(
        &self,
        graph: GraphHandle,
        deps: &[NodeHandle],
        params: Memcpy3dParams,
    ) -> Result<NodeHandle> {
        self.add_node(graph, NodeOp::Memcpy(params), deps)
    }

    pub fn add_memcpy_1d_node(
        &self,
        graph: GraphHandle,
        deps: &[NodeHandle],
        params: Memcpy1dParams,
    ) -> Result<NodeHandle> {
        self.add_node(graph, NodeOp::Memcpy1d(params), deps)
    }

    pub fn add_memcpy_to_symbol_node(
        &self,
        graph: GraphHandle,
        deps: &[NodeHandle],
        params: SymbolCopyParams,
    ) -> Result<NodeHandle> {
        self.add_node(graph, NodeOp::MemcpyToSymbol(params), deps)
    }

    pub fn add_memcpy_from_symbol_node(
        &self,
        graph: GraphHandle,
        deps: &[NodeHandle],
        params: SymbolCopyParams,
    ) -> Result<NodeHandle> {
        self.add_node(graph, NodeOp::MemcpyFromSymbol(params), deps)
    }

    pub fn add_memset_node(
        &self,
        graph: GraphHandle,
        deps: &[NodeHandle],
        params: MemsetParams,
    ) -> Result<NodeHandle> {
        self.add_node(graph, NodeOp::Memset(params), deps)
    }

    pub fn add_host_node(
        &self,
        graph: GraphHandle,
        deps: &[NodeHandle],
        callback: HostFn,
    ) -> Result<NodeHandle> {
        self.add_node(
            graph,
            NodeOp::Host(lattice_graph::HostParams { callback }),
            deps,
        )
    }

    pub fn add_event_record_node(
        &self,
        graph: GraphHandle,
        deps: &[NodeHandle],
        event: Event,
    ) -> Result<NodeHandle> {
        self.add_node(
            graph,
            NodeOp::EventRecord(lattice_graph::EventNodeParams { event }),
            deps,
        )
    }

    pub fn add_event_wait_node(
        &self,
        graph: GraphHandle,
        deps: &[NodeHandle],
        event: Event,
    ) -> Result<NodeHandle> {
        self.add_node(
            graph,
            NodeOp::EventWait(lattice_graph::EventNodeParams { event }),
            deps,
        )
    }

    /// Insert a child graph node; the child is cloned at insertion time, so
    /// later edits to `child` do not reach the parent.
    pub fn add_child_graph_node(
        &self,
        graph: GraphHandle,
        deps: &[NodeHandle],
        child: GraphHandle,
    ) -> Result<NodeHandle> {
        let clone = self.graphs.with(child.0, |g| g.clone_with_map().0)?;
        self.add_node(graph, NodeOp::ChildGraph(clone), deps)
    }

    /// Remove a node, detaching all of its edges first.
    pub fn destroy_node(&self, handle: NodeHandle) -> Result<()> {
        self.graphs
            .with_mut(handle.graph.0, |g| g.remove_node(handle.node))?
    }

    pub fn add_dependency(&self, parent: NodeHandle, child: NodeHandle) -> Result<()> {
        if parent.graph != child.graph {
            return Err(RuntimeError::InvalidState(
                "nodes belong to different graphs".to_string(),
            ));
        }
        self.graphs
            .with_mut(parent.graph.0, |g| g.add_edge(parent.node, child.node))?
    }

    pub fn remove_dependency(&self, parent: NodeHandle, child: NodeHandle) -> Result<()> {
        if parent.graph != child.graph {
            return Err(RuntimeError::InvalidState(
                "nodes belong to different graphs".to_string(),
            ));
        }
        self.graphs
            .with_mut(parent.graph.0, |g| g.remove_edge(parent.node, child.node))?
    }

    // ---- graph queries ------------------------------------------------

    pub fn is_node_valid(&self, handle: NodeHandle) -> bool {
        self.graphs
            .with(handle.graph.0, |g| g.contains(handle.node))
            .unwrap_or(false)
    }

    pub fn graph_node_count(&self, handle: GraphHandle) -> Result<usize> {
        self.graphs.with(handle.0, Graph::node_count)
    }

    pub fn graph_edge_count(&self, handle: GraphHandle) -> Result<usize> {
        self.graphs.with(handle.0, Graph::edge_count)
    }

    /// Every node of the graph, in insertion order.
    pub fn graph_nodes(&self, handle: GraphHandle) -> Result<Vec<NodeHandle>> {
        self.graphs.with(handle.0, |g| {
            g.node_ids()
                .iter()
                .map(|&node| NodeHandle { graph: handle, node })
                .collect()
        })
    }

    /// Every edge as `(parent, child)`, parents in insertion order.
    pub fn graph_edges(&self, handle: GraphHandle) -> Result<Vec<(NodeHandle, NodeHandle)>> {
        self.graphs.with(handle.0, |g| {
            g.edges()
                .into_iter()
                .map(|(parent, child)| {
                    (
                        NodeHandle {
                            graph: handle,
                            node: parent,
                        },
                        NodeHandle {
                            graph: handle,
                            node: child,
                        },
                    )
                })
                .collect()
        })
    }

    pub fn graph_root_nodes(&self, handle: GraphHandle) -> Result<Vec<NodeHandle>> {
        self.graphs.with(handle.0, |g| {
            g.root_nodes()
                .into_iter()
                .map(|node| NodeHandle { graph: handle, node })
                .collect()
        })
    }

    pub fn graph_leaf_nodes(&self, handle: GraphHandle) -> Result<Vec<NodeHandle>> {
        self.graphs.with(handle.0, |g| {
            g.leaf_nodes()
                .into_iter()
                .map(|node| NodeHandle { graph: handle, node })
                .collect()
        })
    }

    pub fn graph_to_dot(&self, handle: GraphHandle) -> Result<String> {
        self.graphs.with(handle.0, Graph::to_dot)
    }

    pub fn node_kind(&self, handle: NodeHandle) -> Result<NodeKind> {
        self.graphs
            .with(handle.graph.0, |g| g.node(handle.node).map(|n| n.kind()))?
    }

    pub fn node_level(&self, handle: NodeHandle) -> Result<u32> {
        self.graphs
            .with(handle.graph.0, |g| g.node(handle.node).map(|n| n.level()))?
    }

    pub fn node_dependencies(&self, handle: NodeHandle) -> Result<Vec<NodeHandle>> {
        self.graphs.with(handle.graph.0, |g| {
            g.node(handle.node).map(|n| {
                n.dependencies()
                    .iter()
                    .map(|&node| NodeHandle {
                        graph: handle.graph,
                        node,
                    })
                    .collect()
            })
        })?
    }

    pub fn node_dependents(&self, handle: NodeHandle) -> Result<Vec<NodeHandle>> {
        self.graphs.with(handle.graph.0, |g| {
            g.node(handle.node).map(|n| {
                n.dependents()
                    .iter()
                    .map(|&node| NodeHandle {
                        graph: handle.graph,
                        node,
                    })
                    .collect()
            })
        })?
    }

    // ---- plans --------------------------------------------------------

    /// Freeze the graph into an executable plan.
    pub fn instantiate(&self, graph: GraphHandle) -> Result<PlanHandle> {
        let plan = self
            .graphs
            .with(graph.0, |g| ExecPlan::instantiate(g, &self.device))??;
        let handle = PlanHandle(self.plans.insert(Arc::new(Mutex::new(plan))));
        log_info!("runtime", "Plan registered");
        Ok(handle)
    }

    /// Replay the plan on `stream`; returns once submission is complete.
    pub fn launch(&self, plan: PlanHandle, stream: &Stream) -> Result<()> {
        let plan = self.plans.with(plan.0, Arc::clone)?;
        plan.lock().run(stream);
        Ok(())
    }

    /// Join the plan's most recent replay and surface the first failure.
    pub fn synchronize_plan(&self, plan: PlanHandle) -> Result<()> {
        let plan = self.plans.with(plan.0, Arc::clone)?;
        let plan = plan.lock();
        plan.synchronize()
    }

    /// Swap new parameters from `graph` into the plan without rebuilding it.
    pub fn update_plan(&self, plan: PlanHandle, graph: GraphHandle) -> Result<()> {
        let plan = self.plans.with(plan.0, Arc::clone)?;
        self.graphs.with(graph.0, |g| plan.lock().update(g))?
    }

    pub fn destroy_plan(&self, plan: PlanHandle) -> Result<()> {
        self.plans.remove(plan.0).map(|_| ())
    }

    pub fn is_plan_valid(&self, plan: PlanHandle) -> bool {
        self.plans.contains(plan.0)
    }

    /// Queues the plan owns beyond the launch queue it borrows.
    pub fn plan_queue_count(&self, plan: PlanHandle) -> Result<usize> {
        let plan = self.plans.with(plan.0, Arc::clone)?;
        let count = plan.lock().queue_count();
        Ok(count)
    }

    /// How many parameter updates the plan has taken.
    pub fn plan_update_count(&self, plan: PlanHandle) -> Result<u64> {
        let plan = self.plans.with(plan.0, Arc::clone)?;
        let count = plan.lock().update_count();
        Ok(count)
    }
}

impl Default for GraphRuntime {
    fn default() -> Self {
        GraphRuntime::new(Device::default())
    }
}
