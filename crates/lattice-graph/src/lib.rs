//! Lattice Graph - task graph construction and scheduling.
//!
//! A [`Graph`] is a mutable DAG of [`TaskNode`]s, each carrying a [`NodeOp`]
//! describing the work it performs. Graphs are built incrementally with
//! [`Graph::add_node`] and [`Graph::add_edge`], queried structurally, and
//! linearized by the scheduler in [`sched`] into parallel chains for the
//! runtime to bind onto queues.

pub mod graph;
pub mod node;
pub mod ops;
pub mod sched;

pub use graph::Graph;
pub use node::{NodeOp, TaskNode};
pub use ops::{
    EventNodeParams, HostParams, KernelParams, Memcpy1dParams, Memcpy3dParams, MemsetParams,
    SymbolCopyParams,
};
pub use sched::{build_run_list, queue_demand, RunList};
