//! Lattice Runtime - executable plans and the graph runtime facade.
//!
//! [`GraphRuntime`] is the top-level entry point: it owns the device and two
//! generation-counted registries, one for graphs under construction and one
//! for instantiated [`ExecPlan`]s. Capture a workload once as a graph,
//! instantiate it, then replay the plan as many times as needed; parameters
//! can be swapped between replays with [`GraphRuntime::update_plan`] without
//! rebuilding the schedule.

mod bind;
pub mod plan;
pub mod registry;
pub mod runtime;

pub use plan::ExecPlan;
pub use registry::{GraphHandle, NodeHandle, PlanHandle};
pub use runtime::GraphRuntime;
