//! Lattice Device - asynchronous execution layer for the graph runtime.
//!
//! This crate provides the collaborator abstractions the graph core schedules
//! onto: [`Command`]s with explicit wait-lists, in-order [`Queue`]s backed by
//! worker threads, [`Stream`]s, [`Event`]s, and byte [`Buffer`]s in host or
//! device space. Execution is an in-process simulation with the same ordering
//! contract as a real device: a command runs asynchronously, in submission
//! order on its queue, after every signal in its wait-list has completed.

pub mod command;
pub mod config;
pub mod device;
pub mod event;
pub mod kernel;
pub mod memory;
pub mod queue;

pub use command::{Command, HostFn, LaunchDims, Payload, Signal};
pub use config::DeviceConfig;
pub use device::Device;
pub use event::Event;
pub use kernel::{Kernel, KernelFn};
pub use memory::{Buffer, CopyRegion3d};
pub use queue::{Queue, Stream};
