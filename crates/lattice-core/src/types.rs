//! Shared plain types for the graph runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-unique identifier of a graph node.
///
/// Ids are assigned monotonically at node construction and are never reused,
/// including across graphs and clones.
pub type NodeId = u64;

/// Three-dimensional launch geometry for kernel dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dim3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dim3 {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Dim3 { x, y, z }
    }

    /// Total number of elements covered by the geometry.
    pub fn volume(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    /// True if any component is zero.
    pub fn is_degenerate(&self) -> bool {
        self.x == 0 || self.y == 0 || self.z == 0
    }
}

impl Default for Dim3 {
    fn default() -> Self {
        Dim3::new(1, 1, 1)
    }
}

impl fmt::Display for Dim3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Which address space a buffer lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemorySpace {
    Host,
    Device,
}

impl fmt::Display for MemorySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemorySpace::Host => write!(f, "host"),
            MemorySpace::Device => write!(f, "device"),
        }
    }
}

/// Direction of a memory copy, validated against the operand address spaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemcpyKind {
    HostToHost,
    HostToDevice,
    DeviceToHost,
    DeviceToDevice,
}

impl MemcpyKind {
    /// The (source, destination) spaces this direction requires.
    pub fn spaces(&self) -> (MemorySpace, MemorySpace) {
        match self {
            MemcpyKind::HostToHost => (MemorySpace::Host, MemorySpace::Host),
            MemcpyKind::HostToDevice => (MemorySpace::Host, MemorySpace::Device),
            MemcpyKind::DeviceToHost => (MemorySpace::Device, MemorySpace::Host),
            MemcpyKind::DeviceToDevice => (MemorySpace::Device, MemorySpace::Device),
        }
    }
}

impl fmt::Display for MemcpyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemcpyKind::HostToHost => write!(f, "HOST_TO_HOST"),
            MemcpyKind::HostToDevice => write!(f, "HOST_TO_DEVICE"),
            MemcpyKind::DeviceToHost => write!(f, "DEVICE_TO_HOST"),
            MemcpyKind::DeviceToDevice => write!(f, "DEVICE_TO_DEVICE"),
        }
    }
}

/// Represents every operation kind a graph node can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    /// Kernel dispatch.
    Kernel,
    /// Generic 3D memory copy.
    Memcpy,
    /// Linear memory copy.
    Memcpy1d,
    /// Copy into a named device symbol.
    MemcpyToSymbol,
    /// Copy out of a named device symbol.
    MemcpyFromSymbol,
    /// Memory fill.
    Memset,
    /// Record an event at this point of the graph.
    EventRecord,
    /// Stall the owning chain until an event is recorded.
    EventWait,
    /// Host callback.
    Host,
    /// Nested sub-graph executed as one unit.
    ChildGraph,
    /// Ordering-only barrier with no device work.
    Empty,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Kernel => write!(f, "KERNEL"),
            NodeKind::Memcpy => write!(f, "MEMCPY"),
            NodeKind::Memcpy1d => write!(f, "MEMCPY_1D"),
            NodeKind::MemcpyToSymbol => write!(f, "MEMCPY_TO_SYMBOL"),
            NodeKind::MemcpyFromSymbol => write!(f, "MEMCPY_FROM_SYMBOL"),
            NodeKind::Memset => write!(f, "MEMSET"),
            NodeKind::EventRecord => write!(f, "EVENT_RECORD"),
            NodeKind::EventWait => write!(f, "EVENT_WAIT"),
            NodeKind::Host => write!(f, "HOST"),
            NodeKind::ChildGraph => write!(f, "CHILD_GRAPH"),
            NodeKind::Empty => write!(f, "EMPTY"),
        }
    }
}
