//! Error handling for the Lattice graph runtime.
//!
//! All fallible operations across the workspace return [`RuntimeError`].
//! The variants follow the runtime's error taxonomy: structural errors
//! (handles, topology, update mismatches), parameter validation errors
//! (launch geometry, copy direction, bounds), resource exhaustion, and
//! failures reported by the device layer.

use crate::types::{MemcpyKind, NodeId, NodeKind};
use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can happen while building, instantiating, or replaying a graph.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// A handle does not refer to a live object in the registry.
    #[error("invalid {kind} handle: object was destroyed or never existed")]
    InvalidHandle {
        /// Which registry the lookup failed in ("graph", "node", "plan").
        kind: &'static str,
    },

    /// A node id is not present in the graph it was looked up in.
    #[error("node {0} not found in graph")]
    NodeNotFound(NodeId),

    /// An edge removal referenced a dependency that does not exist.
    #[error("edge {parent} -> {child} not found")]
    EdgeNotFound { parent: NodeId, child: NodeId },

    /// An edge insertion referenced a dependency that already exists.
    #[error("edge {parent} -> {child} already exists")]
    DuplicateEdge { parent: NodeId, child: NodeId },

    /// Adding the edge would make the graph cyclic.
    #[error("adding edge {parent} -> {child} would create a cycle")]
    CycleDetected { parent: NodeId, child: NodeId },

    /// An executable plan update was attempted with a structurally different graph.
    #[error("topology mismatch: {0}")]
    TopologyMismatch(String),

    /// Parameters of one node kind were applied to a node of another kind.
    #[error("node kind mismatch: expected {expected}, found {found}")]
    KindMismatch { expected: NodeKind, found: NodeKind },

    /// Kernel launch geometry failed validation.
    #[error("invalid launch geometry: {0}")]
    InvalidLaunchGeometry(String),

    /// A copy direction does not match the operand address spaces.
    #[error("invalid memcpy direction {kind} for {detail}")]
    InvalidMemcpyDirection { kind: MemcpyKind, detail: String },

    /// A buffer access would read or write past the end of the allocation.
    #[error("access of {len} bytes at offset {offset} exceeds buffer of {size} bytes")]
    OutOfBounds { offset: usize, len: usize, size: usize },

    /// Memset geometry (element size, width, height, pitch) failed validation.
    #[error("invalid memset geometry: {0}")]
    InvalidMemsetGeometry(String),

    /// A symbol name was not found in the device symbol table.
    #[error("symbol `{0}` not found")]
    SymbolNotFound(String),

    /// Device memory was exhausted.
    #[error("out of device memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },

    /// The device layer reported a failure while executing a command.
    #[error("device error: {0}")]
    Device(String),

    /// An operation was attempted in a state that does not allow it.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RuntimeError::NodeNotFound(42);
        assert_eq!(err.to_string(), "node 42 not found in graph");

        let err = RuntimeError::KindMismatch {
            expected: NodeKind::Kernel,
            found: NodeKind::Memset,
        };
        assert!(err.to_string().contains("KERNEL"));
        assert!(err.to_string().contains("MEMSET"));
    }

    #[test]
    fn test_out_of_bounds_display() {
        let err = RuntimeError::OutOfBounds {
            offset: 8,
            len: 16,
            size: 20,
        };
        assert_eq!(
            err.to_string(),
            "access of 16 bytes at offset 8 exceeds buffer of 20 bytes"
        );
    }
}
