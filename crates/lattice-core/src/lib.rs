//! Lattice Core - Fundamental types for the Lattice graph runtime.
//!
//! This crate provides the basic vocabulary shared by every other Lattice
//! component: node identifiers, launch geometry, memory transfer kinds, the
//! central error type, and the logging macros.

pub mod error;
pub mod logging;
pub mod types;

pub use error::{Result, RuntimeError};
pub use types::{Dim3, MemcpyKind, MemorySpace, NodeId, NodeKind};
