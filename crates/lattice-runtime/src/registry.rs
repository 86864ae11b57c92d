//! Generation-counted handle tables.
//!
//! Handles are plain `Copy` values a caller can hold across destroys; a
//! lookup through a stale handle fails with [`RuntimeError::InvalidHandle`]
//! instead of reaching a recycled slot, because every slot carries a
//! generation that is bumped on removal.

use lattice_core::error::{Result, RuntimeError};
use lattice_core::types::NodeId;
use parking_lot::{Mutex, RwLock};

/// Index plus generation; valid only while the slot's generation matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

/// Handle to a graph under construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GraphHandle(pub(crate) Handle);

/// Handle to an instantiated plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlanHandle(pub(crate) Handle);

/// Handle to a node: the owning graph plus the node's process-unique id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pub(crate) graph: GraphHandle,
    pub(crate) node: NodeId,
}

impl NodeHandle {
    /// The graph this node belongs to.
    pub fn graph(&self) -> GraphHandle {
        self.graph
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A table of live objects addressed by generation-counted handles.
pub(crate) struct HandleTable<T> {
    kind: &'static str,
    slots: RwLock<Vec<Slot<T>>>,
    free: Mutex<Vec<u32>>,
}

impl<T> HandleTable<T> {
    pub(crate) fn new(kind: &'static str) -> HandleTable<T> {
        HandleTable {
            kind,
            slots: RwLock::new(Vec::new()),
            free: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn insert(&self, value: T) -> Handle {
        let mut slots = self.slots.write();
        if let Some(index) = self.free.lock().pop() {
            let slot = &mut slots[index as usize];
            slot.value = Some(value);
            return Handle {
                index,
                generation: slot.generation,
            };
        }
        let index = slots.len() as u32;
        slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Handle {
            index,
            generation: 0,
        }
    }

    pub(crate) fn contains(&self, handle: Handle) -> bool {
        let slots = self.slots.read();
        slots
            .get(handle.index as usize)
            .map(|slot| slot.generation == handle.generation && slot.value.is_some())
            .unwrap_or(false)
    }

    /// Run `f` with a shared borrow of the object behind `handle`.
    pub(crate) fn with<R>(&self, handle: Handle, f: impl FnOnce(&T) -> R) -> Result<R> {
        let slots = self.slots.read();
        match slots.get(handle.index as usize) {
            Some(slot) if slot.generation == handle.generation => match &slot.value {
                Some(value) => Ok(f(value)),
                None => Err(self.invalid()),
            },
            _ => Err(self.invalid()),
        }
    }

    /// Run `f` with an exclusive borrow of the object behind `handle`.
    pub(crate) fn with_mut<R>(&self, handle: Handle, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut slots = self.slots.write();
        match slots.get_mut(handle.index as usize) {
            Some(slot) if slot.generation == handle.generation => match &mut slot.value {
                Some(value) => Ok(f(value)),
                None => Err(self.invalid()),
            },
            _ => Err(self.invalid()),
        }
    }

    /// Remove the object, bumping the slot generation so the handle (and any
    /// copy of it) goes stale.
    pub(crate) fn remove(&self, handle: Handle) -> Result<T> {
        let mut slots = self.slots.write();
        match slots.get_mut(handle.index as usize) {
            Some(slot) if slot.generation == handle.generation && slot.value.is_some() => {
                slot.generation = slot.generation.wrapping_add(1);
                let value = slot.value.take();
                self.free.lock().push(handle.index);
                value.ok_or_else(|| self.invalid())
            }
            _ => Err(self.invalid()),
        }
    }

    fn invalid(&self) -> RuntimeError {
        RuntimeError::InvalidHandle { kind: self.kind }
    }
}
