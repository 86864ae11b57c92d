//! The device: allocation, symbols, queue acquisition, launch validation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use lattice_core::error::{Result, RuntimeError};
use lattice_core::types::Dim3;
use lattice_core::{log_debug, log_trace};

use crate::config::DeviceConfig;
use crate::memory::Buffer;
use crate::queue::{Queue, Stream};

/// Shared handle to the simulated device.
#[derive(Clone, Debug)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

#[derive(Debug)]
struct DeviceInner {
    config: DeviceConfig,
    allocated: Arc<AtomicUsize>,
    symbols: DashMap<String, Buffer>,
    next_queue_id: AtomicUsize,
}

impl Device {
    pub fn new(config: DeviceConfig) -> Device {
        Device {
            inner: Arc::new(DeviceInner {
                config,
                allocated: Arc::new(AtomicUsize::new(0)),
                symbols: DashMap::new(),
                next_queue_id: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    /// Bytes currently held by live device allocations.
    pub fn allocated_bytes(&self) -> usize {
        self.inner.allocated.load(Ordering::Relaxed)
    }

    /// Allocate a device-space buffer, honoring the configured memory limit.
    pub fn alloc(&self, len: usize) -> Result<Buffer> {
        let limit = self.inner.config.memory_limit;
        if limit > 0 {
            let mut current = self.inner.allocated.load(Ordering::Relaxed);
            loop {
                let next = current.checked_add(len).unwrap_or(usize::MAX);
                if next > limit {
                    return Err(RuntimeError::OutOfMemory {
                        requested: len,
                        available: limit.saturating_sub(current),
                    });
                }
                match self.inner.allocated.compare_exchange_weak(
                    current,
                    next,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => break,
                    Err(observed) => current = observed,
                }
            }
        } else {
            self.inner.allocated.fetch_add(len, Ordering::Relaxed);
        }
        log_trace!("device", len = len, "Allocated device buffer");
        Ok(Buffer::device(len, (Arc::clone(&self.inner.allocated), len)))
    }

    /// Register a named device allocation usable by symbol-copy nodes.
    pub fn register_symbol(&self, name: &str, len: usize) -> Result<Buffer> {
        if self.inner.symbols.contains_key(name) {
            return Err(RuntimeError::Device(format!(
                "symbol `{name}` already registered"
            )));
        }
        let buffer = self.alloc(len)?;
        self.inner.symbols.insert(name.to_string(), buffer.clone());
        log_debug!("device", symbol = name, len = len, "Registered symbol");
        Ok(buffer)
    }

    /// Resolve a symbol name to its backing buffer.
    pub fn symbol(&self, name: &str) -> Result<Buffer> {
        self.inner
            .symbols
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RuntimeError::SymbolNotFound(name.to_string()))
    }

    /// Spin up a fresh in-order queue.
    pub fn acquire_queue(&self) -> Result<Queue> {
        let id = self.inner.next_queue_id.fetch_add(1, Ordering::Relaxed);
        Queue::spawn(id)
    }

    /// Create a stream backed by its own queue.
    pub fn create_stream(&self) -> Result<Stream> {
        Ok(Stream::new(self.acquire_queue()?))
    }

    /// Validate kernel launch geometry against device limits.
    pub fn validate_launch(&self, grid: Dim3, block: Dim3, shared_mem_bytes: u32) -> Result<()> {
        if grid.is_degenerate() {
            return Err(RuntimeError::InvalidLaunchGeometry(format!(
                "grid dimension {grid} contains zero"
            )));
        }
        if block.is_degenerate() {
            return Err(RuntimeError::InvalidLaunchGeometry(format!(
                "block dimension {block} contains zero"
            )));
        }
        let threads = block.volume();
        if threads > self.inner.config.max_threads_per_block as u64 {
            return Err(RuntimeError::InvalidLaunchGeometry(format!(
                "{threads} threads per block exceeds limit of {}",
                self.inner.config.max_threads_per_block
            )));
        }
        if shared_mem_bytes > self.inner.config.max_shared_mem_per_block {
            return Err(RuntimeError::InvalidLaunchGeometry(format!(
                "{shared_mem_bytes} bytes of shared memory exceeds limit of {}",
                self.inner.config.max_shared_mem_per_block
            )));
        }
        Ok(())
    }
}

impl Default for Device {
    fn default() -> Self {
        Device::new(DeviceConfig::default())
    }
}
