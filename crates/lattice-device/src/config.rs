//! Configuration for the simulated device.

use serde::{Deserialize, Serialize};

/// Limits enforced by the device layer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Total device memory in bytes; 0 disables the limit.
    pub memory_limit: usize,
    /// Maximum threads per block accepted by kernel validation.
    pub max_threads_per_block: u32,
    /// Maximum shared memory per block in bytes.
    pub max_shared_mem_per_block: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            memory_limit: 1 << 30,
            max_threads_per_block: 1024,
            max_shared_mem_per_block: 64 << 10,
        }
    }
}
