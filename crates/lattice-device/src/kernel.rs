//! Kernel functions for the simulated device.

use std::fmt;
use std::sync::Arc;

use crate::command::LaunchDims;

/// The body of a simulated kernel.
///
/// Invoked once per dispatch with the launch geometry and the node's
/// argument buffer; closures capture [`crate::Buffer`] handles to touch
/// memory.
pub type KernelFn = Arc<dyn Fn(&LaunchDims, &[u8]) + Send + Sync>;

/// A named device function with a fixed argument-buffer size.
#[derive(Clone)]
pub struct Kernel {
    name: String,
    arg_bytes: usize,
    func: KernelFn,
}

impl Kernel {
    pub fn new(
        name: impl Into<String>,
        arg_bytes: usize,
        func: impl Fn(&LaunchDims, &[u8]) + Send + Sync + 'static,
    ) -> Kernel {
        Kernel {
            name: name.into(),
            arg_bytes,
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the argument buffer this function expects, in bytes.
    pub fn arg_bytes(&self) -> usize {
        self.arg_bytes
    }

    pub fn func(&self) -> KernelFn {
        Arc::clone(&self.func)
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.name)
            .field("arg_bytes", &self.arg_bytes)
            .finish()
    }
}
