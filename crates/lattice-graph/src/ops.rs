//! Parameter blocks for each node operation kind.
//!
//! Every parameter struct validates itself against a [`Device`] before it is
//! bound into an executable plan, so malformed parameters fail at
//! instantiation (or update) time instead of mid-replay.

use lattice_core::error::{Result, RuntimeError};
use lattice_core::types::{Dim3, MemcpyKind, MemorySpace};
use lattice_device::{Buffer, CopyRegion3d, Device, Event, HostFn, Kernel};

/// Kernel dispatch: function, launch geometry, and a packed argument buffer.
#[derive(Clone, Debug)]
pub struct KernelParams {
    pub kernel: Kernel,
    pub grid: Dim3,
    pub block: Dim3,
    pub shared_mem_bytes: u32,
    pub args: Vec<u8>,
}

impl KernelParams {
    pub fn validate(&self, device: &Device) -> Result<()> {
        device.validate_launch(self.grid, self.block, self.shared_mem_bytes)?;
        if self.args.len() != self.kernel.arg_bytes() {
            return Err(RuntimeError::InvalidLaunchGeometry(format!(
                "kernel `{}` expects {} argument bytes, got {}",
                self.kernel.name(),
                self.kernel.arg_bytes(),
                self.args.len()
            )));
        }
        Ok(())
    }
}

/// Linear copy of `count` bytes between two buffers.
#[derive(Clone, Debug)]
pub struct Memcpy1dParams {
    pub dst: Buffer,
    pub dst_offset: usize,
    pub src: Buffer,
    pub src_offset: usize,
    pub count: usize,
    pub kind: MemcpyKind,
}

impl Memcpy1dParams {
    pub fn validate(&self, _device: &Device) -> Result<()> {
        self.src.check_range(self.src_offset, self.count)?;
        self.dst.check_range(self.dst_offset, self.count)?;
        check_direction(self.kind, &self.src, &self.dst)
    }
}

/// Pitched 3D copy between two buffers.
#[derive(Clone, Debug)]
pub struct Memcpy3dParams {
    pub region: CopyRegion3d,
    pub kind: MemcpyKind,
}

impl Memcpy3dParams {
    pub fn validate(&self, _device: &Device) -> Result<()> {
        self.region.validate()?;
        check_direction(self.kind, &self.region.src, &self.region.dst)
    }
}

/// Copy between a named device symbol and an ordinary buffer.
///
/// Used by both symbol directions; `to_symbol` in [`Self::validate`] states
/// whether the symbol is the destination.
#[derive(Clone, Debug)]
pub struct SymbolCopyParams {
    pub symbol: String,
    pub symbol_offset: usize,
    pub other: Buffer,
    pub other_offset: usize,
    pub count: usize,
    pub kind: MemcpyKind,
}

impl SymbolCopyParams {
    pub fn validate(&self, device: &Device, to_symbol: bool) -> Result<()> {
        let symbol = device.symbol(&self.symbol)?;
        symbol.check_range(self.symbol_offset, self.count)?;
        self.other.check_range(self.other_offset, self.count)?;
        if to_symbol {
            check_direction(self.kind, &self.other, &symbol)
        } else {
            check_direction(self.kind, &symbol, &self.other)
        }
    }
}

/// Row-wise fill of a device buffer with a repeated 1/2/4-byte value.
///
/// `width` is in elements, `pitch` in bytes. A linear fill is expressed with
/// `height == 1` and an arbitrary pitch.
#[derive(Clone, Debug)]
pub struct MemsetParams {
    pub dst: Buffer,
    pub offset: usize,
    pub value: u32,
    pub element_size: usize,
    pub width: usize,
    pub height: usize,
    pub pitch: usize,
}

impl MemsetParams {
    /// The fill pattern: the low `element_size` bytes of `value`.
    pub fn element(&self) -> Vec<u8> {
        self.value.to_le_bytes()[..self.element_size].to_vec()
    }

    /// Row width in bytes.
    pub fn row_bytes(&self) -> usize {
        self.width * self.element_size
    }

    pub fn validate(&self, _device: &Device) -> Result<()> {
        if !matches!(self.element_size, 1 | 2 | 4) {
            return Err(RuntimeError::InvalidMemsetGeometry(format!(
                "element size {} is not 1, 2, or 4",
                self.element_size
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(RuntimeError::InvalidMemsetGeometry(format!(
                "degenerate fill extent {}x{}",
                self.width, self.height
            )));
        }
        let row_bytes = self.width.checked_mul(self.element_size).ok_or_else(|| {
            RuntimeError::InvalidMemsetGeometry(format!(
                "row of {} elements of {} bytes overflows",
                self.width, self.element_size
            ))
        })?;
        if self.height > 1 && self.pitch < row_bytes {
            return Err(RuntimeError::InvalidMemsetGeometry(format!(
                "pitch {} smaller than row of {row_bytes} bytes",
                self.pitch
            )));
        }
        if self.dst.space() != MemorySpace::Device {
            return Err(RuntimeError::InvalidMemsetGeometry(
                "fill destination must be in device space".to_string(),
            ));
        }
        let last_row = (self.height - 1)
            .checked_mul(self.pitch)
            .and_then(|rows| self.offset.checked_add(rows))
            .ok_or_else(|| {
                RuntimeError::InvalidMemsetGeometry(format!(
                    "fill extent overflows at offset {} with pitch {}",
                    self.offset, self.pitch
                ))
            })?;
        self.dst.check_range(last_row, row_bytes)
    }
}

/// Host callback run on a queue worker; the owning chain stalls until it returns.
#[derive(Clone)]
pub struct HostParams {
    pub callback: HostFn,
}

impl std::fmt::Debug for HostParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HostParams")
    }
}

/// Event carried by a record or wait node.
#[derive(Clone, Debug)]
pub struct EventNodeParams {
    pub event: Event,
}

fn check_direction(kind: MemcpyKind, src: &Buffer, dst: &Buffer) -> Result<()> {
    let (want_src, want_dst) = kind.spaces();
    if src.space() != want_src || dst.space() != want_dst {
        return Err(RuntimeError::InvalidMemcpyDirection {
            kind,
            detail: format!(
                "{} source and {} destination",
                src.space(),
                dst.space()
            ),
        });
    }
    Ok(())
}
