//! Byte buffers in host or device space.
//!
//! A [`Buffer`] is a shared handle to a fixed-size byte allocation. Copy and
//! fill primitives bounds-check every access and report
//! [`RuntimeError::OutOfBounds`] instead of panicking, so a malformed graph
//! parameter surfaces as a typed error rather than corrupting the simulation.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use lattice_core::error::{Result, RuntimeError};
use lattice_core::types::MemorySpace;
use parking_lot::Mutex;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle to a fixed-size byte allocation.
#[derive(Clone, Debug)]
pub struct Buffer {
    inner: Arc<BufferInner>,
}

#[derive(Debug)]
struct BufferInner {
    id: u64,
    space: MemorySpace,
    len: usize,
    data: Mutex<Vec<u8>>,
    /// Device allocations return their bytes to this counter when dropped.
    reclaim: Option<(Arc<AtomicUsize>, usize)>,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        if let Some((counter, len)) = &self.reclaim {
            counter.fetch_sub(*len, Ordering::Relaxed);
        }
    }
}

impl Buffer {
    fn new(space: MemorySpace, len: usize, reclaim: Option<(Arc<AtomicUsize>, usize)>) -> Buffer {
        Buffer {
            inner: Arc::new(BufferInner {
                id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
                space,
                len,
                data: Mutex::new(vec![0u8; len]),
                reclaim,
            }),
        }
    }

    /// Allocate a zero-initialized host-space buffer.
    pub fn host(len: usize) -> Buffer {
        Buffer::new(MemorySpace::Host, len, None)
    }

    pub(crate) fn device(len: usize, reclaim: (Arc<AtomicUsize>, usize)) -> Buffer {
        Buffer::new(MemorySpace::Device, len, Some(reclaim))
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn space(&self) -> MemorySpace {
        self.inner.space
    }

    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// True if both handles point at the same allocation.
    pub fn same_allocation(a: &Buffer, b: &Buffer) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Validate that `[offset, offset + len)` lies inside the allocation.
    pub fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        let end = offset.checked_add(len);
        match end {
            Some(end) if end <= self.inner.len => Ok(()),
            _ => Err(RuntimeError::OutOfBounds {
                offset,
                len,
                size: self.inner.len,
            }),
        }
    }

    /// Copy bytes from a host slice into the buffer.
    pub fn write(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.check_range(offset, bytes.len())?;
        let mut data = self.inner.data.lock();
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Read bytes out of the buffer into a fresh vector.
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.check_range(offset, len)?;
        let data = self.inner.data.lock();
        Ok(data[offset..offset + len].to_vec())
    }

    /// Copy `count` bytes between two buffers (or within one buffer).
    pub fn copy(
        dst: &Buffer,
        dst_offset: usize,
        src: &Buffer,
        src_offset: usize,
        count: usize,
    ) -> Result<()> {
        dst.check_range(dst_offset, count)?;
        src.check_range(src_offset, count)?;
        if Buffer::same_allocation(dst, src) {
            let mut data = dst.inner.data.lock();
            data.copy_within(src_offset..src_offset + count, dst_offset);
        } else {
            let src_data = src.inner.data.lock();
            let mut dst_data = dst.inner.data.lock();
            dst_data[dst_offset..dst_offset + count]
                .copy_from_slice(&src_data[src_offset..src_offset + count]);
        }
        Ok(())
    }

    /// Fill `height` rows of `width` bytes with a repeated element pattern,
    /// rows spaced `pitch` bytes apart.
    pub fn fill_rows(
        &self,
        offset: usize,
        element: &[u8],
        width: usize,
        height: usize,
        pitch: usize,
    ) -> Result<()> {
        if height == 0 || width == 0 {
            return Ok(());
        }
        let last_row = (height - 1)
            .checked_mul(pitch)
            .and_then(|rows| offset.checked_add(rows))
            .ok_or(RuntimeError::OutOfBounds {
                offset,
                len: width,
                size: self.inner.len,
            })?;
        self.check_range(last_row, width)?;
        let mut data = self.inner.data.lock();
        for row in 0..height {
            let base = offset + row * pitch;
            for chunk in data[base..base + width].chunks_mut(element.len()) {
                chunk.copy_from_slice(&element[..chunk.len()]);
            }
        }
        Ok(())
    }
}

/// A 3D copy described as `depth` slices of `height` rows of `width` bytes.
///
/// Pitches are in bytes; a slice pitch spans one full 2D slice of the operand.
#[derive(Clone, Debug)]
pub struct CopyRegion3d {
    pub src: Buffer,
    pub src_offset: usize,
    pub src_row_pitch: usize,
    pub src_slice_pitch: usize,
    pub dst: Buffer,
    pub dst_offset: usize,
    pub dst_row_pitch: usize,
    pub dst_slice_pitch: usize,
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl CopyRegion3d {
    /// Validate pitches and that the farthest byte of each operand is in bounds.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(RuntimeError::InvalidMemsetGeometry(format!(
                "degenerate copy extent {}x{}x{}",
                self.width, self.height, self.depth
            )));
        }
        for (pitch, slice_pitch, name) in [
            (self.src_row_pitch, self.src_slice_pitch, "source"),
            (self.dst_row_pitch, self.dst_slice_pitch, "destination"),
        ] {
            if pitch < self.width {
                return Err(RuntimeError::InvalidMemsetGeometry(format!(
                    "{name} row pitch {pitch} smaller than width {}",
                    self.width
                )));
            }
            if self.depth > 1 {
                let slab = pitch.checked_mul(self.height).ok_or_else(|| {
                    RuntimeError::InvalidMemsetGeometry(format!(
                        "{name} slab of {} rows of pitch {pitch} overflows",
                        self.height
                    ))
                })?;
                if slice_pitch < slab {
                    return Err(RuntimeError::InvalidMemsetGeometry(format!(
                        "{name} slice pitch {slice_pitch} smaller than {} rows of pitch {pitch}",
                        self.height
                    )));
                }
            }
        }
        let farthest = |offset: usize, slice_pitch: usize, row_pitch: usize| -> Option<usize> {
            let slices = (self.depth - 1).checked_mul(slice_pitch)?;
            let rows = (self.height - 1).checked_mul(row_pitch)?;
            offset.checked_add(slices)?.checked_add(rows)
        };
        let src_last = farthest(self.src_offset, self.src_slice_pitch, self.src_row_pitch)
            .ok_or(RuntimeError::OutOfBounds {
                offset: self.src_offset,
                len: self.width,
                size: self.src.len(),
            })?;
        self.src.check_range(src_last, self.width)?;
        let dst_last = farthest(self.dst_offset, self.dst_slice_pitch, self.dst_row_pitch)
            .ok_or(RuntimeError::OutOfBounds {
                offset: self.dst_offset,
                len: self.width,
                size: self.dst.len(),
            })?;
        self.dst.check_range(dst_last, self.width)?;
        Ok(())
    }

    /// Perform the copy row by row.
    pub(crate) fn execute(&self) -> Result<()> {
        for z in 0..self.depth {
            for y in 0..self.height {
                let src_base = self.src_offset + z * self.src_slice_pitch + y * self.src_row_pitch;
                let dst_base = self.dst_offset + z * self.dst_slice_pitch + y * self.dst_row_pitch;
                Buffer::copy(&self.dst, dst_base, &self.src, src_base, self.width)?;
            }
        }
        Ok(())
    }
}
