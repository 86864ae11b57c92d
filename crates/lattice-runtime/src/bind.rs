//! Lowering node operations into device command payloads.

use lattice_core::error::Result;
use lattice_device::{Device, LaunchDims, Payload};
use lattice_graph::NodeOp;

/// Build the device payload for one node, resolving symbols against the
/// device table. Child graph nodes carry no payload of their own; they are
/// represented by a nested body.
pub(crate) fn make_payload(op: &NodeOp, device: &Device) -> Result<Option<Payload>> {
    let payload = match op {
        NodeOp::Kernel(p) => Some(Payload::Kernel {
            func: p.kernel.func(),
            dims: LaunchDims {
                grid: p.grid,
                block: p.block,
                shared_mem_bytes: p.shared_mem_bytes,
            },
            args: p.args.clone(),
        }),
        NodeOp::Memcpy(p) => Some(Payload::Copy3d(p.region.clone())),
        NodeOp::Memcpy1d(p) => Some(Payload::CopyLinear {
            dst: p.dst.clone(),
            dst_offset: p.dst_offset,
            src: p.src.clone(),
            src_offset: p.src_offset,
            count: p.count,
        }),
        NodeOp::MemcpyToSymbol(p) => Some(Payload::CopyLinear {
            dst: device.symbol(&p.symbol)?,
            dst_offset: p.symbol_offset,
            src: p.other.clone(),
            src_offset: p.other_offset,
            count: p.count,
        }),
        NodeOp::MemcpyFromSymbol(p) => Some(Payload::CopyLinear {
            dst: p.other.clone(),
            dst_offset: p.other_offset,
            src: device.symbol(&p.symbol)?,
            src_offset: p.symbol_offset,
            count: p.count,
        }),
        NodeOp::Memset(p) => Some(Payload::Memset {
            dst: p.dst.clone(),
            offset: p.offset,
            element: p.element(),
            width: p.row_bytes(),
            height: p.height,
            pitch: p.pitch,
        }),
        NodeOp::EventRecord(p) => Some(Payload::EventRecord(p.event.clone())),
        NodeOp::EventWait(p) => Some(Payload::EventWait(p.event.clone())),
        NodeOp::Host(p) => Some(Payload::HostCall(p.callback.clone())),
        NodeOp::Empty => Some(Payload::Marker),
        NodeOp::ChildGraph(_) => None,
    };
    Ok(payload)
}
