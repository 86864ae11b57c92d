//! Commands: the unit of work submitted to a queue.
//!
//! A [`Command`] owns a payload, a completion [`Signal`], and an explicit
//! wait-list of other commands' signals. The worker thread of the owning
//! queue blocks on the wait-list before executing the payload, which is how
//! cross-queue ordering is enforced without any host-side blocking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lattice_core::error::{Result, RuntimeError};
use lattice_core::types::Dim3;
use parking_lot::{Condvar, Mutex};

use crate::event::Event;
use crate::kernel::KernelFn;
use crate::memory::{Buffer, CopyRegion3d};
use crate::queue::Queue;

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

/// Host callback installed by a host node.
pub type HostFn = Arc<dyn Fn() + Send + Sync>;

/// Launch geometry handed to a kernel body.
#[derive(Clone, Copy, Debug)]
pub struct LaunchDims {
    pub grid: Dim3,
    pub block: Dim3,
    pub shared_mem_bytes: u32,
}

/// What a command does when its queue executes it.
#[derive(Clone)]
pub enum Payload {
    /// Ordering-only marker; completes immediately.
    Marker,
    /// Simulated kernel dispatch.
    Kernel {
        func: KernelFn,
        dims: LaunchDims,
        args: Vec<u8>,
    },
    /// Linear copy between two buffers.
    CopyLinear {
        dst: Buffer,
        dst_offset: usize,
        src: Buffer,
        src_offset: usize,
        count: usize,
    },
    /// Pitched 3D copy.
    Copy3d(CopyRegion3d),
    /// Row-wise fill with a repeated element pattern.
    Memset {
        dst: Buffer,
        offset: usize,
        element: Vec<u8>,
        width: usize,
        height: usize,
        pitch: usize,
    },
    /// Record the event; the event observes this command's completion signal.
    EventRecord(Event),
    /// Order this queue after the event's current record.
    EventWait(Event),
    /// Run a host callback on the queue worker.
    HostCall(HostFn),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Payload::Marker => "Marker",
            Payload::Kernel { .. } => "Kernel",
            Payload::CopyLinear { .. } => "CopyLinear",
            Payload::Copy3d(_) => "Copy3d",
            Payload::Memset { .. } => "Memset",
            Payload::EventRecord(_) => "EventRecord",
            Payload::EventWait(_) => "EventWait",
            Payload::HostCall(_) => "HostCall",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct SignalState {
    /// True while a submitted command has not executed yet.
    outstanding: bool,
    /// Failure message of the most recent execution, if any.
    failure: Option<String>,
}

/// Completion signal of a command, shareable into other commands' wait-lists.
#[derive(Clone)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

struct SignalInner {
    state: Mutex<SignalState>,
    cond: Condvar,
}

impl Signal {
    fn new() -> Signal {
        Signal {
            inner: Arc::new(SignalInner {
                state: Mutex::new(SignalState {
                    outstanding: false,
                    failure: None,
                }),
                cond: Condvar::new(),
            }),
        }
    }

    fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.outstanding = true;
        state.failure = None;
    }

    fn complete(&self, result: Result<()>) {
        let mut state = self.inner.state.lock();
        state.outstanding = false;
        state.failure = result.err().map(|e| e.to_string());
        self.inner.cond.notify_all();
    }

    /// Block until the signal is not outstanding; true on success.
    pub fn wait(&self) -> bool {
        let mut state = self.inner.state.lock();
        while state.outstanding {
            self.inner.cond.wait(&mut state);
        }
        state.failure.is_none()
    }

    /// True if no execution is outstanding.
    pub fn is_complete(&self) -> bool {
        !self.inner.state.lock().outstanding
    }

    /// Failure message of the most recent execution, if it failed.
    pub fn failure(&self) -> Option<String> {
        self.inner.state.lock().failure.clone()
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Signal")
            .field("outstanding", &state.outstanding)
            .field("failure", &state.failure)
            .finish()
    }
}

/// A schedulable unit of device work.
#[derive(Clone)]
pub struct Command {
    inner: Arc<CommandInner>,
}

struct CommandInner {
    id: u64,
    payload: Mutex<Payload>,
    waits: Mutex<Vec<Signal>>,
    /// Waits consumed by the next execution only; re-filled per submission.
    transient_waits: Mutex<Vec<Signal>>,
    signal: Signal,
}

impl Command {
    pub fn new(payload: Payload) -> Command {
        Command {
            inner: Arc::new(CommandInner {
                id: NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed),
                payload: Mutex::new(payload),
                waits: Mutex::new(Vec::new()),
                transient_waits: Mutex::new(Vec::new()),
                signal: Signal::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn signal(&self) -> Signal {
        self.inner.signal.clone()
    }

    /// Append a predecessor completion to this command's wait-list.
    pub fn add_wait(&self, signal: Signal) {
        self.inner.waits.lock().push(signal);
    }

    /// Append a wait for the next execution only. Used for dependencies
    /// resolved at submission time, such as an event's current record.
    pub fn add_transient_wait(&self, signal: Signal) {
        self.inner.transient_waits.lock().push(signal);
    }

    /// Replace the payload in place; used by plan update.
    pub fn set_payload(&self, payload: Payload) {
        *self.inner.payload.lock() = payload;
    }

    /// Submit to a queue; marks the signal outstanding first so a
    /// host-side consumer submitted later on another queue cannot miss it.
    pub fn enqueue(&self, queue: &Queue) {
        self.inner.signal.reset();
        queue.submit(self.clone());
    }

    /// Host-side join on this command; true on success.
    pub fn await_completion(&self) -> bool {
        self.inner.signal.wait()
    }

    pub fn failure(&self) -> Option<String> {
        self.inner.signal.failure()
    }

    /// Run on the queue worker: block on the wait-list, execute the payload,
    /// then publish completion. A failed predecessor does not cancel this
    /// command; failures are per-command.
    pub(crate) fn execute(&self) {
        let mut waits: Vec<Signal> = self.inner.waits.lock().clone();
        waits.append(&mut self.inner.transient_waits.lock());
        for wait in &waits {
            wait.wait();
        }
        let result = run_payload(&self.inner.payload.lock());
        self.inner.signal.complete(result);
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.inner.id)
            .field("payload", &*self.inner.payload.lock())
            .finish()
    }
}

fn run_payload(payload: &Payload) -> Result<()> {
    match payload {
        Payload::Marker => Ok(()),
        Payload::Kernel { func, dims, args } => {
            func(dims, args);
            Ok(())
        }
        Payload::CopyLinear {
            dst,
            dst_offset,
            src,
            src_offset,
            count,
        } => Buffer::copy(dst, *dst_offset, src, *src_offset, *count),
        Payload::Copy3d(region) => region.execute(),
        Payload::Memset {
            dst,
            offset,
            element,
            width,
            height,
            pitch,
        } => {
            if element.is_empty() {
                return Err(RuntimeError::InvalidMemsetGeometry(
                    "empty fill element".to_string(),
                ));
            }
            dst.fill_rows(*offset, element, *width, *height, *pitch)
        }
        // Both event payloads are inert at execution time. A record is
        // observed through the command's own completion signal, and a wait's
        // target signal is wired into the wait-list at submission.
        Payload::EventRecord(_) => Ok(()),
        Payload::EventWait(_) => Ok(()),
        Payload::HostCall(func) => {
            func();
            Ok(())
        }
    }
}
