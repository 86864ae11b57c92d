//! In-order queues and streams.
//!
//! Each queue owns one worker thread that executes submitted commands in
//! submission order. The worker exits when the last queue handle is dropped
//! and the submission channel disconnects.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Sender};
use lattice_core::error::{Result, RuntimeError};
use lattice_core::log_trace;

use crate::command::{Command, Payload};

/// Handle to an in-order execution queue.
#[derive(Clone, Debug)]
pub struct Queue {
    inner: Arc<QueueInner>,
}

#[derive(Debug)]
struct QueueInner {
    id: usize,
    tx: Sender<Command>,
}

impl Queue {
    pub(crate) fn spawn(id: usize) -> Result<Queue> {
        let (tx, rx) = unbounded::<Command>();
        thread::Builder::new()
            .name(format!("lattice-queue-{id}"))
            .spawn(move || {
                for command in rx.iter() {
                    command.execute();
                }
            })
            .map_err(|e| RuntimeError::Device(format!("failed to spawn queue worker: {e}")))?;
        log_trace!("device::queue", id = id, "Queue worker started");
        Ok(Queue {
            inner: Arc::new(QueueInner { id, tx }),
        })
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// Hand a command to the worker thread. Submission never blocks.
    pub fn submit(&self, command: Command) {
        // The worker only exits after every sender is dropped, so a send
        // on a live handle cannot fail.
        let _ = self.inner.tx.send(command);
    }

    /// Drain the queue: submit a marker and block until it executes.
    /// Returns false if any awaited marker reported failure (markers never
    /// fail, so false is unreachable in practice).
    pub fn finish(&self) -> bool {
        let marker = Command::new(Payload::Marker);
        marker.enqueue(self);
        marker.await_completion()
    }
}

/// Caller-facing stream; wraps the queue replays are launched on.
#[derive(Clone, Debug)]
pub struct Stream {
    queue: Queue,
}

impl Stream {
    pub(crate) fn new(queue: Queue) -> Stream {
        Stream { queue }
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Host-side join on everything submitted to this stream so far.
    pub fn synchronize(&self) -> bool {
        self.queue.finish()
    }
}
