//! Host-visible events recorded and waited on from inside a graph.
//!
//! An event is a handle to the completion signal of its most recent record
//! command. Recording binds that signal at submission time; waiting is wired
//! as a wait-list entry on whichever signal was bound when the wait command
//! was submitted. A wait submitted before any record therefore degenerates
//! to a no-op instead of stalling its queue.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::command::Signal;

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// A completion point shared between the host and queued commands.
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

struct EventInner {
    id: u64,
    record: Mutex<Option<Signal>>,
}

impl Event {
    pub fn new() -> Event {
        Event {
            inner: Arc::new(EventInner {
                id: NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed),
                record: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Bookkeeping performed when a record command is (re-)submitted: the
    /// event now tracks that command's completion.
    pub fn bind_record(&self, signal: Signal) {
        *self.inner.record.lock() = Some(signal);
    }

    /// Completion signal of the most recent record submission, if any.
    pub fn record_signal(&self) -> Option<Signal> {
        self.inner.record.lock().clone()
    }

    /// Host-side join on the event. An event that was never recorded
    /// returns immediately.
    pub fn synchronize(&self) {
        if let Some(signal) = self.record_signal() {
            signal.wait();
        }
    }

    /// True if no record is outstanding.
    pub fn query(&self) -> bool {
        self.record_signal()
            .map(|signal| signal.is_complete())
            .unwrap_or(true)
    }

    /// True if a record command has executed since creation.
    pub fn is_recorded(&self) -> bool {
        self.record_signal()
            .map(|signal| signal.is_complete())
            .unwrap_or(false)
    }
}

impl Default for Event {
    fn default() -> Self {
        Event::new()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event").field("id", &self.inner.id).finish()
    }
}
