//! Cross-thread scheduling handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{SimError, Simulator};
use crate::event::ContextId;
use crate::time::Time;

/// Callback accepted from other threads.
pub type RemoteCallback = Box<dyn FnOnce(&mut Simulator) + Send + 'static>;

pub(crate) struct RemoteEvent {
    pub(crate) context: ContextId,
    pub(crate) delay: Time,
    pub(crate) callback: RemoteCallback,
}

/// Mailbox shared between a simulator and its remote handles.
#[derive(Default)]
pub(crate) struct Inbox {
    queue: Mutex<Vec<RemoteEvent>>,
    closed: AtomicBool,
    stop: AtomicBool,
}

impl Inbox {
    pub(crate) fn take_all(&self) -> Vec<RemoteEvent> {
        std::mem::take(&mut *self.queue.lock())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn clear_stop(&self) {
        self.stop.store(false, Ordering::Release);
    }

    /// Rejects further pushes and drops anything still queued.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.queue.lock().clear();
    }
}

/// `Send + Sync` handle for scheduling into a simulator from other threads.
///
/// Events pushed here are picked up at the top of the next run-loop
/// iteration and inserted at `now() + delay` in push order. This is the
/// path a background reader uses to re-enter ordered virtual time.
#[derive(Clone)]
pub struct RemoteScheduler {
    inbox: Arc<Inbox>,
}

impl RemoteScheduler {
    pub(crate) fn new(inbox: Arc<Inbox>) -> Self {
        Self { inbox }
    }

    /// Queues `callback` to run `delay` after the simulator picks it up,
    /// under `context`.
    ///
    /// # Errors
    ///
    /// - `SimError::InvalidTime` - `delay` is negative
    /// - `SimError::SimulatorDestroyed` - The simulator was destroyed
    pub fn schedule_with_context<F>(
        &self,
        context: ContextId,
        delay: Time,
        callback: F,
    ) -> Result<(), SimError>
    where
        F: FnOnce(&mut Simulator) + Send + 'static,
    {
        if delay.is_negative() {
            return Err(SimError::InvalidTime { delay });
        }
        let mut queue = self.inbox.queue.lock();
        // Checked under the lock so a concurrent close cannot strand an event.
        if self.inbox.closed.load(Ordering::Acquire) {
            return Err(SimError::SimulatorDestroyed);
        }
        queue.push(RemoteEvent {
            context,
            delay,
            callback: Box::new(callback),
        });
        Ok(())
    }

    /// Asks the run loop to return after the current callback.
    pub fn stop(&self) {
        self.inbox.stop.store(true, Ordering::Release);
    }

    /// True once the owning simulator was destroyed.
    pub fn is_closed(&self) -> bool {
        self.inbox.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for RemoteScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteScheduler")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
