//! Deadline that can be pushed back cheaply.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::warn;

use super::TimerFn;
use crate::event::EventId;
use crate::simulator::{SimError, Simulator};
use crate::time::Time;

struct WatchdogState {
    event: EventId,
    end: Time,
    cancelled: bool,
    function: Option<TimerFn>,
}

/// Fires a callback once no [`Watchdog::ping`] has extended its deadline.
///
/// Pushing the deadline later does not touch the queue: only the recorded
/// end time moves, and the pending expiry re-arms itself for the remainder
/// when it finds the end has moved. Pulling the deadline earlier cancels
/// and reschedules. Dropping the watchdog disarms it.
pub struct Watchdog {
    state: Rc<RefCell<WatchdogState>>,
}

impl Watchdog {
    /// Creates a disarmed watchdog that will run `function` on expiry.
    pub fn new<F>(function: F) -> Self
    where
        F: FnMut(&mut Simulator) + 'static,
    {
        Self {
            state: Rc::new(RefCell::new(WatchdogState {
                event: EventId::default(),
                end: Time::ZERO,
                cancelled: true,
                function: Some(Box::new(function)),
            })),
        }
    }

    /// Replaces the expiry callback.
    pub fn set_function<F>(&self, function: F)
    where
        F: FnMut(&mut Simulator) + 'static,
    {
        self.state.borrow_mut().function = Some(Box::new(function));
    }

    /// Arms the watchdog to expire `delay` from now, or moves an armed
    /// deadline.
    ///
    /// # Errors
    ///
    /// - `SimError::InvalidTime` - `delay` is negative
    /// - `SimError::SimulatorDestroyed` - The simulator was destroyed
    pub fn ping(&self, sim: &mut Simulator, delay: Time) -> Result<(), SimError> {
        if delay.is_negative() {
            return Err(SimError::InvalidTime { delay });
        }
        let end = sim.now() + delay;
        let mut state = self.state.borrow_mut();
        state.cancelled = false;

        if sim.is_expired(state.event) {
            state.event = schedule_expiry(sim, Rc::downgrade(&self.state), delay)?;
            state.end = end;
            return Ok(());
        }

        let left = sim.delay_left(state.event);
        if delay > left {
            state.end = state.end.max(end);
        } else if delay < left {
            sim.cancel(state.event);
            state.end = end;
            state.event = schedule_expiry(sim, Rc::downgrade(&self.state), delay)?;
        }
        Ok(())
    }

    /// Disarms the watchdog. The callback will not run until the next
    /// [`Watchdog::ping`].
    pub fn cancel(&self) {
        self.state.borrow_mut().cancelled = true;
    }

    /// True while armed and not cancelled.
    pub fn is_pending(&self, sim: &Simulator) -> bool {
        let state = self.state.borrow();
        !state.cancelled && !sim.is_expired(state.event)
    }

    /// Deadline recorded by the latest ping.
    pub fn deadline(&self) -> Time {
        self.state.borrow().end
    }
}

fn schedule_expiry(
    sim: &mut Simulator,
    state: Weak<RefCell<WatchdogState>>,
    delay: Time,
) -> Result<EventId, SimError> {
    sim.schedule(delay, move |sim| expire(sim, state))
}

fn expire(sim: &mut Simulator, weak: Weak<RefCell<WatchdogState>>) {
    let Some(state) = weak.upgrade() else {
        return;
    };
    let mut guard = state.borrow_mut();
    if guard.cancelled {
        return;
    }
    if guard.end > sim.now() {
        let remaining = guard.end - sim.now();
        match schedule_expiry(sim, weak, remaining) {
            Ok(event) => guard.event = event,
            Err(err) => warn!(%err, "Watchdog could not re-arm"),
        }
        return;
    }

    let function = guard.function.take();
    drop(guard);
    if let Some(mut function) = function {
        function(sim);
        let mut guard = state.borrow_mut();
        if guard.function.is_none() {
            guard.function = Some(function);
        }
    }
}
