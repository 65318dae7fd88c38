//! Trickle timer (RFC 6206).

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{trace, warn};

use super::TimerFn;
use crate::event::EventId;
use crate::simulator::{SimError, Simulator};
use crate::time::Time;

struct TrickleState {
    min_interval: Time,
    max_interval: Time,
    ticks: u64,
    redundancy: u16,
    current_interval: Time,
    counter: u16,
    interval_event: EventId,
    timer_event: EventId,
    rng: ChaCha8Rng,
    function: Option<TimerFn>,
}

type Shared = Rc<RefCell<TrickleState>>;

/// Rate-adaptive timer for gossip-style consistency protocols.
///
/// Each interval `I` starts at `min_interval` and doubles until it reaches
/// `min_interval * 2^doublings`. Within every interval the callback is
/// scheduled at a random point in `[I/2, I)` and suppressed when
/// [`TrickleTimer::consistent_event`] was reported at least `redundancy`
/// times in that interval. A redundancy of zero never suppresses.
///
/// Randomness comes from a seeded ChaCha stream, so runs are reproducible.
pub struct TrickleTimer {
    state: Shared,
}

impl TrickleTimer {
    /// Creates a stopped timer. `doublings` above 63 are clamped.
    pub fn new(min_interval: Time, doublings: u8, redundancy: u16, seed: u64) -> Self {
        let ticks = 1u64 << u32::from(doublings).min(63);
        let max_interval = min_interval * i64::try_from(ticks).unwrap_or(i64::MAX);
        Self {
            state: Rc::new(RefCell::new(TrickleState {
                min_interval,
                max_interval,
                ticks,
                redundancy,
                current_interval: Time::ZERO,
                counter: 0,
                interval_event: EventId::default(),
                timer_event: EventId::default(),
                rng: ChaCha8Rng::seed_from_u64(seed),
                function: None,
            })),
        }
    }

    /// Sets the callback run when the timer fires unsuppressed.
    pub fn set_function<F>(&self, function: F)
    where
        F: FnMut(&mut Simulator) + 'static,
    {
        self.state.borrow_mut().function = Some(Box::new(function));
    }

    /// Starts the first interval at a random size in
    /// `[min_interval, max_interval]`.
    ///
    /// # Errors
    ///
    /// - `SimError::SimulatorDestroyed` - The simulator was destroyed
    pub fn enable(&self, sim: &mut Simulator) -> Result<(), SimError> {
        {
            let mut state = self.state.borrow_mut();
            let ticks = state.ticks;
            let whole = state.rng.random_range(1..=ticks);
            let mut factor = whole as f64;
            if whole < ticks {
                factor += state.rng.random::<f64>();
            }
            state.current_interval = state.min_interval.mul_f64(factor);
        }
        begin_interval(sim, &self.state)
    }

    /// Records a consistent transmission heard in the current interval.
    pub fn consistent_event(&self) {
        let mut state = self.state.borrow_mut();
        state.counter = state.counter.saturating_add(1);
    }

    /// Records an inconsistency; shrinks the interval back to the minimum
    /// unless it is already there.
    ///
    /// # Errors
    ///
    /// - `SimError::SimulatorDestroyed` - The simulator was destroyed
    pub fn inconsistent_event(&self, sim: &mut Simulator) -> Result<(), SimError> {
        let above_min = {
            let state = self.state.borrow();
            state.current_interval > state.min_interval
        };
        if above_min {
            self.reset(sim)?;
        }
        Ok(())
    }

    /// Restarts at the minimum interval.
    ///
    /// # Errors
    ///
    /// - `SimError::SimulatorDestroyed` - The simulator was destroyed
    pub fn reset(&self, sim: &mut Simulator) -> Result<(), SimError> {
        {
            let mut state = self.state.borrow_mut();
            state.current_interval = state.min_interval;
            sim.cancel(state.interval_event);
            sim.cancel(state.timer_event);
        }
        begin_interval(sim, &self.state)
    }

    /// Cancels both pending expirations.
    pub fn stop(&self, sim: &mut Simulator) {
        let state = self.state.borrow();
        sim.cancel(state.interval_event);
        sim.cancel(state.timer_event);
    }

    /// True while an interval is running.
    pub fn is_running(&self, sim: &Simulator) -> bool {
        !sim.is_expired(self.state.borrow().interval_event)
    }

    /// Size of the running interval.
    pub fn current_interval(&self) -> Time {
        self.state.borrow().current_interval
    }

    /// Largest interval size.
    pub fn max_interval(&self) -> Time {
        self.state.borrow().max_interval
    }

    /// Consistent events counted in the running interval.
    pub fn counter(&self) -> u16 {
        self.state.borrow().counter
    }
}

/// Schedules the end of the current interval and the firing point inside
/// it, and clears the counter.
fn begin_interval(sim: &mut Simulator, shared: &Shared) -> Result<(), SimError> {
    let mut state = shared.borrow_mut();
    let interval = state.current_interval;
    let fire_at = interval.mul_f64(state.rng.random_range(0.5..1.0));
    state.counter = 0;

    let weak = Rc::downgrade(shared);
    state.interval_event = sim.schedule(interval, move |sim| interval_expired(sim, weak))?;
    let weak = Rc::downgrade(shared);
    state.timer_event = sim.schedule(fire_at, move |sim| timer_expired(sim, weak))?;
    trace!(%interval, %fire_at, "Trickle interval started");
    Ok(())
}

fn interval_expired(sim: &mut Simulator, weak: Weak<RefCell<TrickleState>>) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    {
        let mut state = shared.borrow_mut();
        state.current_interval = (state.current_interval * 2).min(state.max_interval);
    }
    if let Err(err) = begin_interval(sim, &shared) {
        warn!(%err, "Trickle timer could not start the next interval");
    }
}

fn timer_expired(sim: &mut Simulator, weak: Weak<RefCell<TrickleState>>) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    let function = {
        let mut state = shared.borrow_mut();
        if state.redundancy != 0 && state.counter >= state.redundancy {
            trace!(counter = state.counter, "Trickle transmission suppressed");
            return;
        }
        state.function.take()
    };
    if let Some(mut function) = function {
        function(sim);
        let mut state = shared.borrow_mut();
        if state.function.is_none() {
            state.function = Some(function);
        }
    }
}
