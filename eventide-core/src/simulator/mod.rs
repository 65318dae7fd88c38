//! Simulator facade: virtual clock, event loop and teardown.
//!
//! The [`Simulator`] owns the scheduler, the current time and context, and
//! the destroy-event list. Callbacks receive `&mut Simulator`, so they can
//! schedule, cancel or stop without any shared global state. Only the
//! [`RemoteScheduler`] handle crosses threads.

mod backend;
mod destroy;
mod remote;
#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::{debug, trace};

pub use backend::SyncMode;
use destroy::DestroyList;
pub use remote::{RemoteCallback, RemoteScheduler};
use remote::Inbox;

use crate::config::KernelConfig;
use crate::event::{ContextId, DESTROY_SLOT, Event, EventId, EventInfo, SequenceGen};
use crate::scheduler::{Scheduler, SchedulerKind};
use crate::time::{Time, TimeError};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Work scheduled on the simulator.
pub type Callback = Box<dyn FnOnce(&mut Simulator)>;

/// Observer invoked just before every dispatched callback.
pub type PreEventHook = Box<dyn FnMut(&EventInfo)>;

/// Errors reported by the scheduling API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// A relative delay pointed into the past
    #[error("Invalid time: delay {delay} is negative")]
    InvalidTime {
        /// Rejected delay
        delay: Time,
    },

    /// The simulator was already destroyed
    #[error("Simulator destroyed")]
    SimulatorDestroyed,

    /// `run()` was called while the loop is active
    #[error("Simulator is already running")]
    AlreadyRunning,

    /// `destroy()` was called while the loop is active
    #[error("Simulator cannot be destroyed while running")]
    NotStopped,

    /// Time configuration was rejected
    #[error(transparent)]
    Time(#[from] TimeError),
}

/// Lifecycle of a simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimState {
    /// Created, never run
    NotRunning,
    /// Inside `run()`
    Running,
    /// `run()` returned at least once
    Stopped,
    /// Torn down; terminal
    Destroyed,
}

/// Sequential discrete-event simulator.
pub struct Simulator {
    instance: u64,
    scheduler: Scheduler<Callback>,
    sequences: SequenceGen,
    destroy_list: DestroyList,
    inbox: Arc<Inbox>,
    now: Time,
    context: ContextId,
    state: SimState,
    stop_requested: bool,
    sync: SyncMode,
    event_count: u64,
    pre_event_hook: Option<PreEventHook>,
}

impl Simulator {
    /// Creates a sequential simulator with a binary-heap scheduler.
    pub fn new() -> Self {
        Self::with_scheduler(SchedulerKind::default())
    }

    /// Creates a sequential simulator backed by `kind`.
    pub fn with_scheduler(kind: SchedulerKind) -> Self {
        Self::build(Scheduler::new(kind), SyncMode::Sequential)
    }

    /// Builds a simulator from `config`.
    ///
    /// Fixes the time resolution, selects the scheduler and sync mode, and
    /// schedules a stop when `run.stop_after_ns` is set. The stop delay is
    /// converted only after the resolution is fixed.
    ///
    /// # Errors
    ///
    /// - `SimError::Time` - A different resolution is already in use
    /// - `SimError::InvalidTime` - `run.stop_after_ns` is negative
    pub fn with_config(config: &KernelConfig) -> Result<Self, SimError> {
        Time::set_resolution(config.time.resolution)?;
        let mut sim = Self::build(Scheduler::from_config(&config.scheduler), config.run.sync);
        if let Some(nanos) = config.run.stop_after_ns {
            sim.stop_after(Time::from_nanos(nanos))?;
        }
        Ok(sim)
    }

    fn build(scheduler: Scheduler<Callback>, sync: SyncMode) -> Self {
        // Ticks are about to be queued; their length must not change.
        let resolution = Time::resolution();
        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        debug!(instance, %resolution, scheduler = %scheduler.kind(), "Simulator created");
        Self {
            instance,
            scheduler,
            sequences: SequenceGen::new(),
            destroy_list: DestroyList::default(),
            inbox: Arc::new(Inbox::default()),
            now: Time::ZERO,
            context: ContextId::NONE,
            state: SimState::NotRunning,
            stop_requested: false,
            sync,
            event_count: 0,
            pre_event_hook: None,
        }
    }

    fn ensure_alive(&self) -> Result<(), SimError> {
        if self.state == SimState::Destroyed {
            Err(SimError::SimulatorDestroyed)
        } else {
            Ok(())
        }
    }

    /// Schedules `callback` at `now() + delay` under the current context.
    ///
    /// # Errors
    ///
    /// - `SimError::InvalidTime` - `delay` is negative
    /// - `SimError::SimulatorDestroyed` - The simulator was destroyed
    pub fn schedule<F>(&mut self, delay: Time, callback: F) -> Result<EventId, SimError>
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        self.schedule_with_context(self.context, delay, callback)
    }

    /// Schedules `callback` at the current time, behind everything already
    /// queued for this instant.
    ///
    /// # Errors
    ///
    /// - `SimError::SimulatorDestroyed` - The simulator was destroyed
    pub fn schedule_now<F>(&mut self, callback: F) -> Result<EventId, SimError>
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        self.schedule(Time::ZERO, callback)
    }

    /// Schedules `callback` at `now() + delay` under an explicit context.
    ///
    /// # Errors
    ///
    /// - `SimError::InvalidTime` - `delay` is negative
    /// - `SimError::SimulatorDestroyed` - The simulator was destroyed
    pub fn schedule_with_context<F>(
        &mut self,
        context: ContextId,
        delay: Time,
        callback: F,
    ) -> Result<EventId, SimError>
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        self.ensure_alive()?;
        if delay.is_negative() {
            return Err(SimError::InvalidTime { delay });
        }
        Ok(self.insert(context, delay, Box::new(callback)))
    }

    fn insert(&mut self, context: ContextId, delay: Time, callback: Callback) -> EventId {
        let time = self.now + delay;
        let sequence = self.sequences.next_sequence();
        let id = self.scheduler.insert(Event::new(time, sequence, context, callback));
        trace!(%id, %time, %context, "Scheduled event");
        id
    }

    /// Registers a teardown callback run once by [`Simulator::destroy`], in
    /// registration order.
    ///
    /// # Errors
    ///
    /// - `SimError::SimulatorDestroyed` - The simulator was destroyed
    pub fn schedule_destroy<F>(&mut self, callback: F) -> Result<EventId, SimError>
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        self.ensure_alive()?;
        let sequence = self.sequences.next_sequence();
        self.destroy_list.push(sequence, Box::new(callback));
        let id = EventId::new(DESTROY_SLOT, sequence);
        trace!(%id, "Scheduled destroy event");
        Ok(id)
    }

    /// Cancels a pending event. Stale or already cancelled handles are
    /// ignored. Returns whether anything was cancelled.
    pub fn cancel(&mut self, id: EventId) -> bool {
        if id.is_detached() {
            false
        } else if id.is_destroy() {
            self.destroy_list.cancel(id.sequence())
        } else {
            self.scheduler.cancel(id)
        }
    }

    /// Removes a pending event and frees its storage at once. Stale handles
    /// are ignored. Returns whether anything was removed.
    pub fn remove(&mut self, id: EventId) -> bool {
        if id.is_detached() {
            false
        } else if id.is_destroy() {
            self.destroy_list.remove(id.sequence())
        } else {
            self.scheduler.remove(id).is_some()
        }
    }

    /// True if the event already ran, was cancelled or removed, or the
    /// handle never named an event.
    pub fn is_expired(&self, id: EventId) -> bool {
        if id.is_detached() {
            true
        } else if id.is_destroy() {
            !self.destroy_list.is_pending(id.sequence())
        } else {
            !self.scheduler.is_pending(id)
        }
    }

    /// Virtual time left until `id` fires; zero for expired handles.
    /// Destroy-events report the distance to
    /// [`Simulator::maximum_simulation_time`].
    pub fn delay_left(&self, id: EventId) -> Time {
        if self.is_expired(id) {
            return Time::ZERO;
        }
        if id.is_destroy() {
            return self.maximum_simulation_time() - self.now;
        }
        self.scheduler
            .get(id)
            .map_or(Time::ZERO, |event| event.time() - self.now)
    }

    /// Current virtual time.
    pub fn now(&self) -> Time {
        self.now
    }

    /// Context of the running callback, or [`ContextId::NONE`] outside
    /// dispatch.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Process-unique identity of this simulator.
    ///
    /// Event handles are only meaningful to the simulator that issued them;
    /// components that keep a handle across simulators compare this first.
    pub fn instance_id(&self) -> u64 {
        self.instance
    }

    /// Lifecycle state.
    pub fn state(&self) -> SimState {
        self.state
    }

    /// Latest time the simulator can represent.
    pub fn maximum_simulation_time(&self) -> Time {
        Time::MAX
    }

    /// Number of callbacks invoked so far.
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Number of queued events, cancelled ones included.
    pub fn pending_events(&self) -> usize {
        self.scheduler.len()
    }

    /// True when nothing is left to run or a stop was requested.
    pub fn is_finished(&self) -> bool {
        self.stop_pending() || (self.scheduler.is_empty() && self.inbox.is_empty())
    }

    fn stop_pending(&self) -> bool {
        self.stop_requested || self.inbox.stop_requested()
    }

    /// Asks `run()` to return once the current callback finishes. Pending
    /// events stay queued.
    pub fn stop(&mut self) {
        debug!(now = %self.now, "Stop requested");
        self.stop_requested = true;
    }

    /// Schedules a stop `delay` from now.
    ///
    /// # Errors
    ///
    /// - `SimError::InvalidTime` - `delay` is negative
    /// - `SimError::SimulatorDestroyed` - The simulator was destroyed
    pub fn stop_after(&mut self, delay: Time) -> Result<EventId, SimError> {
        self.schedule_with_context(ContextId::NONE, delay, |sim| sim.stop())
    }

    /// Scheduler backend in use.
    pub fn scheduler_kind(&self) -> SchedulerKind {
        self.scheduler.kind()
    }

    /// Swaps the scheduler backend, carrying every pending event over.
    pub fn set_scheduler(&mut self, kind: SchedulerKind) {
        debug!(from = %self.scheduler.kind(), to = %kind, "Switching scheduler");
        self.scheduler.set_kind(kind);
    }

    /// Partition id of this simulator.
    pub fn system_id(&self) -> u32 {
        self.sync.system_id()
    }

    /// Synchronization backend.
    pub fn sync_mode(&self) -> SyncMode {
        self.sync
    }

    /// Lookahead window; [`Time::MAX`] for the sequential backend.
    pub fn lookahead(&self) -> Time {
        self.sync.lookahead()
    }

    /// Narrows the lookahead window. No-op for the sequential backend.
    pub fn bound_lookahead(&mut self, bound: Time) {
        self.sync.bound_lookahead(bound);
    }

    /// Installs an observer called with each event just before it runs.
    pub fn set_pre_event_hook<F>(&mut self, hook: F)
    where
        F: FnMut(&EventInfo) + 'static,
    {
        self.pre_event_hook = Some(Box::new(hook));
    }

    /// Removes the pre-event observer.
    pub fn clear_pre_event_hook(&mut self) {
        self.pre_event_hook = None;
    }

    /// Handle for scheduling from other threads.
    pub fn remote(&self) -> RemoteScheduler {
        RemoteScheduler::new(Arc::clone(&self.inbox))
    }

    fn drain_inbox(&mut self) {
        for remote in self.inbox.take_all() {
            let callback: Callback = remote.callback;
            self.insert(remote.context, remote.delay, callback);
        }
    }

    /// Dispatches events in `(time, sequence)` order until the queue is
    /// empty or a stop is requested.
    ///
    /// # Errors
    ///
    /// - `SimError::AlreadyRunning` - Called from inside a callback
    /// - `SimError::SimulatorDestroyed` - The simulator was destroyed
    ///
    /// # Panics
    ///
    /// Panics if the scheduler yields an event earlier than `now()`.
    pub fn run(&mut self) -> Result<(), SimError> {
        match self.state {
            SimState::Running => return Err(SimError::AlreadyRunning),
            SimState::Destroyed => return Err(SimError::SimulatorDestroyed),
            SimState::NotRunning | SimState::Stopped => {}
        }
        self.state = SimState::Running;
        debug!(now = %self.now, pending = self.scheduler.len(), "Run started");

        loop {
            self.drain_inbox();
            if self.stop_pending() {
                break;
            }
            let Some((id, event)) = self.scheduler.remove_next() else {
                break;
            };
            self.dispatch(id, event);
        }

        self.stop_requested = false;
        self.inbox.clear_stop();
        self.state = SimState::Stopped;
        debug!(
            now = %self.now,
            events = self.event_count,
            pending = self.scheduler.len(),
            "Run finished"
        );
        Ok(())
    }

    fn dispatch(&mut self, id: EventId, event: Event<Callback>) {
        let time = event.time();
        assert!(
            time >= self.now,
            "event {id} at {time} is earlier than current time {}",
            self.now
        );
        self.now = time;
        if event.is_cancelled() {
            trace!(%id, %time, "Skipping cancelled event");
            return;
        }

        let context = event.context();
        if let Some(hook) = self.pre_event_hook.as_mut() {
            hook(&EventInfo { id, time, context });
        }
        trace!(%id, %time, %context, "Dispatching event");

        let saved = std::mem::replace(&mut self.context, context);
        self.event_count += 1;
        (event.into_callback())(self);
        self.context = saved;
    }

    /// Runs the destroy-events in registration order, then drops everything
    /// still queued. Further scheduling fails with
    /// `SimError::SimulatorDestroyed`.
    ///
    /// # Errors
    ///
    /// - `SimError::NotStopped` - Called from inside a callback
    /// - `SimError::SimulatorDestroyed` - Already destroyed
    pub fn destroy(&mut self) -> Result<(), SimError> {
        match self.state {
            SimState::Running => return Err(SimError::NotStopped),
            SimState::Destroyed => return Err(SimError::SimulatorDestroyed),
            SimState::NotRunning | SimState::Stopped => {}
        }
        debug!(
            now = %self.now,
            destroy_events = self.destroy_list.len(),
            "Destroying simulator"
        );

        self.context = ContextId::NONE;
        while let Some((sequence, callback)) = self.destroy_list.pop_live() {
            trace!(sequence, "Running destroy event");
            callback(self);
        }

        self.state = SimState::Destroyed;
        self.inbox.close();
        self.destroy_list.clear();
        self.scheduler.clear();
        Ok(())
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        if self.state != SimState::Destroyed {
            let _ = self.destroy();
        }
    }
}

impl fmt::Debug for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("instance", &self.instance)
            .field("now", &self.now)
            .field("context", &self.context)
            .field("state", &self.state)
            .field("scheduler", &self.scheduler)
            .field("sync", &self.sync)
            .field("event_count", &self.event_count)
            .finish_non_exhaustive()
    }
}
