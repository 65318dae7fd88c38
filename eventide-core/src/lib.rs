//! Eventide - a discrete-event simulation kernel.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
//!
//! The kernel advances a virtual clock and invokes callbacks in a strict
//! `(time, insertion order)` sequence, independent of the scheduler backend
//! in use.
//!
//! # Example
//!
//! ```rust
//! use eventide_core::{Simulator, Time};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut sim = Simulator::new();
//! sim.schedule(Time::from_ticks(5), |sim| {
//!     println!("hello at {}", sim.now());
//! })?;
//! sim.run()?;
//! sim.destroy()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Time**: saturating tick counts with a process-wide resolution
//! - **Scheduler**: an event arena plus a pluggable ordering backend
//!   (binary heap, ordered map, calendar queue, sorted list)
//! - **Simulator**: the event loop, destroy-events and the cross-thread
//!   [`RemoteScheduler`] inbox
//! - **Timers**: [`Watchdog`] and [`TrickleTimer`] built on the public API

pub mod config;
pub mod event;
pub mod scheduler;
pub mod simulator;
pub mod time;
pub mod timer;
pub mod tracing_setup;

pub use config::{ConfigError, KernelConfig, ReaderConfig, RunConfig, SchedulerConfig, TimeConfig};
pub use event::{ContextId, Event, EventId, EventInfo};
pub use scheduler::{Scheduler, SchedulerKind};
pub use simulator::{
    Callback, PreEventHook, RemoteCallback, RemoteScheduler, SimError, SimState, Simulator,
    SyncMode,
};
pub use time::{Time, TimeError, Unit};
pub use timer::{TrickleTimer, Watchdog};
