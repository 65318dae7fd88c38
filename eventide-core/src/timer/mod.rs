//! Reusable timers built on the simulator's scheduling API.
//!
//! Both timers keep their state behind `Rc<RefCell<..>>` and schedule
//! closures holding a weak reference, so dropping a timer disarms it.

mod trickle;
mod watchdog;

pub use trickle::TrickleTimer;
pub use watchdog::Watchdog;

use crate::simulator::Simulator;

/// Callback run each time a timer fires.
pub type TimerFn = Box<dyn FnMut(&mut Simulator)>;
