//! Timers composed on one simulator: a trickle timer feeding a watchdog.

use std::cell::Cell;
use std::rc::Rc;

use eventide_core::{SchedulerKind, Simulator, Time, TrickleTimer, Watchdog};

fn heartbeat(kind: SchedulerKind) -> (u32, Vec<Time>, Time) {
    let mut sim = Simulator::with_scheduler(kind);
    let expiries = Rc::new(Cell::new(Vec::new()));
    let beats = Rc::new(Cell::new(0u32));

    let seen = Rc::clone(&expiries);
    let watchdog = Rc::new(Watchdog::new(move |sim: &mut Simulator| {
        let mut times = seen.take();
        times.push(sim.now());
        seen.set(times);
    }));

    let trickle = Rc::new(TrickleTimer::new(Time::from_millis(10), 3, 0, 11));
    let pinged = Rc::clone(&watchdog);
    let counted = Rc::clone(&beats);
    trickle.set_function(move |sim| {
        counted.set(counted.get() + 1);
        pinged.ping(sim, Time::from_millis(200)).unwrap();
    });
    trickle.enable(&mut sim).unwrap();

    let stopper = Rc::clone(&trickle);
    sim.schedule(Time::from_secs(1), move |sim| stopper.stop(sim))
        .unwrap();

    sim.run().unwrap();
    let end = sim.now();
    sim.destroy().unwrap();
    (beats.get(), expiries.take(), end)
}

#[test]
fn test_watchdog_expires_once_heartbeat_stops() {
    let (beats, expiries, end) = heartbeat(SchedulerKind::Heap);

    // Intervals cap at 80ms, so two beats are never more than 160ms apart.
    assert!(beats >= 6, "only {beats} beats");
    assert_eq!(expiries.len(), 1);
    let expired = expiries[0];
    assert!(expired > Time::from_millis(1040), "expired at {expired}");
    assert!(expired <= Time::from_millis(1200), "expired at {expired}");
    // Cancelled trickle events still move the clock when popped.
    assert!(end >= expired);
}

#[test]
fn test_heartbeat_is_identical_on_every_backend() {
    let reference = heartbeat(SchedulerKind::Heap);
    for kind in SchedulerKind::ALL {
        assert_eq!(heartbeat(kind), reference, "backend {kind}");
    }
}
