//! Tests for the simulator facade.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::KernelConfig;
use crate::event::{ContextId, EventId, EventInfo};
use crate::scheduler::SchedulerKind;
use crate::simulator::{SimError, SimState, Simulator, SyncMode};
use crate::time::Time;

type Log = Rc<RefCell<Vec<&'static str>>>;

fn record(log: &Log, label: &'static str) -> impl FnOnce(&mut Simulator) + 'static {
    let log = Rc::clone(log);
    move |_| log.borrow_mut().push(label)
}

#[test]
fn test_ordering_example() {
    let mut sim = Simulator::new();
    let log = Log::default();

    sim.schedule(Time::from_ticks(5), record(&log, "A")).unwrap();
    sim.schedule(Time::from_ticks(3), record(&log, "B")).unwrap();
    sim.schedule(Time::from_ticks(3), record(&log, "C")).unwrap();
    sim.schedule(Time::from_ticks(7), record(&log, "D")).unwrap();
    sim.run().unwrap();

    assert_eq!(*log.borrow(), ["B", "C", "A", "D"]);
    assert_eq!(sim.now(), Time::from_ticks(7));
    assert_eq!(sim.event_count(), 4);
}

#[test]
fn test_now_is_monotonic_inside_callbacks() {
    let mut sim = Simulator::with_scheduler(SchedulerKind::Calendar);
    let seen = Rc::new(RefCell::new(Vec::new()));

    for delay in [40, 10, 30, 10, 20, 0] {
        let seen = Rc::clone(&seen);
        sim.schedule(Time::from_ticks(delay), move |sim| {
            seen.borrow_mut().push(sim.now());
            let seen = Rc::clone(&seen);
            sim.schedule(Time::from_ticks(5), move |sim| seen.borrow_mut().push(sim.now()))
                .unwrap();
        })
        .unwrap();
    }
    sim.run().unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 12);
    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn test_schedule_now_runs_after_current_instant() {
    let mut sim = Simulator::new();
    let log = Log::default();

    let inner = Rc::clone(&log);
    sim.schedule(Time::from_ticks(1), move |sim| {
        inner.borrow_mut().push("outer");
        sim.schedule_now(record(&inner, "now")).unwrap();
        inner.borrow_mut().push("outer-done");
    })
    .unwrap();
    sim.schedule(Time::from_ticks(1), record(&log, "sibling")).unwrap();
    sim.run().unwrap();

    assert_eq!(*log.borrow(), ["outer", "outer-done", "sibling", "now"]);
}

#[test]
fn test_cancel_before_run_prevents_callback() {
    let mut sim = Simulator::new();
    let log = Log::default();

    let doomed = sim.schedule(Time::from_ticks(2), record(&log, "doomed")).unwrap();
    sim.schedule(Time::from_ticks(1), record(&log, "kept")).unwrap();

    assert!(!sim.is_expired(doomed));
    assert!(sim.cancel(doomed));
    assert!(sim.is_expired(doomed));
    assert!(!sim.cancel(doomed));
    sim.run().unwrap();

    assert_eq!(*log.borrow(), ["kept"]);
    assert!(!sim.cancel(doomed));
    assert_eq!(sim.event_count(), 1);
    // Cancelled events still advance the clock.
    assert_eq!(sim.now(), Time::from_ticks(2));
}

#[test]
fn test_cancel_from_earlier_callback() {
    let mut sim = Simulator::new();
    let log = Log::default();

    let victim = sim.schedule(Time::from_ticks(10), record(&log, "victim")).unwrap();
    sim.schedule(Time::from_ticks(5), move |sim| {
        sim.cancel(victim);
    })
    .unwrap();
    sim.run().unwrap();

    assert!(log.borrow().is_empty());
}

#[test]
fn test_stale_handles_are_harmless() {
    let mut sim = Simulator::new();
    let ran = sim.schedule_now(|_| {}).unwrap();
    sim.run().unwrap();

    assert!(sim.is_expired(ran));
    assert!(!sim.cancel(ran));
    assert!(!sim.remove(ran));
    assert_eq!(sim.delay_left(ran), Time::ZERO);

    let detached = EventId::default();
    assert!(sim.is_expired(detached));
    assert!(!sim.cancel(detached));
}

#[test]
fn test_negative_delay_rejected_without_side_effects() {
    let mut sim = Simulator::new();
    sim.schedule(Time::from_ticks(1), |_| {}).unwrap();

    let err = sim.schedule(Time::from_ticks(-1), |_| {}).unwrap_err();
    assert_eq!(
        err,
        SimError::InvalidTime {
            delay: Time::from_ticks(-1)
        }
    );
    assert!(matches!(
        sim.schedule_with_context(ContextId::new(1), Time::from_ticks(-5), |_| {}),
        Err(SimError::InvalidTime { .. })
    ));
    assert!(sim.stop_after(Time::from_ticks(-1)).is_err());
    assert_eq!(sim.pending_events(), 1);
}

#[test]
fn test_reentrant_run_rejected() {
    let mut sim = Simulator::new();
    let result = Rc::new(RefCell::new(None));

    let slot = Rc::clone(&result);
    sim.schedule_now(move |sim| {
        *slot.borrow_mut() = Some(sim.run());
        assert_eq!(sim.state(), SimState::Running);
    })
    .unwrap();
    sim.run().unwrap();

    assert_eq!(*result.borrow(), Some(Err(SimError::AlreadyRunning)));
    assert_eq!(sim.state(), SimState::Stopped);
}

#[test]
fn test_stop_leaves_queue_intact() {
    let mut sim = Simulator::new();
    let log = Log::default();

    sim.schedule(Time::from_ticks(1), |sim| sim.stop()).unwrap();
    sim.schedule(Time::from_ticks(2), record(&log, "later")).unwrap();
    sim.run().unwrap();

    assert!(log.borrow().is_empty());
    assert_eq!(sim.now(), Time::from_ticks(1));
    assert_eq!(sim.pending_events(), 1);
    assert!(!sim.is_finished());

    sim.run().unwrap();
    assert_eq!(*log.borrow(), ["later"]);
    assert!(sim.is_finished());
}

#[test]
fn test_stop_after() {
    let mut sim = Simulator::new();
    let count = Rc::new(Cell::new(0u32));

    fn tick(sim: &mut Simulator, count: Rc<Cell<u32>>) {
        count.set(count.get() + 1);
        sim.schedule(Time::from_ticks(10), move |sim| tick(sim, count))
            .unwrap();
    }
    let c = Rc::clone(&count);
    sim.schedule_now(move |sim| tick(sim, c)).unwrap();
    sim.stop_after(Time::from_ticks(35)).unwrap();
    sim.run().unwrap();

    assert_eq!(count.get(), 4);
    assert_eq!(sim.now(), Time::from_ticks(35));
}

#[test]
fn test_context_set_during_callback_and_restored() {
    let mut sim = Simulator::new();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let outer = Rc::clone(&seen);
    sim.schedule_with_context(ContextId::new(7), Time::from_ticks(1), move |sim| {
        outer.borrow_mut().push(sim.context());
        let inner = Rc::clone(&outer);
        // Inherits context 7.
        sim.schedule(Time::from_ticks(1), move |sim| inner.borrow_mut().push(sim.context()))
            .unwrap();
    })
    .unwrap();
    let other = Rc::clone(&seen);
    sim.schedule_with_context(ContextId::new(9), Time::from_ticks(1), move |sim| {
        other.borrow_mut().push(sim.context())
    })
    .unwrap();

    assert_eq!(sim.context(), ContextId::NONE);
    sim.run().unwrap();
    assert_eq!(sim.context(), ContextId::NONE);
    assert_eq!(
        *seen.borrow(),
        [ContextId::new(7), ContextId::new(9), ContextId::new(7)]
    );
}

#[test]
fn test_destroy_runs_fifo_once_after_run() {
    let mut sim = Simulator::new();
    let log = Log::default();

    sim.schedule_destroy(record(&log, "X")).unwrap();
    sim.schedule_destroy(record(&log, "Y")).unwrap();
    sim.schedule_destroy(record(&log, "Z")).unwrap();
    sim.schedule(Time::from_ticks(3), record(&log, "event")).unwrap();

    sim.run().unwrap();
    assert_eq!(*log.borrow(), ["event"]);

    sim.destroy().unwrap();
    assert_eq!(*log.borrow(), ["event", "X", "Y", "Z"]);
    assert_eq!(sim.state(), SimState::Destroyed);

    assert_eq!(sim.destroy(), Err(SimError::SimulatorDestroyed));
    assert_eq!(*log.borrow(), ["event", "X", "Y", "Z"]);
}

#[test]
fn test_destroy_event_cancel_and_remove() {
    let mut sim = Simulator::new();
    let log = Log::default();

    let x = sim.schedule_destroy(record(&log, "X")).unwrap();
    let y = sim.schedule_destroy(record(&log, "Y")).unwrap();
    sim.schedule_destroy(record(&log, "Z")).unwrap();

    assert!(x.is_destroy());
    assert_eq!(sim.delay_left(x), Time::MAX);
    assert!(sim.cancel(x));
    assert!(sim.is_expired(x));
    assert!(sim.remove(y));
    assert!(sim.is_expired(y));

    sim.destroy().unwrap();
    assert_eq!(*log.borrow(), ["Z"]);
}

#[test]
fn test_destroy_inside_run_rejected() {
    let mut sim = Simulator::new();
    let result = Rc::new(RefCell::new(None));

    let slot = Rc::clone(&result);
    sim.schedule_now(move |sim| *slot.borrow_mut() = Some(sim.destroy()))
        .unwrap();
    sim.run().unwrap();

    assert_eq!(*result.borrow(), Some(Err(SimError::NotStopped)));
    assert_eq!(sim.state(), SimState::Stopped);
}

#[test]
fn test_scheduling_after_destroy_fails() {
    let mut sim = Simulator::new();
    sim.schedule(Time::from_ticks(100), |_| {}).unwrap();
    sim.destroy().unwrap();

    assert_eq!(sim.pending_events(), 0);
    assert_eq!(
        sim.schedule(Time::ZERO, |_| {}).unwrap_err(),
        SimError::SimulatorDestroyed
    );
    assert_eq!(
        sim.schedule_destroy(|_| {}).unwrap_err(),
        SimError::SimulatorDestroyed
    );
    assert_eq!(sim.run(), Err(SimError::SimulatorDestroyed));
}

#[test]
fn test_drop_runs_destroy_events() {
    let flag = Rc::new(Cell::new(false));
    {
        let mut sim = Simulator::new();
        let f = Rc::clone(&flag);
        sim.schedule_destroy(move |_| f.set(true)).unwrap();
    }
    assert!(flag.get());
}

#[test]
fn test_remove_and_delay_left() {
    let mut sim = Simulator::new();
    let log = Log::default();

    let id = sim.schedule(Time::from_ticks(40), record(&log, "removed")).unwrap();
    sim.schedule(Time::from_ticks(10), move |sim| {
        assert_eq!(sim.delay_left(id), Time::from_ticks(30));
        assert!(sim.remove(id));
    })
    .unwrap();
    sim.run().unwrap();

    assert!(log.borrow().is_empty());
    assert_eq!(sim.now(), Time::from_ticks(10));
    assert_eq!(sim.pending_events(), 0);
}

#[test]
fn test_set_scheduler_preserves_order() {
    let mut sim = Simulator::new();
    let log = Log::default();

    sim.schedule(Time::from_ticks(9), record(&log, "c")).unwrap();
    sim.schedule(Time::from_ticks(2), record(&log, "a")).unwrap();
    let switch_log = Rc::clone(&log);
    sim.schedule(Time::from_ticks(5), move |sim| {
        switch_log.borrow_mut().push("b");
        sim.set_scheduler(SchedulerKind::List);
    })
    .unwrap();
    sim.set_scheduler(SchedulerKind::Map);
    sim.run().unwrap();

    assert_eq!(*log.borrow(), ["a", "b", "c"]);
    assert_eq!(sim.scheduler_kind(), SchedulerKind::List);
}

#[test]
fn test_pre_event_hook_observes_dispatch() {
    let mut sim = Simulator::new();
    let infos: Rc<RefCell<Vec<EventInfo>>> = Rc::default();

    let sink = Rc::clone(&infos);
    sim.set_pre_event_hook(move |info| sink.borrow_mut().push(*info));
    let first = sim
        .schedule_with_context(ContextId::new(3), Time::from_ticks(4), |_| {})
        .unwrap();
    let cancelled = sim.schedule(Time::from_ticks(5), |_| {}).unwrap();
    sim.cancel(cancelled);
    sim.run().unwrap();

    let infos = infos.borrow();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].id, first);
    assert_eq!(infos[0].time, Time::from_ticks(4));
    assert_eq!(infos[0].context, ContextId::new(3));
}

#[test]
fn test_remote_scheduler_from_thread() {
    let mut sim = Simulator::new();
    let remote = sim.remote();
    let hits = Arc::new(AtomicUsize::new(0));

    let handle = {
        let hits = Arc::clone(&hits);
        std::thread::spawn(move || {
            for i in 0..3 {
                let hits = Arc::clone(&hits);
                remote
                    .schedule_with_context(ContextId::new(i), Time::from_ticks(5), move |sim| {
                        assert_eq!(sim.context(), ContextId::new(i));
                        hits.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
            }
        })
    };
    handle.join().unwrap();

    assert!(!sim.is_finished());
    sim.run().unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(sim.now(), Time::from_ticks(5));
}

#[test]
fn test_remote_stop_and_close() {
    let mut sim = Simulator::new();
    let remote = sim.remote();
    let log = Log::default();

    let stopper = remote.clone();
    sim.schedule(Time::from_ticks(1), move |_| stopper.stop()).unwrap();
    sim.schedule(Time::from_ticks(2), record(&log, "after-stop")).unwrap();
    sim.run().unwrap();
    assert!(log.borrow().is_empty());

    sim.destroy().unwrap();
    assert!(remote.is_closed());
    assert_eq!(
        remote.schedule_with_context(ContextId::NONE, Time::ZERO, |_| {}),
        Err(SimError::SimulatorDestroyed)
    );
    assert!(matches!(
        sim.remote()
            .schedule_with_context(ContextId::NONE, Time::from_ticks(-1), |_| {}),
        Err(SimError::InvalidTime { .. })
    ));
}

#[test]
fn test_sync_mode_lookahead() {
    let mut sim = Simulator::new();
    assert_eq!(sim.lookahead(), Time::MAX);
    assert_eq!(sim.system_id(), 0);
    assert_eq!(sim.maximum_simulation_time(), Time::MAX);

    let mut config = KernelConfig::for_testing();
    config.run.sync = SyncMode::Conservative {
        system_id: 2,
        lookahead: Time::from_ticks(50),
    };
    let mut partition = Simulator::with_config(&config).unwrap();
    partition.bound_lookahead(Time::from_ticks(20));
    assert_eq!(partition.lookahead(), Time::from_ticks(20));
    assert_eq!(partition.system_id(), 2);
    sim.bound_lookahead(Time::from_ticks(1));
    assert_eq!(sim.lookahead(), Time::MAX);
}

#[test]
fn test_with_config_schedules_stop() {
    let mut config = KernelConfig::for_testing();
    config.run.stop_after_ns = Some(15);
    let mut sim = Simulator::with_config(&config).unwrap();
    assert_eq!(sim.scheduler_kind(), SchedulerKind::Map);

    let log = Log::default();
    sim.schedule(Time::from_ticks(10), record(&log, "before")).unwrap();
    sim.schedule(Time::from_ticks(20), record(&log, "after")).unwrap();
    sim.run().unwrap();

    assert_eq!(*log.borrow(), ["before"]);
    assert_eq!(sim.now(), Time::from_ticks(15));
}

#[test]
fn test_event_id_stays_unique_across_slot_reuse() {
    let mut sim = Simulator::new();
    let first = sim.schedule_now(|_| {}).unwrap();
    sim.run().unwrap();
    let second = sim.schedule_now(|_| {}).unwrap();

    assert_ne!(first, second);
    assert!(sim.is_expired(first));
    assert!(!sim.is_expired(second));
    assert_eq!(sim.delay_left(second), Time::ZERO);
}

#[test]
fn test_instance_ids_are_distinct() {
    let mut first = Simulator::new();
    let mut second = Simulator::new();
    assert_ne!(first.instance_id(), second.instance_id());

    // Both hand out the same first destroy handle; only the instance tells
    // them apart.
    assert_eq!(
        first.schedule_destroy(|_| {}).unwrap(),
        second.schedule_destroy(|_| {}).unwrap()
    );
}
