//! Dispatch order properties checked against a sorted reference model,
//! on every scheduler backend.

use std::cell::RefCell;
use std::rc::Rc;

use eventide_core::{SchedulerKind, Simulator, Time};
use proptest::prelude::*;

/// (label, delay, cancelled)
type Plan = Vec<(usize, i64, bool)>;

fn plan() -> impl Strategy<Value = Plan> {
    prop::collection::vec((0i64..200, any::<bool>()), 0..120).prop_map(|ops| {
        ops.into_iter()
            .enumerate()
            .map(|(label, (delay, cancel))| (label, delay, cancel))
            .collect()
    })
}

/// Expected dispatch: live events ordered by time, insertion order on ties.
fn model(plan: &Plan) -> Vec<(usize, i64)> {
    let mut expected: Vec<(usize, i64)> = plan
        .iter()
        .filter(|(_, _, cancelled)| !cancelled)
        .map(|&(label, delay, _)| (label, delay))
        .collect();
    expected.sort_by_key(|&(label, delay)| (delay, label));
    expected
}

fn dispatch(kind: SchedulerKind, plan: &Plan) -> (Vec<(usize, i64)>, Time) {
    let mut sim = Simulator::with_scheduler(kind);
    let seen: Rc<RefCell<Vec<(usize, i64)>>> = Rc::default();

    let mut ids = Vec::new();
    for &(label, delay, _) in plan {
        let seen = Rc::clone(&seen);
        let id = sim
            .schedule(Time::from_ticks(delay), move |sim| {
                seen.borrow_mut().push((label, sim.now().ticks()));
            })
            .unwrap();
        ids.push(id);
    }
    for (&(_, _, cancelled), id) in plan.iter().zip(&ids) {
        if cancelled {
            sim.cancel(*id);
        }
    }

    sim.run().unwrap();
    let end = sim.now();
    sim.destroy().unwrap();
    let order = seen.take();
    (order, end)
}

proptest! {
    #[test]
    fn test_dispatch_matches_model(plan in plan()) {
        let expected = model(&plan);
        for kind in SchedulerKind::ALL {
            let (order, _) = dispatch(kind, &plan);
            prop_assert_eq!(&order, &expected, "backend {}", kind);
        }
    }

    #[test]
    fn test_clock_never_moves_backwards(plan in plan()) {
        for kind in SchedulerKind::ALL {
            let (order, end) = dispatch(kind, &plan);
            prop_assert!(order.windows(2).all(|pair| pair[0].1 <= pair[1].1));
            let latest = plan.iter().map(|&(_, delay, _)| delay).max().unwrap_or(0);
            // Cancelled events still advance the clock when popped.
            prop_assert_eq!(end.ticks(), latest);
        }
    }

    #[test]
    fn test_cancelled_handles_expire(plan in plan()) {
        let mut sim = Simulator::with_scheduler(SchedulerKind::Calendar);
        let ids: Vec<_> = plan
            .iter()
            .map(|&(_, delay, _)| sim.schedule(Time::from_ticks(delay), |_| {}).unwrap())
            .collect();

        for (&(_, _, cancelled), &id) in plan.iter().zip(&ids) {
            if cancelled {
                sim.cancel(id);
                prop_assert!(sim.is_expired(id));
            } else {
                prop_assert!(!sim.is_expired(id));
            }
        }

        sim.run().unwrap();
        prop_assert!(ids.iter().all(|&id| sim.is_expired(id)));
        let live = plan.iter().filter(|(_, _, cancelled)| !cancelled).count();
        prop_assert_eq!(sim.event_count(), live as u64);
    }
}

#[test]
fn test_nested_scheduling_is_consistent_across_backends() {
    fn chain(kind: SchedulerKind) -> Vec<(u32, i64)> {
        let mut sim = Simulator::with_scheduler(kind);
        let seen: Rc<RefCell<Vec<(u32, i64)>>> = Rc::default();
        for root in 0..8u32 {
            let seen = Rc::clone(&seen);
            sim.schedule(Time::from_ticks(i64::from(root % 3)), move |sim| {
                seen.borrow_mut().push((root, sim.now().ticks()));
                let seen = Rc::clone(&seen);
                sim.schedule(Time::from_ticks(i64::from(root)), move |sim| {
                    seen.borrow_mut().push((root + 100, sim.now().ticks()));
                })
                .unwrap();
            })
            .unwrap();
        }
        sim.run().unwrap();
        seen.take()
    }

    let reference = chain(SchedulerKind::Heap);
    assert_eq!(reference.len(), 16);
    for kind in SchedulerKind::ALL {
        assert_eq!(chain(kind), reference, "backend {kind}");
    }
}
