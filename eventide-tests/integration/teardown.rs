//! Teardown order: destroy-events and reader shutdown interleave in the
//! order they were registered.

use std::cell::RefCell;
use std::fs::File;
use std::os::fd::{AsRawFd, OwnedFd};
use std::rc::Rc;

use eventide_core::{SimError, SimState, Simulator, Time};
use eventide_io::{FdReader, FdReaderError, ReaderState};

#[test]
fn test_readers_stop_in_registration_order() {
    let mut sim = Simulator::new();
    let pipes: Vec<(OwnedFd, File)> = (0..3)
        .map(|_| {
            let (rx, tx) = nix::unistd::pipe().unwrap();
            (rx, File::from(tx))
        })
        .collect();
    let readers: Vec<Rc<FdReader>> = (0..3).map(|_| Rc::new(FdReader::new())).collect();
    let observed: Rc<RefCell<Vec<[ReaderState; 3]>>> = Rc::default();

    // X, marker, Y, marker, Z, marker
    for (reader, (rx, _)) in readers.iter().zip(&pipes) {
        reader.start(&mut sim, rx.as_raw_fd(), |_| {}).unwrap();
        let observed = Rc::clone(&observed);
        let watched: Vec<Rc<FdReader>> = readers.iter().map(Rc::clone).collect();
        sim.schedule_destroy(move |_| {
            observed
                .borrow_mut()
                .push([watched[0].state(), watched[1].state(), watched[2].state()]);
        })
        .unwrap();
    }

    sim.schedule(Time::from_secs(1), |_| {}).unwrap();
    sim.run().unwrap();
    assert!(readers.iter().all(|r| r.state() == ReaderState::Running));

    sim.destroy().unwrap();

    use ReaderState::{Idle, Running};
    assert_eq!(
        *observed.borrow(),
        vec![
            [Idle, Running, Running],
            [Idle, Idle, Running],
            [Idle, Idle, Idle],
        ]
    );
    assert_eq!(sim.state(), SimState::Destroyed);
}

#[test]
fn test_destroy_events_registered_during_teardown_still_run() {
    let mut sim = Simulator::new();
    let outcome: Rc<RefCell<Option<Result<(), SimError>>>> = Rc::default();

    let sink = Rc::clone(&outcome);
    sim.schedule_destroy(move |sim| {
        // Still tearing down: new destroy-events run in the same pass.
        let ran = sim.schedule_destroy(|_| {}).map(|_| ());
        *sink.borrow_mut() = Some(ran);
    })
    .unwrap();
    sim.destroy().unwrap();

    assert_eq!(*outcome.borrow(), Some(Ok(())));
    assert_eq!(sim.schedule_destroy(|_| {}), Err(SimError::SimulatorDestroyed));
}

#[test]
fn test_reader_refuses_destroyed_simulator() {
    let mut sim = Simulator::new();
    sim.destroy().unwrap();

    let (rx, _tx) = nix::unistd::pipe().unwrap();
    let reader = FdReader::new();
    let err = reader.start(&mut sim, rx.as_raw_fd(), |_| {}).unwrap_err();
    assert!(matches!(
        err,
        FdReaderError::Simulator(SimError::SimulatorDestroyed)
    ));
    assert_eq!(reader.state(), ReaderState::Idle);
}
