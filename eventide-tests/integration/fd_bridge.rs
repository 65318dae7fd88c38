//! Real pipes feeding virtual time through `FdReader` and `RemoteScheduler`.

use std::cell::RefCell;
use std::fs::File;
use std::io::Write;
use std::os::fd::{AsRawFd, OwnedFd};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use eventide_core::{ContextId, KernelConfig, SimState, Simulator, Time};
use eventide_io::{FdReader, ReaderExit, ReaderState};

fn pipe() -> (OwnedFd, File) {
    let (rx, tx) = nix::unistd::pipe().unwrap();
    (rx, File::from(tx))
}

/// Runs `sim` until `done` holds or five seconds pass.
fn run_until(sim: &mut Simulator, mut done: impl FnMut(&Simulator) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(sim) {
        assert!(Instant::now() < deadline, "timed out waiting for the reader");
        sim.run().unwrap();
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_chunks_arrive_in_virtual_time() {
    let mut sim = Simulator::with_config(&KernelConfig::for_testing()).unwrap();
    let (rx, mut tx) = pipe();
    let remote = sim.remote();
    let arrivals: Rc<RefCell<Vec<(Time, ContextId)>>> = Rc::default();

    let hook_arrivals = Rc::clone(&arrivals);
    sim.set_pre_event_hook(move |info| hook_arrivals.borrow_mut().push((info.time, info.context)));

    // Remote callbacks must be Send, so the payload lands in a
    // thread-local sink on the simulator thread.
    thread_local! {
        static SINK: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
    }
    let reader = FdReader::with_config(&KernelConfig::for_testing().reader);
    reader
        .start(&mut sim, rx.as_raw_fd(), move |chunk| {
            let chunk = chunk.to_vec();
            remote
                .schedule_with_context(ContextId::new(7), Time::from_millis(3), move |_| {
                    SINK.with(|sink| sink.borrow_mut().extend_from_slice(&chunk));
                })
                .unwrap();
        })
        .unwrap();

    tx.write_all(b"ping").unwrap();
    run_until(&mut sim, |_| SINK.with(|sink| sink.borrow().len()) >= 4);
    assert_eq!(SINK.with(|sink| sink.take()), b"ping");

    let arrivals = arrivals.borrow();
    assert!(!arrivals.is_empty());
    assert!(arrivals.iter().all(|&(_, context)| context == ContextId::new(7)));
    assert!(arrivals.iter().all(|&(time, _)| time >= Time::from_millis(3)));

    assert_eq!(reader.state(), ReaderState::Running);
    sim.destroy().unwrap();
    assert_eq!(reader.state(), ReaderState::Idle);
    assert_eq!(reader.exit_reason(), Some(ReaderExit::Stopped));
}

#[test]
fn test_end_of_file_is_reported() {
    let mut sim = Simulator::new();
    let (rx, mut tx) = pipe();
    let reader = FdReader::new();
    let remote = sim.remote();

    reader
        .start(&mut sim, rx.as_raw_fd(), move |chunk| {
            let len = chunk.len() as i64;
            remote
                .schedule_with_context(ContextId::new(1), Time::from_ticks(len), |_| {})
                .unwrap();
        })
        .unwrap();

    tx.write_all(b"abc").unwrap();
    drop(tx);

    run_until(&mut sim, |_| reader.exit_reason().is_some());
    assert_eq!(reader.exit_reason(), Some(ReaderExit::Eof));
    sim.run().unwrap();
    assert!(sim.event_count() >= 1);

    reader.stop();
    assert_eq!(reader.state(), ReaderState::Idle);
    sim.destroy().unwrap();
    assert_eq!(sim.state(), SimState::Destroyed);
}

#[test]
fn test_remote_stop_ends_run_from_reader_thread() {
    let mut sim = Simulator::new();
    let (rx, mut tx) = pipe();
    let reader = FdReader::new();
    let remote = sim.remote();

    // Keeps the queue busy so `run` only returns once the stop lands.
    fn tick(sim: &mut Simulator) {
        sim.schedule(Time::from_ticks(1), tick).unwrap();
    }
    sim.schedule_now(tick).unwrap();

    reader
        .start(&mut sim, rx.as_raw_fd(), move |_| remote.stop())
        .unwrap();

    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        tx.write_all(b"x").unwrap();
        tx
    });

    sim.run().unwrap();
    assert_eq!(sim.state(), SimState::Stopped);
    assert!(sim.now() > Time::ZERO);

    drop(writer.join().unwrap());
    sim.destroy().unwrap();
    assert_eq!(reader.state(), ReaderState::Idle);
}
