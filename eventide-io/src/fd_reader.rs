//! Background reader bridging a real file descriptor into a simulation.
//!
//! Each [`FdReader`] owns one OS thread that waits in `poll(2)` on the
//! target descriptor and on a private wake-pipe. Data is handed to the
//! user callback directly on that thread; re-entering virtual time is the
//! callback's job, usually through a [`RemoteScheduler`].
//!
//! ```text
//!   Idle --start--> Running --stop--> Stopping --join--> Idle
//! ```
//!
//! [`RemoteScheduler`]: eventide_core::RemoteScheduler

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use eventide_core::{EventId, ReaderConfig, SimError, Simulator};
use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use crate::read::{FdRead, ReadOutcome, SingleRead};

/// Errors raised when starting a reader.
#[derive(Debug, Error)]
pub enum FdReaderError {
    /// The reader already has a live thread
    #[error("FdReader already running on fd {fd}")]
    AlreadyRunning {
        /// Descriptor the live thread is reading
        fd: RawFd,
    },

    /// Another thread is in the middle of stopping this reader
    #[error("FdReader is stopping")]
    Stopping,

    /// Creating or configuring the wake-pipe failed
    #[error("Wake-pipe setup failed: {0}")]
    Os(#[from] Errno),

    /// The reader thread could not be spawned
    #[error("Failed to spawn reader thread: {0}")]
    Spawn(#[from] io::Error),

    /// The simulator refused the teardown registration
    #[error(transparent)]
    Simulator(#[from] SimError),
}

/// Lifecycle of a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// No thread
    Idle,
    /// Thread started and not yet joined
    Running,
    /// `stop()` is joining the thread
    Stopping,
}

/// Why the reader thread ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// A stop was requested
    Stopped,
    /// The descriptor reached end of file
    Eof,
    /// Waiting on or reading the descriptor failed
    Failed(Errno),
}

struct ReaderControl {
    state: ReaderState,
    fd: Option<RawFd>,
    thread: Option<JoinHandle<()>>,
    wake_tx: Option<File>,
    /// Teardown hook and the simulator instance that issued it
    destroy_event: (u64, EventId),
}

struct ReaderShared {
    stop: AtomicBool,
    control: Mutex<ReaderControl>,
    exit: Mutex<Option<ReaderExit>>,
    buffer_size: usize,
}

/// Reads a file descriptor on a dedicated thread and hands each chunk to a
/// callback.
///
/// Starting a reader registers one destroy-event on the simulator, so the
/// thread is joined by `Simulator::destroy` even if nobody calls
/// [`FdReader::stop`]. Dropping the reader stops it as well.
pub struct FdReader {
    shared: Arc<ReaderShared>,
}

impl FdReader {
    /// Creates an idle reader with the default 64 KiB read buffer.
    pub fn new() -> Self {
        Self::with_config(&ReaderConfig::default())
    }

    /// Creates an idle reader sized by `config`.
    pub fn with_config(config: &ReaderConfig) -> Self {
        Self {
            shared: Arc::new(ReaderShared {
                stop: AtomicBool::new(false),
                control: Mutex::new(ReaderControl {
                    state: ReaderState::Idle,
                    fd: None,
                    thread: None,
                    wake_tx: None,
                    destroy_event: (0, EventId::default()),
                }),
                exit: Mutex::new(None),
                buffer_size: config.buffer_size.max(1),
            }),
        }
    }

    /// Starts reading `fd` with one `read(2)` per readiness notification.
    ///
    /// `fd` is borrowed, not owned: it must stay open until the reader is
    /// stopped.
    ///
    /// # Errors
    ///
    /// - `FdReaderError::AlreadyRunning` - A reader thread is still live
    /// - `FdReaderError::Stopping` - A concurrent `stop()` has not finished
    /// - `FdReaderError::Os` - The wake-pipe could not be created
    /// - `FdReaderError::Spawn` - The thread could not be spawned
    /// - `FdReaderError::Simulator` - The simulator was destroyed
    pub fn start<F>(&self, sim: &mut Simulator, fd: RawFd, callback: F) -> Result<(), FdReaderError>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        self.start_with(sim, fd, SingleRead, callback)
    }

    /// Starts reading `fd` with a custom read strategy.
    ///
    /// # Errors
    ///
    /// Same as [`FdReader::start`].
    pub fn start_with<R, F>(
        &self,
        sim: &mut Simulator,
        fd: RawFd,
        reader: R,
        callback: F,
    ) -> Result<(), FdReaderError>
    where
        R: FdRead + Send + 'static,
        F: FnMut(&[u8]) + Send + 'static,
    {
        let mut control = self.shared.control.lock();
        match control.state {
            ReaderState::Running => {
                return Err(FdReaderError::AlreadyRunning {
                    fd: control.fd.unwrap_or(fd),
                });
            }
            ReaderState::Stopping => return Err(FdReaderError::Stopping),
            ReaderState::Idle => {}
        }

        let (wake_rx, wake_tx) = wake_pipe()?;

        // Handles from another simulator say nothing about this one.
        let (owner, event) = control.destroy_event;
        if owner != sim.instance_id() || sim.is_expired(event) {
            let shared = Arc::downgrade(&self.shared);
            let event = sim.schedule_destroy(move |_| stop_weak(&shared))?;
            control.destroy_event = (sim.instance_id(), event);
        }

        self.shared.stop.store(false, Ordering::Release);
        *self.shared.exit.lock() = None;

        let shared = Arc::clone(&self.shared);
        let thread = thread::Builder::new()
            .name(format!("eventide-fd-{fd}"))
            .spawn(move || {
                let exit = read_loop(&shared, fd, wake_rx, reader, callback);
                debug!(fd, ?exit, "Reader thread exiting");
                *shared.exit.lock() = Some(exit);
            })?;

        control.state = ReaderState::Running;
        control.fd = Some(fd);
        control.thread = Some(thread);
        control.wake_tx = Some(wake_tx);
        debug!(fd, destroy_event = %control.destroy_event.1, "Reader started");
        Ok(())
    }

    /// Stops the thread and waits for it to exit. No-op when idle.
    ///
    /// After this returns the callback will not run again. Called from the
    /// reader's own callback it only requests the exit; the join then
    /// happens on the next `stop()` from another thread.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ReaderState {
        self.shared.control.lock().state
    }

    /// Descriptor being read, if running.
    pub fn fd(&self) -> Option<RawFd> {
        self.shared.control.lock().fd
    }

    /// Why the most recent reader thread ended, once it has.
    pub fn exit_reason(&self) -> Option<ReaderExit> {
        *self.shared.exit.lock()
    }
}

impl Default for FdReader {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FdReader {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

impl std::fmt::Debug for FdReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let control = self.shared.control.lock();
        f.debug_struct("FdReader")
            .field("state", &control.state)
            .field("fd", &control.fd)
            .field("buffer_size", &self.shared.buffer_size)
            .finish_non_exhaustive()
    }
}

fn stop_weak(shared: &Weak<ReaderShared>) {
    if let Some(shared) = shared.upgrade() {
        shared.stop();
    }
}

impl ReaderShared {
    fn stop(&self) {
        let (thread, wake_tx) = {
            let mut control = self.control.lock();
            if control.state != ReaderState::Running {
                return;
            }
            self.stop.store(true, Ordering::Release);
            // A thread that already exited has closed the read end.
            let exited = self.exit.lock().is_some();
            if let Some(wake_tx) = control.wake_tx.as_mut()
                && !exited
            {
                wake(wake_tx);
            }

            let on_reader_thread = control
                .thread
                .as_ref()
                .is_some_and(|handle| handle.thread().id() == thread::current().id());
            if on_reader_thread {
                warn!(fd = ?control.fd, "stop() called from the reader callback; deferring join");
                return;
            }

            control.state = ReaderState::Stopping;
            (control.thread.take(), control.wake_tx.take())
        };

        if let Some(handle) = thread
            && handle.join().is_err()
        {
            error!("Reader thread panicked");
        }
        drop(wake_tx);

        let mut control = self.control.lock();
        debug!(fd = ?control.fd, "Reader stopped");
        control.state = ReaderState::Idle;
        control.fd = None;
        self.stop.store(false, Ordering::Release);
    }
}

/// Creates the wake-pipe with a non-blocking read end.
fn wake_pipe() -> Result<(File, File), Errno> {
    let (rx, tx) = nix::unistd::pipe()?;
    let flags = OFlag::from_bits_truncate(fcntl(rx.as_raw_fd(), FcntlArg::F_GETFL)?);
    fcntl(rx.as_raw_fd(), FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok((File::from(rx), File::from(tx)))
}

fn wake(wake_tx: &mut File) {
    match wake_tx.write(&[0]) {
        Ok(1) => {}
        Ok(written) => warn!(written, "Incomplete wake-pipe write"),
        Err(err) => warn!(%err, "Incomplete wake-pipe write"),
    }
}

/// Empties the wake-pipe. Returns `false` if the write end was closed.
fn drain_wake(wake_rx: &mut File) -> bool {
    let mut buf = [0u8; 1024];
    loop {
        match wake_rx.read(&mut buf) {
            Ok(0) => return false,
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return true,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => {
                error!(%err, "Wake-pipe read failed");
                return true;
            }
        }
    }
}

const READY: PollFlags = PollFlags::POLLIN
    .union(PollFlags::POLLHUP)
    .union(PollFlags::POLLERR);

fn read_loop<R, F>(
    shared: &ReaderShared,
    fd: RawFd,
    mut wake_rx: File,
    mut reader: R,
    mut callback: F,
) -> ReaderExit
where
    R: FdRead,
    F: FnMut(&[u8]),
{
    let mut buf = vec![0u8; shared.buffer_size];
    // SAFETY: the caller of `start` keeps `fd` open until `stop` has joined
    // this thread, which outlives every use of `target`.
    let target = unsafe { BorrowedFd::borrow_raw(fd) };

    loop {
        let (target_events, wake_ready) = {
            let mut fds = [
                PollFd::new(target, PollFlags::POLLIN),
                PollFd::new(wake_rx.as_fd(), PollFlags::POLLIN),
            ];
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    error!(fd, %errno, "poll() failed");
                    return ReaderExit::Failed(errno);
                }
            }
            (
                fds[0].revents().unwrap_or(PollFlags::empty()),
                fds[1].revents().is_some_and(|events| events.intersects(READY)),
            )
        };

        if wake_ready && !drain_wake(&mut wake_rx) && !shared.stop.load(Ordering::Acquire) {
            panic!("wake-pipe for fd {fd} closed without a stop request");
        }
        if shared.stop.load(Ordering::Acquire) {
            return ReaderExit::Stopped;
        }

        if target_events.contains(PollFlags::POLLNVAL) {
            error!(fd, "Descriptor is not open");
            return ReaderExit::Failed(Errno::EBADF);
        }
        if !target_events.intersects(READY) {
            continue;
        }

        match reader.read_chunk(fd, &mut buf) {
            ReadOutcome::Data(len) => {
                let len = len.min(buf.len());
                trace!(fd, len, "Read chunk");
                callback(&buf[..len]);
            }
            ReadOutcome::Skip => {}
            ReadOutcome::Closed => {
                warn!(fd, "Descriptor closed by peer");
                return ReaderExit::Eof;
            }
            ReadOutcome::Failed(errno) => {
                error!(fd, %errno, "read() failed");
                return ReaderExit::Failed(errno);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::OwnedFd;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn pipe() -> (OwnedFd, File) {
        let (rx, tx) = nix::unistd::pipe().unwrap();
        (rx, File::from(tx))
    }

    fn wait_for_exit(reader: &FdReader) -> Option<ReaderExit> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(exit) = reader.exit_reason() {
                return Some(exit);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn test_start_then_stop_without_data() {
        let mut sim = Simulator::new();
        let (rx, _tx) = pipe();
        let calls = Arc::new(AtomicUsize::new(0));
        let reader = FdReader::new();

        let counter = Arc::clone(&calls);
        reader
            .start(&mut sim, rx.as_raw_fd(), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(reader.state(), ReaderState::Running);
        assert_eq!(reader.fd(), Some(rx.as_raw_fd()));

        reader.stop();
        assert_eq!(reader.state(), ReaderState::Idle);
        assert_eq!(reader.exit_reason(), Some(ReaderExit::Stopped));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        reader.stop();
        assert_eq!(reader.state(), ReaderState::Idle);
    }

    #[test]
    fn test_delivers_written_bytes() {
        let mut sim = Simulator::new();
        let (rx, mut tx) = pipe();
        let (chunks, received) = mpsc::channel();
        let reader = FdReader::new();

        reader
            .start(&mut sim, rx.as_raw_fd(), move |chunk| {
                let on_reader_thread = thread::current()
                    .name()
                    .is_some_and(|name| name.starts_with("eventide-fd-"));
                chunks.send((chunk.to_vec(), on_reader_thread)).unwrap();
            })
            .unwrap();

        tx.write_all(b"twelve bytes").unwrap();
        let (chunk, on_reader_thread) = received.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(chunk, b"twelve bytes");
        assert!(on_reader_thread);

        reader.stop();
    }

    #[test]
    fn test_no_callback_after_stop() {
        let mut sim = Simulator::new();
        let (rx, mut tx) = pipe();
        let calls = Arc::new(AtomicUsize::new(0));
        let reader = FdReader::new();

        let counter = Arc::clone(&calls);
        reader
            .start(&mut sim, rx.as_raw_fd(), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        reader.stop();

        tx.write_all(b"late").unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_second_start_rejected() {
        let mut sim = Simulator::new();
        let (rx, _tx) = pipe();
        let reader = FdReader::new();

        reader.start(&mut sim, rx.as_raw_fd(), |_| {}).unwrap();
        let err = reader.start(&mut sim, rx.as_raw_fd(), |_| {}).unwrap_err();
        assert!(matches!(err, FdReaderError::AlreadyRunning { fd } if fd == rx.as_raw_fd()));
        reader.stop();
    }

    #[test]
    fn test_eof_ends_thread() {
        let mut sim = Simulator::new();
        let (rx, tx) = pipe();
        let reader = FdReader::new();

        reader.start(&mut sim, rx.as_raw_fd(), |_| {}).unwrap();
        drop(tx);

        assert_eq!(wait_for_exit(&reader), Some(ReaderExit::Eof));
        // The thread is gone but still needs joining.
        assert_eq!(reader.state(), ReaderState::Running);
        reader.stop();
        assert_eq!(reader.state(), ReaderState::Idle);
    }

    #[test]
    fn test_destroy_joins_forgotten_reader() {
        let mut sim = Simulator::new();
        let (rx, _tx) = pipe();
        let reader = FdReader::new();

        reader.start(&mut sim, rx.as_raw_fd(), |_| {}).unwrap();
        sim.run().unwrap();
        sim.destroy().unwrap();

        assert_eq!(reader.state(), ReaderState::Idle);
        assert_eq!(reader.exit_reason(), Some(ReaderExit::Stopped));
    }

    #[test]
    fn test_restart_reuses_destroy_event() {
        let mut sim = Simulator::new();
        let (rx, _tx) = pipe();
        let reader = FdReader::new();

        reader.start(&mut sim, rx.as_raw_fd(), |_| {}).unwrap();
        let (_, first) = reader.shared.control.lock().destroy_event;
        reader.stop();

        reader.start(&mut sim, rx.as_raw_fd(), |_| {}).unwrap();
        let (_, second) = reader.shared.control.lock().destroy_event;
        assert_eq!(first, second);
        assert!(!sim.is_expired(second));
        reader.stop();
    }

    #[test]
    fn test_restart_on_another_simulator_registers_teardown() {
        let mut first = Simulator::new();
        let (rx, _tx) = pipe();
        let reader = FdReader::new();

        reader.start(&mut first, rx.as_raw_fd(), |_| {}).unwrap();
        reader.stop();

        // Same destroy handle value as the one `first` issued above.
        let mut second = Simulator::new();
        second.schedule_destroy(|_| {}).unwrap();
        reader.start(&mut second, rx.as_raw_fd(), |_| {}).unwrap();
        let (owner, _) = reader.shared.control.lock().destroy_event;
        assert_eq!(owner, second.instance_id());

        second.run().unwrap();
        second.destroy().unwrap();
        assert_eq!(reader.state(), ReaderState::Idle);
        assert_eq!(reader.exit_reason(), Some(ReaderExit::Stopped));
        first.destroy().unwrap();
    }

    #[test]
    fn test_stop_from_callback_defers_join_to_destroy() {
        let mut sim = Simulator::new();
        let (rx, mut tx) = pipe();
        let reader = Arc::new(FdReader::new());
        let (calls_tx, calls) = mpsc::channel();

        let inner = Arc::clone(&reader);
        reader
            .start(&mut sim, rx.as_raw_fd(), move |chunk| {
                inner.stop();
                calls_tx.send(chunk.len()).unwrap();
            })
            .unwrap();

        tx.write_all(b"bye").unwrap();
        assert_eq!(calls.recv_timeout(Duration::from_secs(5)).unwrap(), 3);
        assert_eq!(wait_for_exit(&reader), Some(ReaderExit::Stopped));
        // The thread exited on its own but nobody has joined it yet.
        assert_eq!(reader.state(), ReaderState::Running);

        tx.write_all(b"ignored").unwrap();
        sim.destroy().unwrap();
        assert_eq!(reader.state(), ReaderState::Idle);
        assert!(calls.try_recv().is_err());
    }

    #[test]
    fn test_start_after_destroy_fails() {
        let mut sim = Simulator::new();
        sim.destroy().unwrap();
        let (rx, _tx) = pipe();
        let reader = FdReader::new();

        let err = reader.start(&mut sim, rx.as_raw_fd(), |_| {}).unwrap_err();
        assert!(matches!(
            err,
            FdReaderError::Simulator(SimError::SimulatorDestroyed)
        ));
        assert_eq!(reader.state(), ReaderState::Idle);
    }

    #[test]
    fn test_custom_strategy_can_skip() {
        let mut sim = Simulator::new();
        let (rx, mut tx) = pipe();
        let (chunks, received) = mpsc::channel();
        let reader = FdReader::with_config(&ReaderConfig { buffer_size: 8 });

        // Consumes one byte per wakeup and drops every 'x'.
        let strategy = |fd: RawFd, buf: &mut [u8]| match SingleRead.read_chunk(fd, &mut buf[..1]) {
            ReadOutcome::Data(_) if buf[0] == b'x' => ReadOutcome::Skip,
            other => other,
        };
        reader
            .start_with(&mut sim, rx.as_raw_fd(), strategy, move |chunk| {
                chunks.send(chunk.to_vec()).unwrap();
            })
            .unwrap();

        tx.write_all(b"axb").unwrap();
        let first = received.recv_timeout(Duration::from_secs(5)).unwrap();
        let second = received.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!([first, second], [b"a".to_vec(), b"b".to_vec()]);
        reader.stop();
    }

    #[test]
    fn test_drop_stops_thread() {
        let mut sim = Simulator::new();
        let (rx, _tx) = pipe();
        let reader = FdReader::new();
        reader.start(&mut sim, rx.as_raw_fd(), |_| {}).unwrap();
        let shared = Arc::downgrade(&reader.shared);

        drop(reader);
        // Only the thread closure could still hold the block; it has been joined.
        assert!(shared.upgrade().is_none());
    }
}
