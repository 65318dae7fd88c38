//! How a reader pulls bytes off its descriptor.

use std::os::fd::RawFd;

use nix::errno::Errno;

/// Result of one read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were placed at the start of the buffer
    Data(usize),
    /// The peer closed the descriptor
    Closed,
    /// Nothing usable this time; keep waiting
    Skip,
    /// The read failed for good
    Failed(Errno),
}

/// Read strategy run by the background thread each time the descriptor
/// becomes readable.
pub trait FdRead {
    /// Reads once from `fd` into `buf`.
    fn read_chunk(&mut self, fd: RawFd, buf: &mut [u8]) -> ReadOutcome;
}

/// One `read(2)` per readiness notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleRead;

impl FdRead for SingleRead {
    fn read_chunk(&mut self, fd: RawFd, buf: &mut [u8]) -> ReadOutcome {
        loop {
            match nix::unistd::read(fd, buf) {
                Ok(0) => return ReadOutcome::Closed,
                Ok(n) => return ReadOutcome::Data(n),
                Err(Errno::EINTR) => {}
                Err(Errno::EAGAIN) => return ReadOutcome::Skip,
                Err(errno) => return ReadOutcome::Failed(errno),
            }
        }
    }
}

impl<F> FdRead for F
where
    F: FnMut(RawFd, &mut [u8]) -> ReadOutcome,
{
    fn read_chunk(&mut self, fd: RawFd, buf: &mut [u8]) -> ReadOutcome {
        self(fd, buf)
    }
}
