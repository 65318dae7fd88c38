//! Eventide I/O - real file descriptors feeding a simulation.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
//!
//! [`FdReader`] runs one background thread per descriptor and invokes a
//! callback with every chunk read. The callback runs on that thread, outside
//! virtual time; hand results to the simulator with a
//! [`RemoteScheduler`](eventide_core::RemoteScheduler):
//!
//! ```rust,no_run
//! use eventide_core::{ContextId, Simulator, Time};
//! use eventide_io::FdReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut sim = Simulator::new();
//! let remote = sim.remote();
//! let reader = FdReader::new();
//! reader.start(&mut sim, 0, move |chunk| {
//!     let len = chunk.len();
//!     let _ = remote.schedule_with_context(ContextId::new(1), Time::ZERO, move |sim| {
//!         println!("{len} bytes at {}", sim.now());
//!     });
//! })?;
//! sim.run()?;
//! sim.destroy()?; // joins the reader thread
//! # Ok(())
//! # }
//! ```

pub mod fd_reader;
pub mod read;

pub use fd_reader::{FdReader, FdReaderError, ReaderExit, ReaderState};
pub use read::{FdRead, ReadOutcome, SingleRead};
