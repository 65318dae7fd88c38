//! CLI command implementations

use std::cell::{Cell, RefCell};
use std::os::fd::AsRawFd;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Subcommand;
use eventide_core::{ContextId, KernelConfig, SchedulerKind, Simulator, Time};
use eventide_io::FdReader;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Schedule a fixed set of events and print the dispatch order
    Order {
        /// Scheduler backend
        #[arg(short, long, value_enum, default_value_t = SchedulerKind::Heap)]
        scheduler: SchedulerKind,
        /// Print the dispatch trace as JSON
        #[arg(long)]
        json: bool,
    },
    /// Time a hold-model workload on each scheduler backend
    Bench {
        /// Events dispatched per backend
        #[arg(short, long, default_value = "100000")]
        events: usize,
        /// Events kept in flight
        #[arg(long, default_value = "256")]
        population: usize,
        /// RNG seed for event offsets
        #[arg(long, default_value = "42")]
        seed: u64,
        /// Only run this backend
        #[arg(short, long, value_enum)]
        scheduler: Option<SchedulerKind>,
    },
    /// Bridge stdin into simulated time until end of file
    Relay {
        /// Virtual delay applied to every chunk, in microseconds
        #[arg(long, default_value = "0")]
        latency_us: i64,
        /// Context the chunks are attributed to
        #[arg(long, default_value = "1")]
        context: u32,
    },
    /// Print the effective configuration, environment overrides applied
    Config,
}

/// Handle the CLI command
///
/// # Errors
/// Returns the error of the command that failed
pub fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Order { scheduler, json } => run_order(scheduler, json),
        Commands::Bench {
            events,
            population,
            seed,
            scheduler,
        } => run_bench(events, population, seed, scheduler),
        Commands::Relay {
            latency_us,
            context,
        } => run_relay(latency_us, context),
        Commands::Config => show_config(),
    }
}

#[derive(Debug, Serialize)]
struct DispatchRecord {
    label: &'static str,
    time: i64,
    sequence: u64,
    context: u32,
}

/// Schedules A@5, B@3, C@3, D@7 and reports the order they ran in.
///
/// # Errors
/// - `SimError` - Scheduling or running failed
pub fn run_order(scheduler: SchedulerKind, json: bool) -> anyhow::Result<()> {
    let mut sim = Simulator::with_scheduler(scheduler);
    let trace: Rc<RefCell<Vec<DispatchRecord>>> = Rc::default();

    for (label, delay) in [("A", 5), ("B", 3), ("C", 3), ("D", 7)] {
        let trace = Rc::clone(&trace);
        let id = sim.schedule(Time::from_ticks(delay), move |sim| {
            trace.borrow_mut().push(DispatchRecord {
                label,
                time: sim.now().ticks(),
                sequence: 0,
                context: sim.context().raw(),
            });
        })?;
        debug!(label, %id, "Scheduled");
    }

    let sequences = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&sequences);
    sim.set_pre_event_hook(move |info| sink.borrow_mut().push(info.id.sequence()));
    sim.run()?;
    sim.destroy()?;

    let mut trace = trace.take();
    for (record, sequence) in trace.iter_mut().zip(sequences.borrow().iter()) {
        record.sequence = *sequence;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&trace)?);
    } else {
        println!("Dispatch order ({scheduler} scheduler)");
        println!("{:-<40}", "");
        for record in &trace {
            println!(
                "  {} at t={} (seq {})",
                record.label, record.time, record.sequence
            );
        }
    }
    Ok(())
}

fn hold(sim: &mut Simulator, rng: Rc<RefCell<ChaCha8Rng>>, left: Rc<Cell<usize>>) {
    if left.get() == 0 {
        return;
    }
    left.set(left.get() - 1);
    let delay = Time::from_ticks(rng.borrow_mut().random_range(1..10_000));
    if let Err(err) = sim.schedule(delay, move |sim| hold(sim, rng, left)) {
        warn!(%err, "Dropping hold event");
    }
}

/// Runs the hold model on one or all backends and prints timings.
///
/// # Errors
/// - `SimError` - Scheduling or running failed
pub fn run_bench(
    events: usize,
    population: usize,
    seed: u64,
    only: Option<SchedulerKind>,
) -> anyhow::Result<()> {
    let kinds: Vec<SchedulerKind> = match only {
        Some(kind) => vec![kind],
        None => SchedulerKind::ALL.to_vec(),
    };

    println!("Hold model: {events} events, {population} in flight, seed {seed}");
    println!("{:-<60}", "");
    for kind in kinds {
        let mut sim = Simulator::with_scheduler(kind);
        let rng = Rc::new(RefCell::new(ChaCha8Rng::seed_from_u64(seed)));
        let left = Rc::new(Cell::new(events));
        for _ in 0..population.max(1) {
            hold(&mut sim, Rc::clone(&rng), Rc::clone(&left));
        }

        let started = Instant::now();
        sim.run()?;
        let elapsed = started.elapsed();
        let dispatched = sim.event_count();
        sim.destroy()?;

        let rate = dispatched as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        info!(%kind, dispatched, ?elapsed, "Backend finished");
        println!(
            "  {:<10} {:>10} events  {:>10.2?}  {:>12.0} events/s  end {}",
            kind.as_str(),
            dispatched,
            elapsed,
            rate,
            sim.now()
        );
    }
    Ok(())
}

/// Reads stdin on a background thread and replays every chunk in virtual
/// time, `latency_us` after it arrived.
///
/// # Errors
/// - `FdReaderError` - The reader could not start
/// - `SimError` - Invalid latency or run failure
pub fn run_relay(latency_us: i64, context: u32) -> anyhow::Result<()> {
    let config = KernelConfig::from_env();
    let mut sim = Simulator::with_config(&config).context("building simulator")?;
    let latency = Time::from_micros(latency_us);
    anyhow::ensure!(!latency.is_negative(), "latency must not be negative");

    let remote = sim.remote();
    let context = ContextId::new(context);
    let reader = FdReader::with_config(&config.reader);
    let stdin = std::io::stdin();

    let bytes = Arc::new(AtomicUsize::new(0));
    let chunks = Rc::new(Cell::new(0usize));
    let received = Arc::clone(&bytes);
    reader
        .start(&mut sim, stdin.as_raw_fd(), move |chunk| {
            let len = chunk.len();
            received.fetch_add(len, Ordering::Relaxed);
            let text = String::from_utf8_lossy(chunk).into_owned();
            if let Err(err) = remote.schedule_with_context(context, latency, move |sim| {
                debug!(len, now = %sim.now(), "Chunk delivered");
                print!("[{} {}] {}", sim.now(), sim.context(), text);
            }) {
                warn!(%err, "Dropping chunk");
            }
        })
        .context("starting stdin reader")?;

    let counted_chunks = Rc::clone(&chunks);
    sim.set_pre_event_hook(move |info| {
        if info.context == context {
            counted_chunks.set(counted_chunks.get() + 1);
        }
    });

    loop {
        sim.run()?;
        if reader.exit_reason().is_some() {
            // The reader pushes everything before it records its exit.
            sim.run()?;
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    println!();
    println!(
        "Relayed {} chunks ({} bytes), virtual time {} ({:?})",
        chunks.get(),
        bytes.load(Ordering::Relaxed),
        sim.now(),
        reader.exit_reason()
    );
    sim.destroy()?;
    Ok(())
}

/// Prints the configuration as JSON.
///
/// # Errors
/// - `serde_json::Error` - Serialization failed
pub fn show_config() -> anyhow::Result<()> {
    let config = KernelConfig::from_env();
    config.validate()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> Rc<RefCell<ChaCha8Rng>> {
        Rc::new(RefCell::new(ChaCha8Rng::seed_from_u64(7)))
    }

    #[test]
    fn test_hold_dispatches_requested_events() {
        let mut sim = Simulator::new();
        let left = Rc::new(Cell::new(25));
        for _ in 0..4 {
            hold(&mut sim, rng(), Rc::clone(&left));
        }
        sim.run().unwrap();

        assert_eq!(left.get(), 0);
        assert_eq!(sim.event_count(), 25);
    }

    #[test]
    fn test_hold_on_destroyed_simulator_is_not_fatal() {
        let mut sim = Simulator::new();
        sim.destroy().unwrap();
        let left = Rc::new(Cell::new(3));

        hold(&mut sim, rng(), Rc::clone(&left));

        assert_eq!(left.get(), 2);
        assert_eq!(sim.pending_events(), 0);
    }
}
