//! Eventide CLI - drives the simulation kernel from the command line.

mod commands;

use clap::Parser;
use eventide_core::tracing_setup::{CliLogLevel, ComponentLevels, init_tracing};

#[derive(Parser)]
#[command(name = "eventide")]
#[command(about = "A discrete-event simulation kernel")]
struct Cli {
    /// Console log level (the run log always captures everything)
    #[arg(long, value_enum, default_value_t = CliLogLevel::Warn)]
    log_level: CliLogLevel,

    /// Console log level for the simulator run loop and event dispatch
    #[arg(long, value_enum)]
    dispatch_log_level: Option<CliLogLevel>,

    /// Console log level for background descriptor readers
    #[arg(long, value_enum)]
    reader_log_level: Option<CliLogLevel>,

    #[command(subcommand)]
    command: commands::Commands,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let components = ComponentLevels {
        dispatch: cli.dispatch_log_level.map(CliLogLevel::as_tracing_level),
        readers: cli.reader_log_level.map(CliLogLevel::as_tracing_level),
    };
    init_tracing(cli.log_level.as_tracing_level(), components, None)
        .map_err(|err| anyhow::anyhow!("failed to initialize tracing: {err}"))?;

    commands::handle_command(cli.command)
}
