//! Supervisor (owner / consumer)
//!
//! Creates the channel, prints every improving solution and stops all
//! generators once the graph turns out to be 3-colorable or on SIGINT/SIGTERM.

use clap::Parser;
use std::io;
use std::process::ExitCode;
use tricolor_ipc::{run_consumer, ChannelError, ChannelNames, OwnerChannel, Result, StopSignal};

/// Collects solutions from generators and reports the best one.
///
/// Resource names are derived from TRICOLOR_NAMESPACE (default "tricolor").
#[derive(Parser)]
#[command(name = "supervisor", version)]
struct Cli {}

fn main() -> ExitCode {
    env_logger::init();
    let _cli = Cli::parse();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("supervisor: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let names = ChannelNames::from_env()?;
    let stop = StopSignal::install().map_err(ChannelError::Signal)?;
    let owner = OwnerChannel::create(&names)?;

    let outcome = {
        let _wake = stop.arm(&owner);
        let stdout = io::stdout();
        run_consumer(&owner, stop.flag(), &mut stdout.lock())
    };

    let released = owner.release();
    let reason = outcome?;
    released?;

    log::info!("supervisor finished: {:?}", reason);
    Ok(())
}
