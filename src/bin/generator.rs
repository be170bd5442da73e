//! Generator (client / producer)
//!
//! Attaches to a running supervisor and feeds it random 3-coloring removal
//! sets until told to stop. Exits quietly with a failure status if no
//! supervisor is running.

use clap::Parser;
use std::process::ExitCode;
use tricolor_ipc::{run_producer, Attach, ChannelNames, ClientChannel, ColoringSearch, Edge, Result};

/// Proposes edge removal sets that make a graph 3-colorable.
///
/// Resource names are derived from TRICOLOR_NAMESPACE (default "tricolor").
#[derive(Parser)]
#[command(name = "generator", version)]
struct Cli {
    /// Graph edges, each two node ids joined by '-', e.g. 0-1 1-2 2-0
    #[arg(value_name = "EDGE", required = true, allow_hyphen_values = true)]
    edges: Vec<Edge>,
}

fn main() -> ExitCode {
    env_logger::init();
    // Malformed edges are rejected here, before any shared resource is opened.
    let cli = Cli::parse();

    match run(cli.edges) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("generator: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` if no supervisor was ready.
fn run(edges: Vec<Edge>) -> Result<bool> {
    let names = ChannelNames::from_env()?;
    let client = match ClientChannel::attach(&names)? {
        Attach::Ready(client) => client,
        Attach::NotReady => {
            log::debug!("no supervisor at {}", names.shm);
            return Ok(false);
        }
    };

    let mut search = ColoringSearch::from_entropy(edges);
    let outcome = run_producer(&client, &mut search);
    let released = client.release();
    let stored = outcome?;
    released?;

    log::info!("generator finished after {} solutions", stored);
    Ok(true)
}
