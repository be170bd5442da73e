//! Producer and consumer loops
//!
//! The consumer runs in the owner process, the producers in the generator
//! processes. Both only talk through the channel.

use crate::channel::{ClientChannel, OwnerChannel};
use crate::error::{ChannelError, Result};
use crate::ring::Push;
use crate::search::ColoringSearch;
use crate::solution::{Solution, MAX_EDGES};
use rand::Rng;
use std::io::Write;
use std::sync::atomic::AtomicBool;

/// Line printed when a zero-edge solution arrives
pub const SUCCESS_LINE: &str = "The graph is 3-colorable!";

/// How an offered solution compares to the best one so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Zero edges: nothing can beat it
    Optimal,
    /// Strictly fewer edges than the previous best
    Improved,
    NotBetter,
}

/// Best solution seen by the consumer
///
/// Starts from a `MAX_EDGES` baseline, so a full solution never counts as an
/// improvement.
#[derive(Debug)]
pub struct BestSolution {
    best: Option<Solution>,
    best_len: usize,
}

impl Default for BestSolution {
    fn default() -> Self {
        Self {
            best: None,
            best_len: MAX_EDGES,
        }
    }
}

impl BestSolution {
    pub fn offer(&mut self, solution: Solution) -> Verdict {
        let len = solution.len();
        if len >= self.best_len {
            return Verdict::NotBetter;
        }
        self.best = Some(solution);
        self.best_len = len;
        if solution.is_optimal() {
            Verdict::Optimal
        } else {
            Verdict::Improved
        }
    }

    pub fn best(&self) -> Option<&Solution> {
        self.best.as_ref()
    }
}

/// Why the consumer stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A zero-edge solution arrived
    Optimal,
    /// `stop` was raised from outside
    Interrupted,
}

/// Drain the channel, report every improvement to `out` and finally tell
/// all producers to stop.
///
/// Termination is requested even if consuming failed.
pub fn run_consumer<W: Write>(
    owner: &OwnerChannel,
    stop: &AtomicBool,
    out: &mut W,
) -> Result<StopReason> {
    let outcome = consume(owner, stop, out);
    let terminated = owner.request_termination();
    let reason = outcome?;
    terminated?;
    Ok(reason)
}

fn consume<W: Write>(owner: &OwnerChannel, stop: &AtomicBool, out: &mut W) -> Result<StopReason> {
    let mut best = BestSolution::default();

    loop {
        let Some(solution) = owner.pop_unless(stop)? else {
            log::debug!("stop requested");
            return Ok(StopReason::Interrupted);
        };

        match best.offer(solution) {
            Verdict::Optimal => {
                writeln!(out, "{SUCCESS_LINE}").map_err(ChannelError::Output)?;
                out.flush().map_err(ChannelError::Output)?;
                return Ok(StopReason::Optimal);
            }
            Verdict::Improved => {
                writeln!(out, "Solution with {} edges: {}", solution.len(), solution)
                    .map_err(ChannelError::Output)?;
                out.flush().map_err(ChannelError::Output)?;
            }
            Verdict::NotBetter => {}
        }
    }
}

/// Push candidates until the owner asks to stop. Returns how many were
/// stored.
pub fn run_producer<R: Rng>(client: &ClientChannel, search: &mut ColoringSearch<R>) -> Result<u64> {
    let mut stored = 0;

    while !client.should_stop() {
        let Some(candidate) = search.next_candidate() else {
            continue;
        };
        match client.push(&candidate)? {
            Push::Stored => stored += 1,
            Push::Stopped => break,
        }
    }

    log::debug!("producer stopping after {} solutions", stored);
    Ok(stored)
}
