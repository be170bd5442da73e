//! TricolorIPC - shared memory search for minimal 3-coloring edge removals
//!
//! Any number of generator processes color a graph at random and push the
//! conflicting edges into a fixed-capacity ring in POSIX shared memory. One
//! supervisor process drains the ring, keeps the best result and tells the
//! generators to stop.
//!
//! # Architecture
//!
//! - **Owner (Supervisor)**: creates and destroys the shared region and
//!   semaphores, pops solutions, drives termination
//! - **Clients (Generators)**: attach, push solutions, poll the termination
//!   flag
//!
//! # Synchronization
//!
//! - free-slots / items-available counting semaphores bound the ring
//! - a binary single-writer semaphore serializes producers at commit

pub mod error;
pub mod shm;
pub mod semaphore;
pub mod solution;
pub mod ring;
pub mod channel;
pub mod signals;
pub mod search;
pub mod roles;

pub use error::{ChannelError, ParseEdgeError, Result};
pub use channel::{Attach, ChannelNames, ClientChannel, ClientState, OwnerChannel, OwnerState};
pub use ring::{Push, CAPACITY};
pub use solution::{Edge, Solution, MAX_EDGES};
pub use search::ColoringSearch;
pub use signals::StopSignal;
pub use roles::{run_consumer, run_producer, BestSolution, StopReason, Verdict, SUCCESS_LINE};
