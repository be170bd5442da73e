//! High-level Channel API for TricolorIPC
//!
//! The supervisor process owns the channel: it creates the shared region and
//! the semaphores, consumes solutions and finally destroys everything.
//! Generator processes attach as clients and only ever detach.

use crate::error::{ChannelError, Result};
use crate::ring::{Push, Ring, RingLayout, Semaphores};
use crate::shm::SharedRegion;
use crate::solution::Solution;
use std::sync::atomic::AtomicBool;

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "tricolor";

/// Environment variable selecting an alternative namespace
pub const NAMESPACE_ENV: &str = "TRICOLOR_NAMESPACE";

const MAX_NAMESPACE_LEN: usize = 200;

/// Names of the four shared resources making up one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNames {
    pub shm: String,
    pub free: String,
    pub items: String,
    pub writer: String,
}

impl ChannelNames {
    /// Derive the resource names for `namespace`.
    pub fn namespaced(namespace: &str) -> Result<Self> {
        if namespace.len() > MAX_NAMESPACE_LEN {
            return Err(ChannelError::NamespaceTooLong {
                max: MAX_NAMESPACE_LEN,
                got: namespace.len(),
            });
        }
        let valid = !namespace.is_empty()
            && namespace
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid {
            return Err(ChannelError::InvalidName(namespace.to_string()));
        }

        Ok(Self {
            shm: format!("/{namespace}_ring"),
            free: format!("/{namespace}_free"),
            items: format!("/{namespace}_used"),
            writer: format!("/{namespace}_write"),
        })
    }

    /// Names for the namespace in `TRICOLOR_NAMESPACE`, or the well-known
    /// defaults when it is unset or empty.
    pub fn from_env() -> Result<Self> {
        match std::env::var(NAMESPACE_ENV) {
            Ok(ns) if !ns.is_empty() => Self::namespaced(&ns),
            _ => Ok(Self::default()),
        }
    }
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self {
            shm: format!("/{DEFAULT_NAMESPACE}_ring"),
            free: format!("/{DEFAULT_NAMESPACE}_free"),
            items: format!("/{DEFAULT_NAMESPACE}_used"),
            writer: format!("/{DEFAULT_NAMESPACE}_write"),
        }
    }
}

/// Owner lifecycle. Releasing the channel is the final `Stopped` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerState {
    Running,
    Stopping,
}

/// Owner (consumer) side of the channel
pub struct OwnerChannel {
    region: SharedRegion,
    sems: Semaphores,
    names: ChannelNames,
}

impl OwnerChannel {
    /// Exclusively create the shared region and semaphores.
    ///
    /// Fails with [`ChannelError::AlreadyExists`] if any of them survived an
    /// earlier run. Resources created by this call are removed again on
    /// failure; pre-existing ones are left alone.
    pub fn create(names: &ChannelNames) -> Result<Self> {
        let region = SharedRegion::create(&names.shm, RingLayout::size())?;
        let sems = Semaphores::create(&names.free, &names.items, &names.writer)?;

        // Publishing the layout last makes a client see either nothing or a
        // complete channel.
        unsafe { RingLayout::init(region.as_ptr().cast()) };

        log::info!("channel {} created", names.shm);
        Ok(Self {
            region,
            sems,
            names: names.clone(),
        })
    }

    fn ring(&self) -> Ring<'_> {
        // SAFETY: the region was sized and initialized in `create` and lives
        // as long as `self`.
        unsafe { Ring::from_raw(self.region.as_non_null().cast(), &self.sems) }
    }

    /// Take the oldest solution, blocking while the channel is empty.
    pub fn pop(&self) -> Result<Solution> {
        self.ring().pop()
    }

    /// Take the oldest solution unless `stop` is raised first.
    pub fn pop_unless(&self, stop: &AtomicBool) -> Result<Option<Solution>> {
        self.ring().pop_unless(stop)
    }

    /// Number of unread solutions
    pub fn len(&self) -> Result<usize> {
        self.ring().len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.ring().is_empty()
    }

    pub fn state(&self) -> OwnerState {
        if self.ring().is_terminating() {
            OwnerState::Stopping
        } else {
            OwnerState::Running
        }
    }

    /// Tell every producer to stop.
    ///
    /// Raises the shared flag and posts one free-slot permit; producers blocked
    /// in `push` pass that permit along. Calling this again is a no-op.
    pub fn request_termination(&self) -> Result<()> {
        let ring = self.ring();
        if ring.raise_termination() {
            log::debug!("channel {} stopping", self.names.shm);
            ring.wake_producer()?;
        }
        Ok(())
    }

    pub fn names(&self) -> &ChannelNames {
        &self.names
    }

    /// Items-available semaphore, posted by the stop signal handler.
    pub(crate) fn wake_handle(&self) -> *mut libc::sem_t {
        self.sems.items.as_ptr()
    }

    /// Detach and destroy the region and all semaphores.
    pub fn release(self) -> Result<()> {
        let region = self.region.close();
        let sems = self.sems.close();
        log::info!("channel {} released", self.names.shm);
        region.and(sems)
    }
}

/// Result of [`ClientChannel::attach`]
pub enum Attach {
    Ready(ClientChannel),
    /// The owner has not created the channel (yet)
    NotReady,
}

/// Client lifecycle. Releasing the channel is the final `Exited` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Attached,
    StopRequested,
}

/// Client (producer) side of the channel
pub struct ClientChannel {
    region: SharedRegion,
    sems: Semaphores,
}

impl ClientChannel {
    /// Attach to a channel created by an owner.
    ///
    /// Returns [`Attach::NotReady`] if the owner has not finished creating
    /// it; any other failure is an error.
    pub fn attach(names: &ChannelNames) -> Result<Attach> {
        let region = match SharedRegion::open(&names.shm) {
            Ok(region) => region,
            Err(e) if e.is_not_found() => return Ok(Attach::NotReady),
            Err(e) => return Err(e),
        };

        if region.size() < RingLayout::size() {
            return Ok(Attach::NotReady);
        }
        if !unsafe { RingLayout::validate(region.as_ptr().cast()) }? {
            return Ok(Attach::NotReady);
        }

        let sems = match Semaphores::open(&names.free, &names.items, &names.writer) {
            Ok(sems) => sems,
            Err(e) if e.is_not_found() => return Ok(Attach::NotReady),
            Err(e) => return Err(e),
        };

        log::debug!("attached to channel {}", names.shm);
        Ok(Attach::Ready(Self { region, sems }))
    }

    fn ring(&self) -> Ring<'_> {
        // SAFETY: `attach` checked size and layout; the mapping lives as long
        // as `self`.
        unsafe { Ring::from_raw(self.region.as_non_null().cast(), &self.sems) }
    }

    /// Store a solution, blocking while the channel is full.
    pub fn push(&self, solution: &Solution) -> Result<Push> {
        self.ring().push(solution)
    }

    /// Poll the shared termination flag.
    #[inline]
    pub fn should_stop(&self) -> bool {
        self.ring().is_terminating()
    }

    pub fn state(&self) -> ClientState {
        if self.should_stop() {
            ClientState::StopRequested
        } else {
            ClientState::Attached
        }
    }

    /// Detach. Never removes any shared resource.
    pub fn release(self) -> Result<()> {
        let region = self.region.close();
        let sems = self.sems.close();
        region.and(sems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::CAPACITY;
    use crate::semaphore::NamedSemaphore;
    use crate::solution::Edge;
    use std::thread;
    use std::time::Duration;

    fn names(tag: &str) -> ChannelNames {
        ChannelNames::namespaced(&format!("tricolor_test_{}_{}", std::process::id(), tag)).unwrap()
    }

    fn attach(names: &ChannelNames) -> ClientChannel {
        match ClientChannel::attach(names).unwrap() {
            Attach::Ready(client) => client,
            Attach::NotReady => panic!("owner should be ready"),
        }
    }

    fn edge(u: u32, v: u32) -> Solution {
        Solution::from_edges(&[Edge::new(u, v)]).unwrap()
    }

    #[test]
    fn namespace_validation() {
        let n = ChannelNames::namespaced("run-1").unwrap();
        assert_eq!(n.shm, "/run-1_ring");
        assert_eq!(n.free, "/run-1_free");
        assert_eq!(n.items, "/run-1_used");
        assert_eq!(n.writer, "/run-1_write");

        assert!(matches!(ChannelNames::namespaced(""), Err(ChannelError::InvalidName(_))));
        assert!(matches!(ChannelNames::namespaced("a/b"), Err(ChannelError::InvalidName(_))));
        assert!(matches!(
            ChannelNames::namespaced(&"x".repeat(MAX_NAMESPACE_LEN + 1)),
            Err(ChannelError::NamespaceTooLong { .. })
        ));
        assert_eq!(ChannelNames::default(), ChannelNames::namespaced(DEFAULT_NAMESPACE).unwrap());
    }

    #[test]
    fn attach_before_create_is_not_ready() {
        let names = names("not_ready");
        assert!(matches!(ClientChannel::attach(&names).unwrap(), Attach::NotReady));
    }

    #[test]
    fn attach_with_region_but_no_semaphores_is_not_ready() {
        let names = names("half_ready");
        let region = SharedRegion::create(&names.shm, RingLayout::size()).unwrap();
        unsafe { RingLayout::init(region.as_ptr().cast()) };

        assert!(matches!(ClientChannel::attach(&names).unwrap(), Attach::NotReady));
        region.close().unwrap();
    }

    #[test]
    fn test_channel_create_attach() {
        let names = names("create_attach");
        let owner = OwnerChannel::create(&names).unwrap();
        assert_eq!(owner.state(), OwnerState::Running);

        let client = attach(&names);
        assert_eq!(client.state(), ClientState::Attached);

        assert_eq!(client.push(&edge(0, 1)).unwrap(), Push::Stored);
        assert_eq!(owner.len().unwrap(), 1);
        assert_eq!(owner.pop().unwrap(), edge(0, 1));

        client.release().unwrap();
        owner.release().unwrap();
    }

    #[test]
    fn second_create_fails_and_leaves_first_intact() {
        let names = names("twice");
        let owner = OwnerChannel::create(&names).unwrap();
        let client = attach(&names);
        client.push(&edge(3, 4)).unwrap();

        assert!(matches!(
            OwnerChannel::create(&names),
            Err(ChannelError::AlreadyExists { .. })
        ));

        // Same data, same semaphores.
        assert_eq!(owner.pop().unwrap(), edge(3, 4));
        client.push(&edge(5, 6)).unwrap();
        assert_eq!(owner.pop().unwrap(), edge(5, 6));

        client.release().unwrap();
        owner.release().unwrap();
    }

    #[test]
    fn stale_semaphore_blocks_create_and_is_not_removed() {
        let names = names("stale_sem");
        let stale = NamedSemaphore::create(&names.writer, 1).unwrap();

        assert!(matches!(
            OwnerChannel::create(&names),
            Err(ChannelError::AlreadyExists { .. })
        ));

        // The failed create cleaned up what it made itself...
        assert!(SharedRegion::open(&names.shm).err().unwrap().is_not_found());
        assert!(NamedSemaphore::open(&names.free).err().unwrap().is_not_found());
        // ...but not the leftover.
        NamedSemaphore::open(&names.writer).unwrap().close().unwrap();

        stale.close().unwrap();
        OwnerChannel::create(&names).unwrap().release().unwrap();
    }

    #[test]
    fn release_frees_names_for_reuse() {
        let names = names("reuse");
        let owner = OwnerChannel::create(&names).unwrap();
        let client = attach(&names);

        client.release().unwrap();
        // A client release leaves the channel in place.
        attach(&names).release().unwrap();

        owner.release().unwrap();
        assert!(matches!(ClientChannel::attach(&names).unwrap(), Attach::NotReady));

        OwnerChannel::create(&names).unwrap().release().unwrap();
    }

    #[test]
    fn termination_is_visible_to_clients() {
        let names = names("terminate");
        let owner = OwnerChannel::create(&names).unwrap();
        let client = attach(&names);
        assert!(!client.should_stop());

        owner.request_termination().unwrap();
        owner.request_termination().unwrap();
        assert_eq!(owner.state(), OwnerState::Stopping);
        assert!(client.should_stop());
        assert_eq!(client.state(), ClientState::StopRequested);
        assert_eq!(client.push(&edge(1, 2)).unwrap(), Push::Stopped);
        assert!(owner.is_empty().unwrap());

        client.release().unwrap();
        owner.release().unwrap();
    }

    #[test]
    fn blocked_producers_all_exit_after_termination() {
        let names = names("blocked");
        let owner = OwnerChannel::create(&names).unwrap();

        let filler = attach(&names);
        for seq in 0..CAPACITY as u32 {
            filler.push(&edge(0, seq)).unwrap();
        }

        let producers: Vec<_> = (1..=4)
            .map(|p| {
                let names = names.clone();
                thread::spawn(move || {
                    let client = attach(&names);
                    let mut stored = 0;
                    while !client.should_stop() {
                        match client.push(&edge(p, stored)).unwrap() {
                            Push::Stored => stored += 1,
                            Push::Stopped => break,
                        }
                    }
                    client.release().unwrap();
                    stored
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        owner.request_termination().unwrap();

        for handle in producers {
            assert_eq!(handle.join().unwrap(), 0);
        }
        assert_eq!(owner.len().unwrap(), CAPACITY);

        filler.release().unwrap();
        owner.release().unwrap();
    }
}
