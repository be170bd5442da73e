//! Bounded circular buffer in shared memory
//!
//! Many producers, one consumer, guarded by three counting semaphores:
//!
//! - **free-slots** (starts at [`CAPACITY`]): one permit per empty slot
//! - **items-available** (starts at 0): one permit per stored solution
//! - **single-writer** (starts at 1): serializes the commit step
//!
//! # Push
//! writer permit -> free-slot permit -> copy into `slots[write_pos]` ->
//! advance `write_pos` -> post items-available -> post writer.
//!
//! # Pop
//! items-available permit -> copy out of `slots[read_pos]` -> advance
//! `read_pos` -> post free-slots.
//!
//! # Termination
//! The owner raises the shared flag and posts a single free-slot permit. A
//! producer that acquires a free-slot permit while the flag is raised stores
//! nothing, posts the permit back and releases the writer permit, so the next
//! blocked producer wakes the same way.

use crate::error::{ChannelError, Result};
use crate::semaphore::NamedSemaphore;
use crate::solution::Solution;
use std::ptr::{self, addr_of, addr_of_mut, NonNull};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Number of slots in the ring
pub const CAPACITY: usize = 8;

/// Magic number for layout validation
const RING_MAGIC: u32 = 0x33434F4C; // "3COL"
const RING_VERSION: u32 = 1;

/// Ring header and slots, placed at the start of the shared region
#[repr(C)]
pub struct RingLayout {
    /// Written last by the owner; zero means "not initialized yet"
    magic: AtomicU32,
    version: u32,
    capacity: u32,
    /// Only touched while holding the writer permit
    write_pos: u32,
    /// Only touched by the consumer
    read_pos: u32,
    /// Non-zero once the owner is stopping
    terminate: AtomicU32,
    slots: [Solution; CAPACITY],
}

impl RingLayout {
    /// Bytes needed in the shared region
    pub const fn size() -> usize {
        std::mem::size_of::<RingLayout>()
    }

    /// Initialize a zeroed layout and publish it.
    ///
    /// # Safety
    /// `ptr` must be valid for writes of `RingLayout::size()` bytes, suitably
    /// aligned, and not yet visible to any producer.
    pub unsafe fn init(ptr: *mut Self) {
        addr_of_mut!((*ptr).version).write(RING_VERSION);
        addr_of_mut!((*ptr).capacity).write(CAPACITY as u32);
        addr_of_mut!((*ptr).write_pos).write(0);
        addr_of_mut!((*ptr).read_pos).write(0);
        addr_of_mut!((*ptr).terminate).write(AtomicU32::new(0));
        for i in 0..CAPACITY {
            addr_of_mut!((*ptr).slots)
                .cast::<Solution>()
                .add(i)
                .write(Solution::EMPTY);
        }
        (*addr_of!((*ptr).magic)).store(RING_MAGIC, Ordering::Release);
    }

    /// Check whether the owner has finished laying out the region.
    ///
    /// Returns `Ok(false)` while the magic is still zero.
    ///
    /// # Safety
    /// `ptr` must be valid for reads of `RingLayout::size()` bytes.
    pub unsafe fn validate(ptr: *const Self) -> Result<bool> {
        let magic = (*addr_of!((*ptr).magic)).load(Ordering::Acquire);
        if magic == 0 {
            return Ok(false);
        }
        if magic != RING_MAGIC {
            return Err(ChannelError::InvalidMagic {
                expected: RING_MAGIC,
                got: magic,
            });
        }
        let version = addr_of!((*ptr).version).read();
        if version != RING_VERSION {
            return Err(ChannelError::VersionMismatch {
                expected: RING_VERSION,
                got: version,
            });
        }
        Ok(true)
    }
}

/// The synchronization triple
pub struct Semaphores {
    pub(crate) free: NamedSemaphore,
    pub(crate) items: NamedSemaphore,
    pub(crate) writer: NamedSemaphore,
}

impl Semaphores {
    /// Exclusively create all three semaphores with their initial counts.
    ///
    /// Semaphores created before a failing step are unlinked again when
    /// dropped.
    pub fn create(free: &str, items: &str, writer: &str) -> Result<Self> {
        Ok(Self {
            free: NamedSemaphore::create(free, CAPACITY as u32)?,
            items: NamedSemaphore::create(items, 0)?,
            writer: NamedSemaphore::create(writer, 1)?,
        })
    }

    /// Open semaphores created by the owner.
    pub fn open(free: &str, items: &str, writer: &str) -> Result<Self> {
        Ok(Self {
            free: NamedSemaphore::open(free)?,
            items: NamedSemaphore::open(items)?,
            writer: NamedSemaphore::open(writer)?,
        })
    }

    /// Close all three, unlinking them if they were created here.
    pub fn close(self) -> Result<()> {
        let free = self.free.close();
        let items = self.items.close();
        let writer = self.writer.close();
        free.and(items).and(writer)
    }
}

/// Outcome of [`Ring::push`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    /// The solution is in the ring
    Stored,
    /// The owner is stopping; nothing was stored
    Stopped,
}

/// View of a mapped ring plus its semaphores
pub struct Ring<'a> {
    layout: NonNull<RingLayout>,
    sems: &'a Semaphores,
}

// SAFETY: slot and cursor access is serialized by the semaphores; the
// termination flag is atomic.
unsafe impl Send for Ring<'_> {}
unsafe impl Sync for Ring<'_> {}

impl<'a> Ring<'a> {
    /// Create a ring view from raw parts
    ///
    /// # Safety
    /// `layout` must point to an initialized `RingLayout` that outlives `'a`,
    /// and `sems` must be the semaphores guarding that layout.
    pub unsafe fn from_raw(layout: NonNull<RingLayout>, sems: &'a Semaphores) -> Self {
        Self { layout, sems }
    }

    fn terminate_flag(&self) -> &AtomicU32 {
        unsafe { &*addr_of!((*self.layout.as_ptr()).terminate) }
    }

    /// Whether the owner has raised the termination flag
    #[inline]
    pub fn is_terminating(&self) -> bool {
        self.terminate_flag().load(Ordering::Acquire) != 0
    }

    /// Raise the termination flag. Returns `true` if it was not raised before.
    pub(crate) fn raise_termination(&self) -> bool {
        self.terminate_flag().swap(1, Ordering::AcqRel) == 0
    }

    /// Post one free-slot permit so a blocked producer wakes up.
    pub(crate) fn wake_producer(&self) -> Result<()> {
        post(&self.sems.free, "free-slots")
    }

    /// Number of stored, unread solutions
    pub fn len(&self) -> Result<usize> {
        self.sems
            .items
            .value()
            .map(|v| v as usize)
            .map_err(|source| ChannelError::SemValue {
                role: "items-available",
                source,
            })
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|n| n == 0)
    }

    /// Store a solution, blocking while the ring is full.
    pub fn push(&self, solution: &Solution) -> Result<Push> {
        if !self.acquire(&self.sems.writer, "single-writer")? {
            return Ok(Push::Stopped);
        }

        if !self.acquire(&self.sems.free, "free-slots")? {
            post(&self.sems.writer, "single-writer")?;
            return Ok(Push::Stopped);
        }

        if self.is_terminating() {
            // Pass the wake-up on instead of consuming it.
            post(&self.sems.free, "free-slots")?;
            post(&self.sems.writer, "single-writer")?;
            return Ok(Push::Stopped);
        }

        unsafe {
            let layout = self.layout.as_ptr();
            let pos = addr_of!((*layout).write_pos).read() as usize % CAPACITY;
            addr_of_mut!((*layout).slots)
                .cast::<Solution>()
                .add(pos)
                .write(*solution);
            addr_of_mut!((*layout).write_pos).write(((pos + 1) % CAPACITY) as u32);
        }

        post(&self.sems.items, "items-available")?;
        post(&self.sems.writer, "single-writer")?;
        Ok(Push::Stored)
    }

    /// Take the oldest solution, blocking while the ring is empty.
    pub fn pop(&self) -> Result<Solution> {
        self.sems
            .items
            .wait()
            .map_err(|source| ChannelError::SemWait {
                role: "items-available",
                source,
            })?;
        self.take()
    }

    /// Like [`pop`](Self::pop), but gives up with `None` once `stop` is
    /// raised.
    pub fn pop_unless(&self, stop: &AtomicBool) -> Result<Option<Solution>> {
        let acquired = self
            .sems
            .items
            .wait_unless(stop)
            .map_err(|source| ChannelError::SemWait {
                role: "items-available",
                source,
            })?;

        // A permit posted by the stop handler carries no solution.
        if !acquired || stop.load(Ordering::Acquire) {
            return Ok(None);
        }
        self.take().map(Some)
    }

    fn take(&self) -> Result<Solution> {
        let solution = unsafe {
            let layout = self.layout.as_ptr();
            let pos = addr_of!((*layout).read_pos).read() as usize % CAPACITY;
            let solution = ptr::read(addr_of!((*layout).slots).cast::<Solution>().add(pos));
            addr_of_mut!((*layout).read_pos).write(((pos + 1) % CAPACITY) as u32);
            solution
        };
        post(&self.sems.free, "free-slots")?;
        Ok(solution)
    }

    /// Wait for a permit. A failure while the owner is stopping means the
    /// semaphores are going away and is reported as `Ok(false)`.
    fn acquire(&self, sem: &NamedSemaphore, role: &'static str) -> Result<bool> {
        match sem.wait() {
            Ok(()) => Ok(true),
            Err(e) if self.is_terminating() => {
                log::warn!("{} wait failed during shutdown, stopping: {}", role, e);
                Ok(false)
            }
            Err(source) => Err(ChannelError::SemWait { role, source }),
        }
    }
}

fn post(sem: &NamedSemaphore, role: &'static str) -> Result<()> {
    sem.post()
        .map_err(|source| ChannelError::SemPost { role, source })
}
