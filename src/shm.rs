//! Low-level POSIX shared memory operations

use crate::error::{ChannelError, Result};
use rustix::fd::OwnedFd;
use rustix::fs::ftruncate;
use rustix::io::Errno;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use rustix::shm::{shm_open, shm_unlink, Mode, ShmOFlags};
use std::ffi::CString;
use std::ptr::NonNull;

/// Handle to a mapped shared memory object
pub struct SharedRegion {
    #[allow(dead_code)]
    fd: OwnedFd,
    addr: NonNull<u8>,
    size: usize,
    name: CString,
    is_owner: bool,
    released: bool,
}

// SAFETY: the mapping is plain memory; every cross-process access to it is
// ordered by the channel semaphores.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Exclusively create and map a new shared memory object.
    ///
    /// Fails with [`ChannelError::AlreadyExists`] if an object with this name
    /// is left over from an earlier run. The region is zero-filled.
    pub fn create(name: &str, size: usize) -> Result<Self> {
        let c_name = c_name(name)?;

        let fd = match shm_open(
            c_name.as_c_str(),
            ShmOFlags::CREATE | ShmOFlags::EXCL | ShmOFlags::RDWR,
            Mode::RUSR | Mode::WUSR,
        ) {
            Ok(fd) => fd,
            Err(Errno::EXIST) => {
                return Err(ChannelError::AlreadyExists {
                    name: name.to_string(),
                })
            }
            Err(e) => {
                return Err(ChannelError::ShmCreate {
                    name: name.to_string(),
                    source: e.into(),
                })
            }
        };

        // From here on a failure must not leave the object behind.
        let unlink_on_err = |err: ChannelError| {
            let _ = shm_unlink(c_name.as_c_str());
            err
        };

        ftruncate(&fd, size as u64).map_err(|e| unlink_on_err(ChannelError::Truncate(e.into())))?;
        let addr = map(&fd, size).map_err(unlink_on_err)?;

        unsafe {
            std::ptr::write_bytes(addr.as_ptr(), 0, size);
        }

        log::debug!("created shared memory {} ({} bytes)", name, size);

        Ok(Self {
            fd,
            addr,
            size,
            name: c_name,
            is_owner: true,
            released: false,
        })
    }

    /// Open and map an existing shared memory object.
    ///
    /// A missing object is reported as [`ChannelError::ShmOpen`] with
    /// `io::ErrorKind::NotFound`.
    pub fn open(name: &str) -> Result<Self> {
        let c_name = c_name(name)?;

        let fd = shm_open(c_name.as_c_str(), ShmOFlags::RDWR, Mode::empty()).map_err(|e| {
            ChannelError::ShmOpen {
                name: name.to_string(),
                source: e.into(),
            }
        })?;

        let stat = rustix::fs::fstat(&fd).map_err(|e| ChannelError::ShmOpen {
            name: name.to_string(),
            source: e.into(),
        })?;
        let size = stat.st_size as usize;

        // The owner has created the object but not sized it yet.
        if size == 0 {
            return Err(ChannelError::ShmOpen {
                name: name.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }

        let addr = map(&fd, size)?;

        Ok(Self {
            fd,
            addr,
            size,
            name: c_name,
            is_owner: false,
            released: false,
        })
    }

    /// Get raw pointer to shared memory
    #[inline(always)]
    pub fn as_ptr(&self) -> *mut u8 {
        self.addr.as_ptr()
    }

    /// Get the mapping address
    #[inline(always)]
    pub fn as_non_null(&self) -> NonNull<u8> {
        self.addr
    }

    /// Get size of shared memory region
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the name of shared memory
    pub fn name(&self) -> &str {
        self.name.to_str().unwrap_or_default()
    }

    /// Check if this handle owns the shared memory
    #[inline(always)]
    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    /// Unmap the region and, for the owner, unlink its name.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let unmapped = unsafe { munmap(self.addr.as_ptr().cast(), self.size) }
            .map_err(|e| ChannelError::Munmap(e.into()));

        let unlinked = if self.is_owner {
            shm_unlink(self.name.as_c_str()).map_err(|e| ChannelError::ShmUnlink {
                name: self.name().to_string(),
                source: e.into(),
            })
        } else {
            Ok(())
        };

        unmapped.and(unlinked)
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("releasing shared memory {}: {}", self.name(), e);
        }
    }
}

fn c_name(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| ChannelError::InvalidName(name.to_string()))
}

fn map(fd: &OwnedFd, size: usize) -> Result<NonNull<u8>> {
    let addr = unsafe {
        mmap(
            std::ptr::null_mut(),
            size,
            ProtFlags::READ | ProtFlags::WRITE,
            MapFlags::SHARED,
            fd,
            0,
        )
        .map_err(|e| ChannelError::Mmap(e.into()))?
    };

    NonNull::new(addr.cast::<u8>())
        .ok_or_else(|| ChannelError::Mmap(std::io::Error::from(std::io::ErrorKind::AddrNotAvailable)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(tag: &str) -> String {
        format!("/tricolor_test_shm_{}_{}", std::process::id(), tag)
    }

    #[test]
    fn test_create_and_open() {
        let name = unique("create_open");
        let size = 4096;

        let shm1 = SharedRegion::create(&name, size).unwrap();
        assert!(shm1.is_owner());
        assert_eq!(shm1.size(), size);

        unsafe {
            std::ptr::write(shm1.as_ptr(), 42u8);
        }

        // Open from another "process"
        let shm2 = SharedRegion::open(&name).unwrap();
        assert!(!shm2.is_owner());
        assert_eq!(shm2.size(), size);

        let val = unsafe { std::ptr::read(shm2.as_ptr()) };
        assert_eq!(val, 42u8);

        shm2.close().unwrap();
        shm1.close().unwrap();
    }

    #[test]
    fn second_create_fails_without_touching_the_first() {
        let name = unique("twice");
        let shm = SharedRegion::create(&name, 64).unwrap();
        unsafe {
            std::ptr::write(shm.as_ptr(), 7u8);
        }

        match SharedRegion::create(&name, 64) {
            Err(ChannelError::AlreadyExists { name: n }) => assert_eq!(n, name),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("second create must fail"),
        }

        let val = unsafe { std::ptr::read(shm.as_ptr()) };
        assert_eq!(val, 7u8);
        shm.close().unwrap();
    }

    #[test]
    fn open_missing_is_not_found() {
        let err = SharedRegion::open(&unique("missing")).err().unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn owner_close_unlinks_name() {
        let name = unique("unlink");
        SharedRegion::create(&name, 64).unwrap().close().unwrap();
        assert!(SharedRegion::open(&name).err().unwrap().is_not_found());

        // The name is free for reuse.
        SharedRegion::create(&name, 64).unwrap().close().unwrap();
    }

    #[test]
    fn client_close_keeps_name() {
        let name = unique("client_close");
        let owner = SharedRegion::create(&name, 64).unwrap();
        SharedRegion::open(&name).unwrap().close().unwrap();
        SharedRegion::open(&name).unwrap().close().unwrap();
        owner.close().unwrap();
    }
}
