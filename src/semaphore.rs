//! Named POSIX counting semaphores
//!
//! Thin wrapper over `sem_open(3)` and friends. rustix deliberately leaves
//! named semaphores out, so this goes through `libc`.

use crate::error::{ChannelError, Result};
use std::ffi::CString;
use std::io;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};

/// A named semaphore shared between processes
pub struct NamedSemaphore {
    sem: NonNull<libc::sem_t>,
    name: CString,
    is_owner: bool,
    released: bool,
}

// SAFETY: sem_wait/sem_post are thread-safe on a valid handle, and the handle
// stays valid until `close`/drop.
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

impl NamedSemaphore {
    /// Exclusively create a semaphore with `initial` permits.
    pub fn create(name: &str, initial: u32) -> Result<Self> {
        let c_name = c_name(name)?;
        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o600 as libc::c_uint,
                initial as libc::c_uint,
            )
        };

        if sem == libc::SEM_FAILED {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EEXIST) {
                return Err(ChannelError::AlreadyExists {
                    name: name.to_string(),
                });
            }
            return Err(ChannelError::SemOpen {
                name: name.to_string(),
                source: err,
            });
        }

        log::debug!("created semaphore {} = {}", name, initial);
        Self::from_raw(sem, c_name, true)
    }

    /// Open a semaphore that another process created.
    pub fn open(name: &str) -> Result<Self> {
        let c_name = c_name(name)?;
        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };

        if sem == libc::SEM_FAILED {
            return Err(ChannelError::SemOpen {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }

        Self::from_raw(sem, c_name, false)
    }

    fn from_raw(sem: *mut libc::sem_t, name: CString, is_owner: bool) -> Result<Self> {
        let sem = NonNull::new(sem).ok_or_else(|| ChannelError::SemOpen {
            name: name.to_string_lossy().into_owned(),
            source: io::Error::from(io::ErrorKind::InvalidInput),
        })?;
        Ok(Self {
            sem,
            name,
            is_owner,
            released: false,
        })
    }

    /// Acquire one permit, blocking. `EINTR` is retried.
    pub fn wait(&self) -> io::Result<()> {
        loop {
            if unsafe { libc::sem_wait(self.sem.as_ptr()) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// Acquire one permit unless `stop` is raised.
    ///
    /// Returns `Ok(false)` once `stop` is observed, either before blocking or
    /// after a signal interrupted the wait.
    pub fn wait_unless(&self, stop: &AtomicBool) -> io::Result<bool> {
        loop {
            if stop.load(Ordering::Acquire) {
                return Ok(false);
            }
            if unsafe { libc::sem_wait(self.sem.as_ptr()) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// Release one permit.
    pub fn post(&self) -> io::Result<()> {
        if unsafe { libc::sem_post(self.sem.as_ptr()) } == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    /// Current number of available permits.
    pub fn value(&self) -> io::Result<i32> {
        let mut value: libc::c_int = 0;
        if unsafe { libc::sem_getvalue(self.sem.as_ptr(), &mut value) } == 0 {
            Ok(value.max(0))
        } else {
            Err(io::Error::last_os_error())
        }
    }

    /// Raw handle for async-signal-safe posting.
    pub(crate) fn as_ptr(&self) -> *mut libc::sem_t {
        self.sem.as_ptr()
    }

    pub fn name(&self) -> &str {
        self.name.to_str().unwrap_or_default()
    }

    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    /// Close the handle and, for the owner, unlink the name.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let closed = if unsafe { libc::sem_close(self.sem.as_ptr()) } == 0 {
            Ok(())
        } else {
            Err(ChannelError::SemClose {
                name: self.name().to_string(),
                source: io::Error::last_os_error(),
            })
        };

        let unlinked = if self.is_owner && unsafe { libc::sem_unlink(self.name.as_ptr()) } != 0 {
            Err(ChannelError::SemUnlink {
                name: self.name().to_string(),
                source: io::Error::last_os_error(),
            })
        } else {
            Ok(())
        };

        closed.and(unlinked)
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("releasing semaphore {}: {}", self.name(), e);
        }
    }
}

fn c_name(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| ChannelError::InvalidName(name.to_string()))
}
