//! External stop requests (SIGINT / SIGTERM) for the owner process
//!
//! The handler only stores an atomic flag and posts the owner's
//! items-available semaphore, both async-signal-safe. Everything else happens
//! on the normal path once the blocked `pop` has returned.

use crate::channel::OwnerChannel;
use std::io;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

static STOP: AtomicBool = AtomicBool::new(false);
static WAKE: AtomicPtr<libc::sem_t> = AtomicPtr::new(ptr::null_mut());

extern "C" fn on_stop_signal(_sig: libc::c_int) {
    STOP.store(true, Ordering::SeqCst);
    let sem = WAKE.load(Ordering::SeqCst);
    if !sem.is_null() {
        // SAFETY: `WAKE` is cleared before the semaphore is closed.
        unsafe {
            libc::sem_post(sem);
        }
    }
}

/// Process-wide stop flag fed by SIGINT and SIGTERM
pub struct StopSignal {
    _private: (),
}

impl StopSignal {
    /// Register the handler for SIGINT and SIGTERM.
    ///
    /// `SA_RESTART` is left unset so a blocked `sem_wait` returns
    /// with `EINTR`.
    pub fn install() -> io::Result<Self> {
        for sig in [libc::SIGINT, libc::SIGTERM] {
            unsafe {
                let mut action: libc::sigaction = std::mem::zeroed();
                action.sa_sigaction = on_stop_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
                action.sa_flags = 0;
                if libc::sigemptyset(&mut action.sa_mask) != 0 {
                    return Err(io::Error::last_os_error());
                }
                if libc::sigaction(sig, &action, ptr::null_mut()) != 0 {
                    return Err(io::Error::last_os_error());
                }
            }
        }
        Ok(Self { _private: () })
    }

    /// Let the handler wake `owner` out of a blocked `pop`.
    ///
    /// The returned guard must be dropped before the owner is released.
    pub fn arm<'a>(&self, owner: &'a OwnerChannel) -> WakeGuard<'a> {
        WAKE.store(owner.wake_handle(), Ordering::SeqCst);
        WakeGuard {
            _owner: PhantomData,
        }
    }

    /// The flag to pass to `pop_unless`
    pub fn flag(&self) -> &'static AtomicBool {
        &STOP
    }

    pub fn is_raised(&self) -> bool {
        STOP.load(Ordering::SeqCst)
    }
}

/// Keeps the handler pointed at an owner's semaphore
pub struct WakeGuard<'a> {
    _owner: PhantomData<&'a OwnerChannel>,
}

impl Drop for WakeGuard<'_> {
    fn drop(&mut self) {
        WAKE.store(ptr::null_mut(), Ordering::SeqCst);
    }
}
