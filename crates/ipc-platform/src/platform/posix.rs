// SPDX-License-Identifier: MIT
//
// POSIX shared memory and named semaphore primitives. Layout and call
// sequence mirror cpp-ipc's `shm_posix.cpp`; the semaphore wrapper is new
// (the bridge needs a *named counting* semaphore for ping-pong signalling,
// which libipc itself builds out of a pthread mutex + condvar pair instead —
// `sem_open`/`sem_post`/`sem_timedwait` map onto the same OS facility more
// directly and are what the original C remoting layer uses).

use std::ffi::CString;
use std::io;
use std::ptr;
use std::time::Duration;

use crate::error::{PlatformError, WaitOutcome};
use crate::shm_name::os_name;

// ---------------------------------------------------------------------------
// PlatformShm
// ---------------------------------------------------------------------------

pub struct PlatformShm {
    mem: *mut u8,
    size: usize,
    name: String,
    owner: bool,
}

unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

impl PlatformShm {
    /// Create a brand-new shared region (the client's role, per §3
    /// "Ownership": the region is created and destroyed by the client).
    pub fn create(name: &str, size: usize) -> Result<Self, PlatformError> {
        Self::open_impl(name, size, true)
    }

    /// Join a region created by someone else (the server's role).
    pub fn join(name: &str, size: usize) -> Result<Self, PlatformError> {
        Self::open_impl(name, size, false)
    }

    fn open_impl(name: &str, size: usize, create: bool) -> Result<Self, PlatformError> {
        let posix_name = os_name(name);
        let c_name = CString::new(posix_name.clone())
            .map_err(|e| PlatformError::ShmCreate {
                name: name.to_string(),
                size,
                source: io::Error::new(io::ErrorKind::InvalidInput, e),
            })?;

        let perms: libc::mode_t = 0o666;
        let flags = if create {
            libc::O_RDWR | libc::O_CREAT | libc::O_EXCL
        } else {
            libc::O_RDWR
        };

        let fd = unsafe { libc::shm_open(c_name.as_ptr(), flags, perms as libc::c_uint) };
        if fd == -1 {
            let source = io::Error::last_os_error();
            return Err(if create {
                PlatformError::ShmCreate {
                    name: name.to_string(),
                    size,
                    source,
                }
            } else {
                PlatformError::ShmJoin {
                    name: name.to_string(),
                    source,
                }
            });
        }

        if create {
            if unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
                let source = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(PlatformError::ShmCreate {
                    name: name.to_string(),
                    size,
                    source,
                });
            }
        }

        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };

        if mem == libc::MAP_FAILED {
            let source = io::Error::last_os_error();
            return Err(if create {
                PlatformError::ShmCreate {
                    name: name.to_string(),
                    size,
                    source,
                }
            } else {
                PlatformError::ShmJoin {
                    name: name.to_string(),
                    source,
                }
            });
        }

        Ok(Self {
            mem: mem as *mut u8,
            size,
            name: posix_name,
            owner: create,
        })
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    pub fn len(&self) -> usize {
        self.size
    }

    /// Best-effort unlink, used by the client on teardown. Failure is
    /// swallowed per §5 "best-effort; failure is swallowed".
    pub fn unlink(&self) {
        if let Ok(c_name) = CString::new(self.name.as_bytes()) {
            unsafe {
                libc::shm_unlink(c_name.as_ptr());
            }
        }
    }
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        if self.mem.is_null() {
            return;
        }
        unsafe {
            libc::munmap(self.mem as *mut libc::c_void, self.size);
        }
        if self.owner {
            self.unlink();
        }
    }
}

// ---------------------------------------------------------------------------
// PlatformSemaphore — POSIX named counting semaphore
// ---------------------------------------------------------------------------

pub struct PlatformSemaphore {
    sem: *mut libc::sem_t,
    name: String,
    owner: bool,
}

unsafe impl Send for PlatformSemaphore {}
unsafe impl Sync for PlatformSemaphore {}

unsafe impl Send for PlatformSemaphore {}
unsafe impl Sync for PlatformSemaphore {}

impl PlatformSemaphore {
    pub fn create(name: &str) -> Result<Self, PlatformError> {
        Self::open_impl(name, true)
    }

    pub fn join(name: &str) -> Result<Self, PlatformError> {
        Self::open_impl(name, false)
    }

    fn open_impl(name: &str, create: bool) -> Result<Self, PlatformError> {
        let posix_name = os_name(name);
        let c_name = CString::new(posix_name.clone()).map_err(|e| PlatformError::SemaphoreCreate {
            name: name.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, e),
        })?;

        let sem = if create {
            unsafe { libc::sem_open(c_name.as_ptr(), libc::O_CREAT | libc::O_EXCL, 0o666, 0) }
        } else {
            unsafe { libc::sem_open(c_name.as_ptr(), 0) }
        };

        if sem == libc::SEM_FAILED {
            let source = io::Error::last_os_error();
            return Err(if create {
                PlatformError::SemaphoreCreate {
                    name: name.to_string(),
                    source,
                }
            } else {
                PlatformError::SemaphoreJoin {
                    name: name.to_string(),
                    source,
                }
            });
        }

        Ok(Self {
            sem,
            name: posix_name,
            owner: create,
        })
    }

    pub fn signal(&self) -> Result<(), PlatformError> {
        if unsafe { libc::sem_post(self.sem) } != 0 {
            return Err(PlatformError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    pub fn wait(&self) -> Result<(), PlatformError> {
        loop {
            let ret = unsafe { libc::sem_wait(self.sem) };
            if ret == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(PlatformError::Io(err));
        }
    }

    /// Timed wait. `timeout` granularity follows the OS (nanoseconds on
    /// POSIX). Returns `Interrupted` on `EINTR` so the liveness watchdog
    /// in the transport layer can poll and retry, per §4.1.
    pub fn timed_wait(&self, timeout: Duration) -> Result<WaitOutcome, PlatformError> {
        let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
        unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
        let ns_total = ts.tv_nsec as i64 + timeout.subsec_nanos() as i64;
        ts.tv_sec += timeout.as_secs() as libc::time_t + (ns_total / 1_000_000_000) as libc::time_t;
        ts.tv_nsec = (ns_total % 1_000_000_000) as libc::c_long;

        let ret = unsafe { libc::sem_timedwait(self.sem, &ts) };
        if ret == 0 {
            return Ok(WaitOutcome::Signaled);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ETIMEDOUT) => Ok(WaitOutcome::Timeout),
            Some(libc::EINTR) => Ok(WaitOutcome::Interrupted),
            _ => Err(PlatformError::Io(err)),
        }
    }

    pub fn unlink(&self) {
        if let Ok(c_name) = CString::new(self.name.as_bytes()) {
            unsafe {
                libc::sem_unlink(c_name.as_ptr());
            }
        }
    }
}

impl Drop for PlatformSemaphore {
    fn drop(&mut self) {
        if self.sem.is_null() {
            return;
        }
        unsafe {
            libc::sem_close(self.sem);
        }
        if self.owner {
            self.unlink();
        }
    }
}
