// SPDX-License-Identifier: MIT
//
// Windows shared memory and named semaphore primitives, mirroring
// cpp-ipc's `shm_win.cpp` for the file-mapping side and the remoting
// layer's direct use of `CreateSemaphoreA`/`ReleaseSemaphore` for the
// synchronization side.

use std::io;
use std::ptr;
use std::time::Duration;

use windows_sys::Win32::Foundation::*;
use windows_sys::Win32::System::Memory::*;
use windows_sys::Win32::System::Threading::*;

use crate::error::{PlatformError, WaitOutcome};
use crate::shm_name::os_name;

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

// ---------------------------------------------------------------------------
// PlatformShm
// ---------------------------------------------------------------------------

pub struct PlatformShm {
    handle: HANDLE,
    mem: *mut u8,
    size: usize,
    owner: bool,
}

unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

impl PlatformShm {
    pub fn create(name: &str, size: usize) -> Result<Self, PlatformError> {
        Self::open_impl(name, size, true)
    }

    pub fn join(name: &str, size: usize) -> Result<Self, PlatformError> {
        Self::open_impl(name, size, false)
    }

    fn open_impl(name: &str, size: usize, create: bool) -> Result<Self, PlatformError> {
        let wide_name = to_wide(&os_name(name));

        let handle = if create {
            unsafe {
                CreateFileMappingW(
                    INVALID_HANDLE_VALUE,
                    ptr::null(),
                    PAGE_READWRITE,
                    0,
                    size as u32,
                    wide_name.as_ptr(),
                )
            }
        } else {
            unsafe { OpenFileMappingW(FILE_MAP_ALL_ACCESS, 0, wide_name.as_ptr()) }
        };

        if handle == 0 {
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

        let mem = unsafe { MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, size) };
        if mem.Value.is_null() {
            let source = io::Error::last_os_error();
            unsafe { CloseHandle(handle) };
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
            handle,
            mem: mem.Value as *mut u8,
            size,
            owner: create,
        })
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    pub fn len(&self) -> usize {
        self.size
    }

    /// No-op on Windows: the kernel object is reference-counted and
    /// disappears once the last handle closes.
    pub fn unlink(&self) {}
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        if !self.mem.is_null() {
            unsafe {
                UnmapViewOfFile(MEMORY_MAPPED_VIEW_ADDRESS { Value: self.mem as _ });
            }
        }
        if self.handle != 0 {
            unsafe { CloseHandle(self.handle) };
        }
    }
}

// ---------------------------------------------------------------------------
// PlatformSemaphore
// ---------------------------------------------------------------------------

pub struct PlatformSemaphore {
    handle: HANDLE,
}

unsafe impl Send for PlatformSemaphore {}
unsafe impl Sync for PlatformSemaphore {}

const SEMAPHORE_MAX_COUNT: i32 = i32::MAX;

impl PlatformSemaphore {
    pub fn create(name: &str) -> Result<Self, PlatformError> {
        Self::open_impl(name, true)
    }

    pub fn join(name: &str) -> Result<Self, PlatformError> {
        Self::open_impl(name, false)
    }

    fn open_impl(name: &str, create: bool) -> Result<Self, PlatformError> {
        let wide_name = to_wide(&os_name(name));
        let handle = if create {
            unsafe {
                CreateSemaphoreW(ptr::null(), 0, SEMAPHORE_MAX_COUNT, wide_name.as_ptr())
            }
        } else {
            unsafe { OpenSemaphoreW(SEMAPHORE_ALL_ACCESS, 0, wide_name.as_ptr()) }
        };

        if handle == 0 {
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

        Ok(Self { handle })
    }

    pub fn signal(&self) -> Result<(), PlatformError> {
        if unsafe { ReleaseSemaphore(self.handle, 1, ptr::null_mut()) } == 0 {
            return Err(PlatformError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    pub fn wait(&self) -> Result<(), PlatformError> {
        let ret = unsafe { WaitForSingleObject(self.handle, INFINITE) };
        if ret != WAIT_OBJECT_0 {
            return Err(PlatformError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    pub fn timed_wait(&self, timeout: Duration) -> Result<WaitOutcome, PlatformError> {
        let ms = timeout.as_millis().min(u32::MAX as u128) as u32;
        let ret = unsafe { WaitForSingleObject(self.handle, ms) };
        match ret {
            WAIT_OBJECT_0 => Ok(WaitOutcome::Signaled),
            WAIT_TIMEOUT => Ok(WaitOutcome::Timeout),
            _ => Err(PlatformError::Io(io::Error::last_os_error())),
        }
    }

    pub fn unlink(&self) {}
}

impl Drop for PlatformSemaphore {
    fn drop(&mut self) {
        if self.handle != 0 {
            unsafe { CloseHandle(self.handle) };
        }
    }
}
