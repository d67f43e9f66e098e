// SPDX-License-Identifier: MIT
//
// Cross-platform named shared-memory region.
// Delegates to platform::{PlatformShm} (POSIX shm_open/mmap or Windows
// file mapping). Mirrors libipc's `IpcMutex`-over-`PlatformMutex` pattern.

use crate::error::PlatformError;
use crate::platform::PlatformShm;

/// A named shared-memory region.
///
/// Per §3 "Ownership": the region is *created* by the client and *joined*
/// by the server. Only the creator unlinks it on drop.
pub struct ShmRegion {
    inner: PlatformShm,
}

impl ShmRegion {
    /// Create a brand-new region. Fails if one of this name already exists.
    pub fn create(name: &str, size: usize) -> Result<Self, PlatformError> {
        tracing::debug!(name, size, "creating shared memory region");
        Ok(Self {
            inner: PlatformShm::create(name, size)?,
        })
    }

    /// Join a region created by another process.
    pub fn join(name: &str, size: usize) -> Result<Self, PlatformError> {
        tracing::debug!(name, size, "joining shared memory region");
        Ok(Self {
            inner: PlatformShm::join(name, size)?,
        })
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.inner.as_mut_ptr()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }
}
