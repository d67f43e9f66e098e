// SPDX-License-Identifier: MIT

#[cfg(unix)]
pub mod posix;

#[cfg(windows)]
pub mod windows;

#[cfg(unix)]
pub use posix::{PlatformSemaphore, PlatformShm};

#[cfg(windows)]
pub use windows::{PlatformSemaphore, PlatformShm};
