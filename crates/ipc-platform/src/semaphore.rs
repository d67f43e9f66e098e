// SPDX-License-Identifier: MIT
//
// Cross-platform named counting semaphore used for the transport's
// ping-pong signalling (§4.2).

use std::time::Duration;

use crate::error::{PlatformError, WaitOutcome};
use crate::platform::PlatformSemaphore;

pub struct NamedSemaphore {
    inner: PlatformSemaphore,
}

impl NamedSemaphore {
    /// Create a new semaphore with initial count 0.
    pub fn create(name: &str) -> Result<Self, PlatformError> {
        Ok(Self {
            inner: PlatformSemaphore::create(name)?,
        })
    }

    /// Join a semaphore created by the opposite side.
    pub fn join(name: &str) -> Result<Self, PlatformError> {
        Ok(Self {
            inner: PlatformSemaphore::join(name)?,
        })
    }

    /// Increment the count, waking one waiter if any is blocked.
    pub fn signal(&self) -> Result<(), PlatformError> {
        self.inner.signal()
    }

    /// Block indefinitely until the count is positive, then decrement it.
    pub fn wait(&self) -> Result<(), PlatformError> {
        self.inner.wait()
    }

    /// Block up to `timeout`. On genuine timeout returns `WaitOutcome::Timeout`;
    /// on a signal delivered mid-wait (POSIX `EINTR`) returns
    /// `WaitOutcome::Interrupted` so the caller can retry the same deadline
    /// rather than treat it as a liveness failure.
    ///
    /// On platforms lacking a native timed wait, an implementation would
    /// install an alarm and a no-op signal handler, relying on `EINTR` to
    /// unblock `sem_wait` early, and would have to return `Interrupted` in
    /// that case too — both targets supported here (POSIX, Win32) have a
    /// native timed wait, so that fallback path never actually executes.
    pub fn timed_wait(&self, timeout: Duration) -> Result<WaitOutcome, PlatformError> {
        self.inner.timed_wait(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn signal_then_wait_succeeds() {
        let name = format!("ipcplat_test_sem_{}", std::process::id());
        let sem = NamedSemaphore::create(&name).unwrap();
        sem.signal().unwrap();
        sem.wait().unwrap();
    }

    #[test]
    fn timed_wait_times_out_when_unsignaled() {
        let name = format!("ipcplat_test_sem_timeout_{}", std::process::id());
        let sem = NamedSemaphore::create(&name).unwrap();
        let outcome = sem.timed_wait(Duration::from_millis(50)).unwrap();
        assert_eq!(outcome, WaitOutcome::Timeout);
    }

    #[test]
    fn two_processes_role_join_each_other() {
        let name = format!("ipcplat_test_sem_join_{}", std::process::id());
        let creator = NamedSemaphore::create(&name).unwrap();
        let joiner = NamedSemaphore::join(&name).unwrap();
        creator.signal().unwrap();
        joiner.wait().unwrap();
    }
}
