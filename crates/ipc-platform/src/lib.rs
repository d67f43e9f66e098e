// SPDX-License-Identifier: MIT
//
// OS primitives for the remoting bridge: dynamic library loading, process
// spawn/liveness, named semaphores, named shared memory. Each primitive
// fails with a distinct `PlatformError` variant (§4.1).

mod error;
mod library;
mod platform;
mod process;
mod semaphore;
pub mod shm_name;

mod shm;

pub use error::{PlatformError, Result, WaitOutcome};
pub use library::LoadedLibrary;
pub use process::{
    current_pid, pid_is_alive, process_close, process_is_alive, process_spawn, process_wait, ProcessHandle,
};
pub use semaphore::NamedSemaphore;
pub use shm::ShmRegion;
