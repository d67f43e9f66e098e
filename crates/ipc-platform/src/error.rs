// SPDX-License-Identifier: MIT

use std::io;

/// A single error type covering every platform primitive in this crate.
///
/// Every operation fails with a distinct variant so callers can match on
/// kind instead of parsing messages, per the platform abstraction's
/// "each failing with a distinct error kind" requirement.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("failed to load library `{path}`: {source}")]
    LibraryLoad { path: String, source: io::Error },

    #[error("symbol `{symbol}` not found in loaded library")]
    SymbolNotFound { symbol: String },

    #[error("failed to spawn process `{program}`: {source}")]
    ProcessSpawn { program: String, source: io::Error },

    #[error("failed to create named semaphore `{name}`: {source}")]
    SemaphoreCreate { name: String, source: io::Error },

    #[error("failed to join named semaphore `{name}`: {source}")]
    SemaphoreJoin { name: String, source: io::Error },

    #[error("semaphore wait interrupted")]
    SemaphoreInterrupted,

    #[error("failed to create shared memory `{name}` ({size} bytes): {source}")]
    ShmCreate {
        name: String,
        size: usize,
        source: io::Error,
    },

    #[error("failed to join shared memory `{name}`: {source}")]
    ShmJoin { name: String, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Outcome of a timed wait on a semaphore, distinguishing "nothing happened
/// yet" from a spurious OS-level interruption that must be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    Timeout,
    Interrupted,
}
