// SPDX-License-Identifier: MIT
//
// Server CLI (§6 "Server CLI"): six positional arguments, the client's
// own `process_spawn` argv exactly.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "server_sm", about = "Out-of-process co-simulation bridge server")]
pub struct Args {
    /// PID of the spawning client process, polled for liveness.
    pub parent_pid: u32,

    /// Session key shared with the client; derives the shared-memory and
    /// semaphore object names.
    pub session_key: String,

    /// Path to the wrapped model library to `dlopen`/`LoadLibrary`.
    pub library_path: PathBuf,

    /// Number of real-valued variables in the typed table.
    pub n_reals: usize,

    /// Number of integer-valued variables in the typed table.
    pub n_integers: usize,

    /// Number of boolean-valued variables in the typed table.
    pub n_booleans: usize,
}
