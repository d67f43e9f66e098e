// SPDX-License-Identifier: MIT
//
// `server_sm` binary entry point (§4.4 "Server loop" / §6 "Server CLI").

mod adapter_bridge;
mod cli;
mod dispatch;
mod error;
mod ffi_model;

use clap::Parser;

use cli::Args;
use dispatch::Server;
use ffi_model::LoadedModel;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    remote_protocol::wire::assert_wire_sizes();

    if let Err(err) = run(args) {
        tracing::error!(error = %err, "server exited with error");
        std::process::exit(1);
    }
}

fn run(args: Args) -> error::Result<()> {
    tracing::info!(
        parent_pid = args.parent_pid,
        session_key = %args.session_key,
        library = %args.library_path.display(),
        "server starting"
    );

    let model = LoadedModel::load(&args.library_path)?;
    let transport = remote_protocol::Transport::join(&args.session_key, args.n_reals, args.n_integers, args.n_booleans)?;

    let mut server = Server::new(transport, args.parent_pid, model);
    server.run()?;

    tracing::info!("server exiting");
    Ok(())
}
