// SPDX-License-Identifier: MIT

use crate::ffi_model::ModelLoadError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Platform(#[from] ipc_platform::PlatformError),

    #[error(transparent)]
    Transport(#[from] remote_protocol::TransportError),

    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
}

pub type Result<T> = std::result::Result<T, ServerError>;
