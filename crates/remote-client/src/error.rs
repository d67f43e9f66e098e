// SPDX-License-Identifier: MIT

use remote_protocol::{DescriptorError, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Platform(#[from] ipc_platform::PlatformError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Layout(#[from] crate::layout::LayoutError),

    #[error("server did not signal ready within {0:?}")]
    ServerStartupTimeout(std::time::Duration),

    #[error("operation attempted while client is in state {state}, expected {expected}")]
    WrongState {
        state: &'static str,
        expected: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, ClientError>;
