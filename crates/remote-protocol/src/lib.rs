// SPDX-License-Identifier: MIT
//
// Wire format and shared-memory transport shared by the client shim and
// the remote server: opcodes, status codes, the fixed header layout, typed
// variable tables, the side-channel descriptor file, and the ping-pong
// transport built on top of `ipc-platform`.

pub mod descriptor;
pub mod opcode;
pub mod status;
pub mod transport;
pub mod variables;
pub mod wire;

pub use descriptor::{DescriptorError, RemotingTable};
pub use opcode::Opcode;
pub use status::Status;
pub use transport::{Layout, Role, Transport, TransportError, DEFAULT_TIMEOUT};
pub use variables::VariableTable;
pub use wire::{assert_wire_sizes, ShmHeader, MAGIC, MSG_MAX, STR_MAX, VARBUF_MAX, WIRE_VERSION};
