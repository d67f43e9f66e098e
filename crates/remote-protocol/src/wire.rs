// SPDX-License-Identifier: MIT
//
// The shared-region header layout (§3) and the published wire-size table
// (§4.3 "Value coercion"). `portable_size_t` is fixed at 32 bits so a
// 64-bit client and a 32-bit server agree on every count crossing the wire.

/// Count type used for every array length that crosses the wire.
pub type PortableSize = u32;

pub const MAGIC: u32 = 0x464D_4252; // ASCII "FMBR", read as a little-endian u32
pub const WIRE_VERSION: u8 = 1;

pub const MSG_MAX: usize = 4096;
pub const VARBUF_MAX: usize = 1024;
pub const STR_MAX: usize = 4096;

/// Fixed header at the front of every shared region, independent of the
/// model's variable counts. Variable tables for real/integer/boolean
/// follow immediately after this struct in memory (see `transport.rs`).
#[repr(C)]
pub struct ShmHeader {
    pub magic: u32,
    pub version: u8,
    _pad: [u8; 3],
    pub status: i32,
    pub opcode: u32,
    pub message: [u8; MSG_MAX],
    /// Scalar double arguments for compound calls (time, step size,
    /// tolerance, stop time, ...). Mirrors the original `values[5]` scratch.
    pub scratch_f: [f64; 5],
    /// Scalar integer/boolean arguments and counts.
    pub scratch_i: [i32; 4],
    pub varbuf_len: u32,
    /// State/derivative/event-indicator/nominal vectors (model-exchange ops).
    pub varbuf: [f64; VARBUF_MAX],
    pub strbuf_len: u32,
    /// Packed null-terminated strings (instance name, categories,
    /// `GetString`/`SetString` payloads).
    pub strbuf: [u8; STR_MAX],
}

impl ShmHeader {
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// Zero everything except magic/version, mirroring the C client's
    /// `remote_data->message[0] = '\0'` message-clear-per-call idiom,
    /// generalized to the whole scratch area.
    pub fn clear_call_state(&mut self) {
        self.status = 0;
        self.opcode = 0;
        self.message = [0u8; MSG_MAX];
        self.scratch_f = [0.0; 5];
        self.scratch_i = [0; 4];
        self.varbuf_len = 0;
        self.strbuf_len = 0;
    }

    pub fn init_magic(&mut self) {
        self.magic = MAGIC;
        self.version = WIRE_VERSION;
    }

    pub fn magic_ok(&self) -> bool {
        self.magic == MAGIC && self.version == WIRE_VERSION
    }

    /// Append a log line to the message buffer, bounding at `MSG_MAX` so an
    /// unterminated or oversized write can never run past the slot — the
    /// "unaligned strings on the wire" defense named in §9.
    pub fn push_log_line(&mut self, line: &str) {
        let current_len = self.message.iter().position(|&b| b == 0).unwrap_or(MSG_MAX);
        let bytes = line.as_bytes();
        let available = MSG_MAX.saturating_sub(current_len + 1);
        let take = bytes.len().min(available);
        self.message[current_len..current_len + take].copy_from_slice(&bytes[..take]);
        let terminator = (current_len + take).min(MSG_MAX - 1);
        self.message[terminator] = 0;
    }

    /// Decode the accumulated message buffer into newline-separated lines,
    /// bounding the decode at the slot boundary even if no terminator was
    /// ever written (§9 "defend against missing terminators").
    pub fn drain_log_lines(&mut self) -> Vec<String> {
        let end = self.message.iter().position(|&b| b == 0).unwrap_or(MSG_MAX);
        let text = String::from_utf8_lossy(&self.message[..end]).into_owned();
        self.message = [0u8; MSG_MAX];
        if text.is_empty() {
            Vec::new()
        } else {
            text.split('\n').map(|s| s.to_string()).collect()
        }
    }
}

/// One row of the published wire-size table (§4.3). Every size here is a
/// Rust primitive size, which is guaranteed identical across architectures
/// by the language — the "sizeof self-test" this function backs exists to
/// catch the case where someone widens one of these types by hand later.
pub const WIRE_SIZE_TABLE: &[(&str, usize)] = &[
    ("boolean", 4),
    ("byte", 1),
    ("integer", 4),
    ("real", 8),
    ("value_reference", 4),
    ("status_kind", 4),
    ("type_tag", 4),
    ("portable_size", 4),
];

/// Runtime self-test the server calls once at startup (§4.2) so a
/// mismatched pair fails on the first RPC instead of silently corrupting
/// memory.
pub fn assert_wire_sizes() {
    assert_eq!(std::mem::size_of::<i32>(), 4, "boolean/integer/status_kind/type_tag");
    assert_eq!(std::mem::size_of::<u8>(), 1, "byte");
    assert_eq!(std::mem::size_of::<f64>(), 8, "real");
    assert_eq!(std::mem::size_of::<u32>(), 4, "value_reference/portable_size");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn published_sizes_match_rust_primitives() {
        assert_wire_sizes();
        for (name, size) in WIRE_SIZE_TABLE {
            match *name {
                "boolean" | "integer" | "status_kind" | "type_tag" => {
                    assert_eq!(*size, std::mem::size_of::<i32>())
                }
                "byte" => assert_eq!(*size, std::mem::size_of::<u8>()),
                "real" => assert_eq!(*size, std::mem::size_of::<f64>()),
                "value_reference" | "portable_size" => assert_eq!(*size, std::mem::size_of::<u32>()),
                other => panic!("unhandled wire type {other}"),
            }
        }
    }

    #[test]
    fn header_round_trips_log_lines() {
        let mut header: ShmHeader = unsafe { std::mem::zeroed() };
        header.init_magic();
        header.push_log_line("hello");
        header.push_log_line("world");
        let lines = header.drain_log_lines();
        assert_eq!(lines, vec!["hello".to_string(), "world".to_string()]);
        // Draining clears the buffer.
        assert!(header.drain_log_lines().is_empty());
    }

    #[test]
    fn magic_detects_mismatched_pair() {
        let mut header: ShmHeader = unsafe { std::mem::zeroed() };
        assert!(!header.magic_ok());
        header.init_magic();
        assert!(header.magic_ok());
    }

    #[test]
    fn log_line_push_bounds_at_slot_even_when_oversized() {
        let mut header: ShmHeader = unsafe { std::mem::zeroed() };
        header.init_magic();
        let huge = "x".repeat(MSG_MAX * 2);
        header.push_log_line(&huge);
        // Must not panic, and must stay inside the slot.
        let lines = header.drain_log_lines();
        assert!(lines[0].len() < MSG_MAX);
    }
}
