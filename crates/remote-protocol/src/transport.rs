// SPDX-License-Identifier: MIT
//
// Shared-memory transport: one region plus two semaphores forming a
// strict ping-pong channel (§4.2). Layout is the fixed `ShmHeader`
// followed by three typed variable sections (real/integer/boolean),
// each a values array plus a parallel dirty-flag array.

use std::time::Duration;

use ipc_platform::{NamedSemaphore, ShmRegion, WaitOutcome};

use crate::wire::ShmHeader;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Platform(#[from] ipc_platform::PlatformError),

    #[error("peer process died while awaiting reply to opcode {opcode}")]
    PeerDied { opcode: u32 },

    #[error("header magic/version mismatch — mismatched client/server pair")]
    MagicMismatch,

    #[error("argument of {len} bytes exceeds slot capacity of {cap} bytes")]
    SlotOverflow { len: usize, cap: usize },
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Default liveness-poll interval (§4.2): used only to decide how often to
/// re-check `process_is_alive`, never as an operation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

pub struct VariableSection {
    offset: usize,
    count: usize,
}

impl VariableSection {
    fn byte_len(&self) -> usize {
        self.count * (8 + 1) // f64-sized slot (reused narrower for int/bool) + 1 changed byte
    }
}

/// Computes the byte layout of the three typed sections following the
/// fixed header, and the total region size to allocate.
pub struct Layout {
    pub reals: VariableSection,
    pub integers: VariableSection,
    pub booleans: VariableSection,
    pub total_size: usize,
}

impl Layout {
    pub fn new(n_reals: usize, n_integers: usize, n_booleans: usize) -> Self {
        let header_size = ShmHeader::size();
        let reals = VariableSection {
            offset: header_size,
            count: n_reals,
        };
        let integers = VariableSection {
            offset: reals.offset + reals.byte_len(),
            count: n_integers,
        };
        let booleans = VariableSection {
            offset: integers.offset + integers.byte_len(),
            count: n_booleans,
        };
        let total_size = booleans.offset + booleans.byte_len();
        Self {
            reals,
            integers,
            booleans,
            total_size,
        }
    }
}

pub enum Role {
    Client,
    Server,
}

/// The shared-memory ping-pong transport. Each side wraps the same region
/// with roles swapped: the client created it, the server joined it.
pub struct Transport {
    region: ShmRegion,
    client_ready: NamedSemaphore,
    server_ready: NamedSemaphore,
    layout: Layout,
    role: Role,
}

impl Transport {
    /// Client-side constructor: creates the region and both semaphores,
    /// then signals `client_ready` once so the server (which blocks on it
    /// immediately after spawn) can proceed (§4.2 "After startup...").
    pub fn create(
        session_key: &str,
        n_reals: usize,
        n_integers: usize,
        n_booleans: usize,
    ) -> Result<Self> {
        let layout = Layout::new(n_reals, n_integers, n_booleans);
        let region = ShmRegion::create(&ipc_platform::shm_name::shm_name(session_key), layout.total_size)?;
        let client_ready = NamedSemaphore::create(&ipc_platform::shm_name::client_sem_name(session_key))?;
        let server_ready = NamedSemaphore::create(&ipc_platform::shm_name::server_sem_name(session_key))?;

        let mut transport = Self {
            region,
            client_ready,
            server_ready,
            layout,
            role: Role::Client,
        };
        transport.header_mut().init_magic();
        Ok(transport)
    }

    /// Server-side constructor: joins an already-created region and its
    /// semaphores (§3 "Ownership": the server only joins, never creates).
    pub fn join(
        session_key: &str,
        n_reals: usize,
        n_integers: usize,
        n_booleans: usize,
    ) -> Result<Self> {
        let layout = Layout::new(n_reals, n_integers, n_booleans);
        let region = ShmRegion::join(&ipc_platform::shm_name::shm_name(session_key), layout.total_size)?;
        let client_ready = NamedSemaphore::join(&ipc_platform::shm_name::client_sem_name(session_key))?;
        let server_ready = NamedSemaphore::join(&ipc_platform::shm_name::server_sem_name(session_key))?;

        let transport = Self {
            region,
            client_ready,
            server_ready,
            layout,
            role: Role::Server,
        };
        if !transport.header().magic_ok() {
            return Err(TransportError::MagicMismatch);
        }
        Ok(transport)
    }

    pub fn header(&self) -> &ShmHeader {
        unsafe { &*(self.region.as_mut_ptr() as *const ShmHeader) }
    }

    pub fn header_mut(&mut self) -> &mut ShmHeader {
        unsafe { &mut *(self.region.as_mut_ptr() as *mut ShmHeader) }
    }

    fn section_f64(&self, section: &VariableSection) -> &[f64] {
        unsafe {
            std::slice::from_raw_parts(
                self.region.as_mut_ptr().add(section.offset) as *const f64,
                section.count,
            )
        }
    }

    fn section_f64_mut(&self, section: &VariableSection) -> &mut [f64] {
        unsafe {
            std::slice::from_raw_parts_mut(
                self.region.as_mut_ptr().add(section.offset) as *mut f64,
                section.count,
            )
        }
    }

    fn section_changed(&self, section: &VariableSection) -> &mut [u8] {
        let flags_offset = section.offset + section.count * 8;
        unsafe {
            std::slice::from_raw_parts_mut(self.region.as_mut_ptr().add(flags_offset), section.count)
        }
    }

    pub fn real_values(&self) -> &[f64] {
        self.section_f64(&self.layout.reals)
    }

    pub fn real_values_mut(&self) -> &mut [f64] {
        self.section_f64_mut(&self.layout.reals)
    }

    pub fn real_changed(&self) -> &mut [u8] {
        self.section_changed(&self.layout.reals)
    }

    // Integers and booleans are stored as f64 slots too (the typed-mode
    // scratch reuses one narrow numeric lane) and narrowed on read — this
    // keeps the layout arithmetic in `Layout` uniform across the three
    // variable kinds while the public API stays precise about the model's
    // actual value types.
    pub fn integer_values(&self) -> Vec<i32> {
        self.section_f64(&self.layout.integers).iter().map(|&v| v as i32).collect()
    }

    pub fn set_integer_values(&self, values: &[i32]) {
        let slots = self.section_f64_mut(&self.layout.integers);
        for (slot, &v) in slots.iter_mut().zip(values) {
            *slot = v as f64;
        }
    }

    pub fn integer_changed(&self) -> &mut [u8] {
        self.section_changed(&self.layout.integers)
    }

    pub fn boolean_values(&self) -> Vec<bool> {
        self.section_f64(&self.layout.booleans).iter().map(|&v| v != 0.0).collect()
    }

    pub fn set_boolean_values(&self, values: &[bool]) {
        let slots = self.section_f64_mut(&self.layout.booleans);
        for (slot, &v) in slots.iter_mut().zip(values) {
            *slot = if v { 1.0 } else { 0.0 };
        }
    }

    pub fn boolean_changed(&self) -> &mut [u8] {
        self.section_changed(&self.layout.booleans)
    }

    /// Write a packed sequence of null-terminated strings into `strbuf`,
    /// bounding at the slot boundary (§4.3).
    pub fn write_strings(&mut self, strings: &[&str]) -> Result<()> {
        let mut buf = Vec::new();
        for s in strings {
            buf.extend_from_slice(s.as_bytes());
            buf.push(0);
        }
        if buf.len() > crate::wire::STR_MAX {
            return Err(TransportError::SlotOverflow {
                len: buf.len(),
                cap: crate::wire::STR_MAX,
            });
        }
        let header = self.header_mut();
        header.strbuf[..buf.len()].copy_from_slice(&buf);
        header.strbuf_len = buf.len() as u32;
        Ok(())
    }

    /// Decode a packed sequence of `n` null-terminated strings from `strbuf`,
    /// bounding the scan at `strbuf_len` (never past the slot, §9).
    pub fn read_strings(&self, n: usize) -> Vec<String> {
        let header = self.header();
        let len = (header.strbuf_len as usize).min(crate::wire::STR_MAX);
        let mut out = Vec::with_capacity(n);
        let mut pos = 0;
        while out.len() < n && pos < len {
            let end = header.strbuf[pos..len].iter().position(|&b| b == 0).map(|p| pos + p).unwrap_or(len);
            out.push(String::from_utf8_lossy(&header.strbuf[pos..end]).into_owned());
            pos = end + 1;
        }
        out
    }

    /// Write a variable-length float vector (state/derivative/event-
    /// indicator arrays) into `varbuf`.
    pub fn write_varbuf(&mut self, values: &[f64]) -> Result<()> {
        if values.len() > crate::wire::VARBUF_MAX {
            return Err(TransportError::SlotOverflow {
                len: values.len() * 8,
                cap: crate::wire::VARBUF_MAX * 8,
            });
        }
        let header = self.header_mut();
        header.varbuf[..values.len()].copy_from_slice(values);
        header.varbuf_len = values.len() as u32;
        Ok(())
    }

    pub fn read_varbuf(&self) -> &[f64] {
        let header = self.header();
        &header.varbuf[..header.varbuf_len as usize]
    }

    // -- Startup handshake ------------------------------------------------

    /// Client side of the startup handshake (§4.2 "After startup..."):
    /// signal `client_ready` once the region is created, before spawning
    /// the server.
    pub fn signal_startup(&self) -> Result<()> {
        self.client_ready.signal()?;
        Ok(())
    }

    /// Client side: wait up to `total_timeout` for the server's startup
    /// `server_ready` signal (§4.4 "Spawning -> Ready", 15s default),
    /// polling `is_server_alive` on every liveness interval. Returns
    /// `false` on timeout or on detecting the server died.
    pub fn wait_for_startup(
        &self,
        total_timeout: Duration,
        is_server_alive: impl Fn() -> bool,
    ) -> Result<bool> {
        let deadline = std::time::Instant::now() + total_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            match self.server_ready.timed_wait(remaining.min(DEFAULT_TIMEOUT))? {
                WaitOutcome::Signaled => return Ok(true),
                WaitOutcome::Timeout => {
                    if !is_server_alive() {
                        return Ok(false);
                    }
                }
                WaitOutcome::Interrupted => continue,
            }
        }
    }

    /// Server side of the startup handshake: block until the client's
    /// initial `client_ready` signal, then reply with `server_ready` once
    /// the caller has finished joining (§4.4 "On start... join transport;
    /// signal server_ready").
    pub fn wait_for_client_startup(&self) -> Result<()> {
        self.client_ready.wait()?;
        Ok(())
    }

    pub fn signal_server_ready(&self) -> Result<()> {
        self.server_ready.signal()?;
        Ok(())
    }

    // -- Ping-pong primitives --------------------------------------------

    /// Client side of one RPC round trip (§4.2 "Per RPC (client view)").
    /// `is_server_alive` must poll the spawned server's liveness.
    pub fn client_call(
        &mut self,
        opcode: crate::opcode::Opcode,
        is_server_alive: impl Fn() -> bool,
    ) -> Result<()> {
        {
            let header = self.header_mut();
            header.message = [0u8; crate::wire::MSG_MAX];
            header.opcode = opcode as u32;
        }
        self.client_ready.signal()?;
        loop {
            match self.server_ready.timed_wait(DEFAULT_TIMEOUT)? {
                WaitOutcome::Signaled => return Ok(()),
                WaitOutcome::Timeout => {
                    if !is_server_alive() {
                        return Err(TransportError::PeerDied {
                            opcode: opcode as u32,
                        });
                    }
                    tracing::debug!(opcode = opcode.name(), "waiting for server...");
                }
                WaitOutcome::Interrupted => continue,
            }
        }
    }

    /// Server side: block until the client signals a new request, or the
    /// parent dies (§4.2 "Per RPC (server view)"). Returns `None` on
    /// parent death so the server loop can exit cleanly.
    pub fn server_wait_for_request(
        &self,
        is_parent_alive: impl Fn() -> bool,
    ) -> Result<Option<crate::opcode::Opcode>> {
        loop {
            match self.client_ready.timed_wait(DEFAULT_TIMEOUT)? {
                WaitOutcome::Signaled => {
                    let opcode = self.header().opcode;
                    return Ok(crate::opcode::Opcode::from_u32(opcode));
                }
                WaitOutcome::Timeout => {
                    if !is_parent_alive() {
                        return Ok(None);
                    }
                }
                WaitOutcome::Interrupted => continue,
            }
        }
    }

    pub fn server_reply(&mut self, status: crate::status::Status) -> Result<()> {
        self.header_mut().status = status.into();
        self.server_ready.signal()?;
        Ok(())
    }

    pub fn status(&self) -> crate::status::Status {
        self.header().status.into()
    }

    pub fn role(&self) -> &Role {
        &self.role
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_sections_do_not_overlap() {
        let layout = Layout::new(3, 2, 1);
        assert!(layout.reals.offset < layout.integers.offset);
        assert!(layout.integers.offset < layout.booleans.offset);
        assert!(layout.booleans.offset + layout.booleans.byte_len() == layout.total_size);
    }

    #[test]
    fn client_creates_server_joins_same_region() {
        let key = format!("FMUtest_transport_{}", std::process::id());
        let mut client = Transport::create(&key, 2, 1, 0).unwrap();
        client.real_values_mut()[0] = 42.0;

        let server = Transport::join(&key, 2, 1, 0).unwrap();
        assert_eq!(server.real_values()[0], 42.0);
    }

    #[test]
    fn joining_wrong_sized_region_detects_magic_mismatch() {
        // Join without a prior create: the region doesn't exist at all,
        // which surfaces as a platform error rather than a magic mismatch —
        // verifies we don't panic either way.
        let key = format!("FMUtest_transport_missing_{}", std::process::id());
        let result = Transport::join(&key, 1, 0, 0);
        assert!(result.is_err());
    }

    #[test]
    fn ping_pong_round_trip() {
        let key = format!("FMUtest_transport_pp_{}", std::process::id());
        let mut client = Transport::create(&key, 0, 0, 0).unwrap();
        let server = Transport::join(&key, 0, 0, 0).unwrap();

        let handle = std::thread::spawn(move || {
            let opcode = server.server_wait_for_request(|| true).unwrap().unwrap();
            assert_eq!(opcode, crate::opcode::Opcode::GetReal);
            let mut server = server;
            server.server_reply(crate::status::Status::Ok).unwrap();
        });

        client
            .client_call(crate::opcode::Opcode::GetReal, || true)
            .unwrap();
        assert_eq!(client.status(), crate::status::Status::Ok);
        handle.join().unwrap();
    }

    #[test]
    fn client_call_reports_peer_died_when_server_never_replies() {
        let key = format!("FMUtest_transport_dead_{}", std::process::id());
        let mut client = Transport::create(&key, 0, 0, 0).unwrap();
        let _server = Transport::join(&key, 0, 0, 0).unwrap();

        let result = client.client_call(crate::opcode::Opcode::GetReal, || false);
        assert!(matches!(result, Err(TransportError::PeerDied { .. })));
    }

    #[test]
    fn strings_round_trip_through_strbuf() {
        let key = format!("FMUtest_transport_str_{}", std::process::id());
        let mut t = Transport::create(&key, 0, 0, 0).unwrap();
        t.write_strings(&["hello", "world"]).unwrap();
        assert_eq!(t.read_strings(2), vec!["hello".to_string(), "world".to_string()]);
    }

    #[test]
    fn varbuf_round_trips() {
        let key = format!("FMUtest_transport_varbuf_{}", std::process::id());
        let mut t = Transport::create(&key, 0, 0, 0).unwrap();
        t.write_varbuf(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(t.read_varbuf(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn varbuf_overflow_is_rejected() {
        let key = format!("FMUtest_transport_varbuf_overflow_{}", std::process::id());
        let mut t = Transport::create(&key, 0, 0, 0).unwrap();
        let huge = vec![0.0; crate::wire::VARBUF_MAX + 1];
        assert!(t.write_varbuf(&huge).is_err());
    }
}
