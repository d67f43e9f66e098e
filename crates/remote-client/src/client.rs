// SPDX-License-Identifier: MIT
//
// The client shim's safe state machine (§4.4 "Client shim"): New ->
// Spawning -> Ready -> (PerCall) -> Freeing -> Dead. The FFI surface in
// `ffi.rs` is a thin wrapper over this type.

use std::path::Path;
use std::time::Duration;

use ipc_platform::shm_name::session_key;
use ipc_platform::{process_close, process_is_alive, process_spawn, process_wait, ProcessHandle};
use remote_protocol::{Opcode, RemotingTable, Status, Transport, VariableTable};

use crate::error::{ClientError, Result};
use crate::layout;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    New,
    Spawning,
    Ready,
    Freeing,
    Dead,
}

/// Host-supplied logger callback: one invocation per accumulated log line,
/// tagged with the reply status it arrived with (§4.3 "Log channel").
pub type Logger = Box<dyn FnMut(Status, &str) + Send>;

pub struct Client {
    phase: Phase,
    transport: Option<Transport>,
    server: Option<ProcessHandle>,
    reals: VariableTable<f64>,
    integers: VariableTable<i32>,
    booleans: VariableTable<bool>,
    logger: Logger,
}

impl Client {
    pub fn new(logger: Logger) -> Self {
        Self {
            phase: Phase::New,
            transport: None,
            server: None,
            reals: VariableTable::new(Vec::new()),
            integers: VariableTable::new(Vec::new()),
            booleans: VariableTable::new(Vec::new()),
            logger,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn require_phase(&self, expected: Phase, name: &'static str) -> Result<()> {
        if self.phase != expected {
            return Err(ClientError::WrongState {
                state: phase_name(self.phase),
                expected: name,
            });
        }
        Ok(())
    }

    /// `New -> Spawning -> Ready` (§4.4). `resource_location` is the
    /// directory containing `remoting_table.txt`; `module_root` is the
    /// directory the client shim itself lives in, used to probe
    /// `binaries/<32|64>/` for the server executable and wrapped library.
    pub fn instantiate(
        &mut self,
        resource_location: &Path,
        module_root: &Path,
        identifier: &str,
    ) -> Result<()> {
        self.require_phase(Phase::New, "New")?;
        self.phase = Phase::Spawning;

        let descriptor = RemotingTable::load(&RemotingTable::descriptor_path(resource_location))?;
        self.reals = VariableTable::new(descriptor.real_refs);
        self.integers = VariableTable::new(descriptor.integer_refs);
        self.booleans = VariableTable::new(descriptor.boolean_refs);

        let resolved = layout::resolve(module_root, identifier)?;
        let key = session_key(&resource_location.to_string_lossy());

        let transport = Transport::create(&key, self.reals.len(), self.integers.len(), self.booleans.len())?;
        transport.signal_startup()?;

        let parent_pid = ipc_platform::current_pid().to_string();
        let argv = vec![
            resolved.server_path.to_string_lossy().into_owned(),
            parent_pid,
            key,
            resolved.library_path.to_string_lossy().into_owned(),
            self.reals.len().to_string(),
            self.integers.len().to_string(),
            self.booleans.len().to_string(),
        ];
        let server = process_spawn(&argv)?;

        let ready = transport.wait_for_startup(STARTUP_TIMEOUT, || process_is_alive(server))?;
        if !ready {
            process_close(server);
            self.phase = Phase::Dead;
            return Err(ClientError::ServerStartupTimeout(STARTUP_TIMEOUT));
        }

        self.transport = Some(transport);
        self.server = Some(server);
        self.phase = Phase::Ready;
        self.rpc(Opcode::Instantiate)
    }

    /// One RPC with no extra marshalling beyond the opcode itself, with the
    /// typed caches flushed beforehand and refreshed afterward (§4.3).
    fn rpc(&mut self, opcode: Opcode) -> Result<()> {
        self.flush_dirty();

        // `client_call`'s liveness closure can't borrow `self` (the
        // transport below already holds `&mut self.transport`), so the
        // `ProcessHandle` is copied out first and the closure checks
        // liveness directly rather than calling back through `self`.
        let server = self.server;
        let is_alive = move || server.map(process_is_alive).unwrap_or(false);

        let transport = self.transport.as_mut().expect("rpc called outside Ready/PerCall");
        transport.client_call(opcode, is_alive)?;
        let status: Status = transport.status();
        let lines = transport.header_mut().drain_log_lines();
        for line in lines {
            (self.logger)(status, &line);
        }
        if opcode != Opcode::FreeInstance {
            self.refresh_from_wire();
        }
        Ok(())
    }

    fn flush_dirty(&mut self) {
        let transport = match self.transport.as_mut() {
            Some(t) => t,
            None => return,
        };

        for i in self.reals.dirty_indices().collect::<Vec<_>>() {
            transport.real_values_mut()[i] = self.reals.values()[i];
            transport.real_changed()[i] = 1;
        }
        if !self.integers.is_empty() {
            transport.set_integer_values(self.integers.values());
        }
        if !self.booleans.is_empty() {
            transport.set_boolean_values(self.booleans.values());
        }

        for i in 0..self.reals.len() {
            self.reals.clear_changed(i);
        }
        for i in 0..self.integers.len() {
            self.integers.clear_changed(i);
        }
        for i in 0..self.booleans.len() {
            self.booleans.clear_changed(i);
        }
    }

    fn refresh_from_wire(&mut self) {
        let transport = match self.transport.as_ref() {
            Some(t) => t,
            None => return,
        };
        if !self.reals.is_empty() {
            self.reals.refresh_all(transport.real_values());
        }
        if !self.integers.is_empty() {
            self.integers.refresh_all(&transport.integer_values());
        }
        if !self.booleans.is_empty() {
            self.booleans.refresh_all(&transport.boolean_values());
        }
    }

    /// `GetReal`/`GetInteger`/`GetBoolean` are served locally from the
    /// cached arrays (§4.3): no RPC crosses the wire.
    pub fn get_real(&self, vr: u32) -> Option<f64> {
        self.reals.get(vr)
    }

    pub fn get_integer(&self, vr: u32) -> Option<i32> {
        self.integers.get(vr)
    }

    pub fn get_boolean(&self, vr: u32) -> Option<bool> {
        self.booleans.get(vr)
    }

    /// `SetX` is also local; it marks the cache dirty so the next compute
    /// step flushes the diff (§4.3).
    pub fn set_real(&mut self, vr: u32, value: f64) -> bool {
        self.reals.set(vr, value)
    }

    pub fn set_integer(&mut self, vr: u32, value: i32) -> bool {
        self.integers.set(vr, value)
    }

    pub fn set_boolean(&mut self, vr: u32, value: bool) -> bool {
        self.booleans.set(vr, value)
    }

    pub fn setup_experiment(&mut self, tolerance: Option<f64>, start_time: f64, stop_time: Option<f64>) -> Result<()> {
        self.require_ready()?;
        {
            let transport = self.transport.as_mut().unwrap();
            let header = transport.header_mut();
            header.scratch_f[0] = tolerance.unwrap_or(0.0);
            header.scratch_f[1] = start_time;
            header.scratch_f[2] = stop_time.unwrap_or(0.0);
            header.scratch_i[0] = tolerance.is_some() as i32;
            header.scratch_i[1] = stop_time.is_some() as i32;
        }
        self.rpc(Opcode::SetupExperiment)
    }

    pub fn enter_initialization_mode(&mut self) -> Result<()> {
        self.require_ready()?;
        self.rpc(Opcode::EnterInitializationMode)
    }

    pub fn exit_initialization_mode(&mut self) -> Result<()> {
        self.require_ready()?;
        self.rpc(Opcode::ExitInitializationMode)
    }

    pub fn do_step(&mut self, current_time: f64, step_size: f64) -> Result<()> {
        self.require_ready()?;
        {
            let transport = self.transport.as_mut().unwrap();
            let header = transport.header_mut();
            header.scratch_f[0] = current_time;
            header.scratch_f[1] = step_size;
        }
        self.rpc(Opcode::DoStep)
    }

    pub fn terminate(&mut self) -> Result<()> {
        self.require_ready()?;
        self.rpc(Opcode::Terminate)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.require_ready()?;
        self.rpc(Opcode::Reset)
    }

    fn require_ready(&self) -> Result<()> {
        self.require_phase(Phase::Ready, "Ready")
    }

    /// `Ready -> Freeing -> Dead` (§4.4): issue `FreeInstance`, wait for
    /// the server to exit, then tear down the transport (best-effort
    /// unlink happens in `Drop`).
    pub fn free_instance(&mut self) -> Result<()> {
        if self.phase != Phase::Ready {
            self.phase = Phase::Dead;
            return Ok(());
        }
        self.phase = Phase::Freeing;
        self.rpc(Opcode::FreeInstance)?;
        if let Some(server) = self.server.take() {
            let _ = process_wait(server);
            process_close(server);
        }
        self.transport = None;
        self.phase = Phase::Dead;
        Ok(())
    }

    /// Literal strings served without an RPC (§6 "GetTypesPlatform/
    /// GetVersion return literal strings without an RPC").
    pub fn get_types_platform() -> &'static str {
        "default"
    }

    pub fn get_version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

fn phase_name(phase: Phase) -> &'static str {
    match phase {
        Phase::New => "New",
        Phase::Spawning => "Spawning",
        Phase::Ready => "Ready",
        Phase::Freeing => "Freeing",
        Phase::Dead => "Dead",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent_logger() -> Logger {
        Box::new(|_status, _line| {})
    }

    #[test]
    fn new_client_starts_in_new_phase() {
        let client = Client::new(silent_logger());
        assert_eq!(client.phase(), Phase::New);
    }

    #[test]
    fn calls_requiring_ready_fail_from_new() {
        let mut client = Client::new(silent_logger());
        assert!(matches!(client.do_step(0.0, 0.1), Err(ClientError::WrongState { .. })));
        assert!(matches!(client.terminate(), Err(ClientError::WrongState { .. })));
        assert!(matches!(
            client.setup_experiment(None, 0.0, None),
            Err(ClientError::WrongState { .. })
        ));
    }

    #[test]
    fn free_instance_from_new_is_a_harmless_transition_to_dead() {
        let mut client = Client::new(silent_logger());
        assert!(client.free_instance().is_ok());
        assert_eq!(client.phase(), Phase::Dead);
    }

    #[test]
    fn get_real_on_empty_cache_returns_none() {
        let client = Client::new(silent_logger());
        assert_eq!(client.get_real(0), None);
        assert_eq!(client.get_integer(0), None);
        assert_eq!(client.get_boolean(0), None);
    }

    #[test]
    fn set_on_empty_cache_is_a_no_op() {
        let mut client = Client::new(silent_logger());
        assert!(!client.set_real(0, 1.0));
        assert!(!client.set_integer(0, 1));
        assert!(!client.set_boolean(0, true));
    }

    #[test]
    fn get_types_platform_and_version_need_no_instance() {
        assert_eq!(Client::get_types_platform(), "default");
        assert_eq!(Client::get_version(), env!("CARGO_PKG_VERSION"));
    }
}
