// SPDX-License-Identifier: MIT
//
// Server loop (§4.4 "Server loop"): `Started -> Joined -> DispatchLoop ->
// Exiting`. Reads one opcode per iteration, dispatches to the loaded
// model (directly, or through `cosim_adapter::Adapter` for an
// model-exchange-only library), writes the reply, signals the client.

use cosim_adapter::Adapter;
use remote_protocol::{Opcode, Status, Transport};

use crate::adapter_bridge::DynamicMeModel;
use crate::ffi_model::{Component, LoadedModel};

enum CoSimulationPath {
    /// The loaded library exposes `doStep` directly.
    Native,
    /// The loaded library is model-exchange-only; `DoStep` is synthesized
    /// by the adapter (§4.5).
    Adapted(Box<Adapter<DynamicMeModel>>),
}

pub struct Server {
    transport: Transport,
    parent_pid: u32,
    model: LoadedModel,
    component: Option<Component>,
    path: Option<CoSimulationPath>,
    exiting: bool,
}

impl Server {
    pub fn new(transport: Transport, parent_pid: u32, model: LoadedModel) -> Self {
        Self {
            transport,
            parent_pid,
            model,
            component: None,
            path: None,
            exiting: false,
        }
    }

    /// Runs the dispatch loop until `FreeInstance` sets the exit flag or
    /// the parent process disappears (§4.4).
    pub fn run(&mut self) -> crate::error::Result<()> {
        self.transport.wait_for_client_startup()?;
        self.transport.signal_server_ready()?;

        while !self.exiting {
            let parent_pid = self.parent_pid;
            let opcode = self
                .transport
                .server_wait_for_request(|| ipc_platform::pid_is_alive(parent_pid))?;
            let Some(opcode) = opcode else {
                tracing::info!("parent process exited, shutting down");
                break;
            };

            let status = self.dispatch(opcode);
            self.transport.server_reply(status)?;
        }
        Ok(())
    }

    fn log(&mut self, line: &str) {
        self.transport.header_mut().push_log_line(line);
    }

    fn unreachable(&mut self, opcode: Opcode) -> Status {
        self.log(&format!("Function {} unreachable.", opcode.name()));
        Status::Error
    }

    fn dispatch(&mut self, opcode: Opcode) -> Status {
        if opcode.is_state_serialization() || opcode.is_local_only() {
            return self.unreachable(opcode);
        }

        self.push_pending_reals();

        match opcode {
            Opcode::SetDebugLogging => self.handle_set_debug_logging(),
            Opcode::Instantiate => self.handle_instantiate(),
            Opcode::FreeInstance => self.handle_free_instance(),
            Opcode::SetupExperiment => self.handle_setup_experiment(),
            Opcode::EnterInitializationMode => self.with_component(|m, c| m.enter_initialization_mode(c)),
            Opcode::ExitInitializationMode => self.handle_exit_initialization_mode(),
            Opcode::Terminate => self.with_component(|m, c| m.terminate(c)),
            Opcode::Reset => self.handle_reset(),
            Opcode::GetReal => self.handle_get_real(),
            Opcode::SetReal => self.handle_set_real(),
            Opcode::GetInteger => self.handle_get_integer(),
            Opcode::SetInteger => self.handle_set_integer(),
            Opcode::GetBoolean => self.handle_get_boolean(),
            Opcode::SetBoolean => self.handle_set_boolean(),
            Opcode::GetString => self.handle_get_string(),
            Opcode::SetString => self.handle_set_string(),
            Opcode::GetDirectionalDerivative => self.handle_get_directional_derivative(),
            Opcode::DoStep => self.handle_do_step(),
            Opcode::CancelStep => self.unreachable(opcode),
            Opcode::GetStatus
            | Opcode::GetRealStatus
            | Opcode::GetIntegerStatus
            | Opcode::GetBooleanStatus
            | Opcode::GetStringStatus => self.unreachable(opcode),
            // The model-exchange operation set is only reachable directly
            // when the client is itself driving ME mode over this bridge;
            // in the co-simulation hosting scenario these are internal to
            // the adapter and never dispatched from the wire.
            Opcode::EnterEventMode
            | Opcode::NewDiscreteStates
            | Opcode::EnterContinuousTimeMode
            | Opcode::CompletedIntegratorStep
            | Opcode::SetTime
            | Opcode::SetContinuousStates
            | Opcode::GetDerivatives
            | Opcode::GetEventIndicators
            | Opcode::GetContinuousStates
            | Opcode::GetNominalsOfContinuousStates
            | Opcode::SetRealInputDerivatives
            | Opcode::GetRealOutputDerivatives => self.unreachable(opcode),
            Opcode::GetTypesPlatform | Opcode::GetVersion | Opcode::GetFMUstate | Opcode::SetFMUstate
            | Opcode::FreeFMUstate | Opcode::SerializedFMUstateSize | Opcode::SerializeFMUstate
            | Opcode::DeSerializeFMUstate => self.unreachable(opcode),
        }
    }

    /// Applies any reals the client staged into the shared region since the
    /// last dispatch (the client marks a slot dirty in its local cache and
    /// lets the next RPC of any kind carry it across, §4.3) to the model,
    /// then clears the flags it consumed. The client never sends an
    /// explicit `SetReal`, so this is the only place those values reach
    /// the model (§3 "changed" flag array).
    fn push_pending_reals(&mut self) {
        let Some(component) = self.component else {
            return;
        };

        let changed = self.transport.real_changed();
        let dirty: Vec<u32> = changed
            .iter()
            .enumerate()
            .filter(|&(_, &flag)| flag != 0)
            .map(|(i, _)| i as u32)
            .collect();
        if dirty.is_empty() {
            return;
        }

        let values = self.transport.real_values();
        let dirty_values: Vec<f64> = dirty.iter().map(|&vr| values[vr as usize]).collect();
        if self.model.set_real(component, &dirty, &dirty_values).is_failure() {
            self.log("model rejected a real value staged by the client");
        }

        let changed = self.transport.real_changed();
        for &vr in &dirty {
            changed[vr as usize] = 0;
        }
    }

    fn with_component(&mut self, f: impl FnOnce(&LoadedModel, Component) -> Status) -> Status {
        match self.component {
            Some(c) => f(&self.model, c),
            None => {
                self.log("no live model instance");
                Status::Error
            }
        }
    }

    fn handle_set_debug_logging(&mut self) -> Status {
        let logging_on = self.transport.header().scratch_i[0] != 0;
        let n_categories = self.transport.header().scratch_i[1] as usize;
        let categories = self.transport.read_strings(n_categories);
        self.model
            .set_debug_logging(self.component.unwrap_or(std::ptr::null_mut()), logging_on, &categories)
    }

    fn handle_instantiate(&mut self) -> Status {
        let name = self.transport.read_strings(1).into_iter().next().unwrap_or_default();
        match self.model.instantiate(&name) {
            Some(component) => {
                self.component = Some(component);
                self.path = Some(if self.model.is_co_simulation_native() {
                    CoSimulationPath::Native
                } else if self.model.has_model_exchange_set() {
                    let nx = self.model.n_continuous_states(component);
                    let nz = self.model.n_event_indicators(component);
                    let me_model = DynamicMeModel::new(self.model.me_symbols(), component, nx, nz);
                    CoSimulationPath::Adapted(Box::new(Adapter::new(me_model)))
                } else {
                    self.log("loaded library exposes neither doStep nor the full model-exchange set");
                    return Status::Error;
                });
                Status::Ok
            }
            None => {
                self.log("model_instantiate returned a null component");
                Status::Error
            }
        }
    }

    fn handle_free_instance(&mut self) -> Status {
        if let Some(c) = self.component.take() {
            self.model.free_instance(c);
        }
        self.path = None;
        self.exiting = true;
        Status::Ok
    }

    fn handle_setup_experiment(&mut self) -> Status {
        let header = self.transport.header();
        let tolerance = (header.scratch_i[0] != 0).then_some(header.scratch_f[0]);
        let start_time = header.scratch_f[1];
        let stop_time = (header.scratch_i[1] != 0).then_some(header.scratch_f[2]);
        self.with_component(|m, c| m.setup_experiment(c, tolerance, start_time, stop_time))
    }

    fn handle_exit_initialization_mode(&mut self) -> Status {
        let status = self.with_component(|m, c| m.exit_initialization_mode(c));
        if !status.is_failure() {
            self.refresh_variables_from_model();
        }
        status
    }

    /// Pulls the model's current real/integer/boolean values into the
    /// shared region so a subsequent `GetReal`/`GetInteger`/`GetBoolean`
    /// serves fresh data instead of whatever was last written (§3
    /// invariant 3). Called once initialization completes and after every
    /// successful `DoStep`.
    fn refresh_variables_from_model(&mut self) {
        let Some(component) = self.component else {
            return;
        };

        let n_real = self.transport.real_values().len();
        if n_real > 0 {
            let vr: Vec<u32> = (0..n_real as u32).collect();
            let mut out = vec![0.0; n_real];
            if !self.model.get_real(component, &vr, &mut out).is_failure() {
                self.transport.real_values_mut().copy_from_slice(&out);
            }
        }

        let n_integer = self.transport.integer_values().len();
        if n_integer > 0 {
            let vr: Vec<u32> = (0..n_integer as u32).collect();
            let mut out = vec![0; n_integer];
            if !self.model.get_integer(component, &vr, &mut out).is_failure() {
                self.transport.set_integer_values(&out);
            }
        }

        let n_boolean = self.transport.boolean_values().len();
        if n_boolean > 0 {
            let vr: Vec<u32> = (0..n_boolean as u32).collect();
            let mut out = vec![0; n_boolean];
            if !self.model.get_boolean(component, &vr, &mut out).is_failure() {
                let bools: Vec<bool> = out.iter().map(|&v| v != 0).collect();
                self.transport.set_boolean_values(&bools);
            }
        }
    }

    fn handle_reset(&mut self) -> Status {
        if let Some(CoSimulationPath::Adapted(adapter)) = &mut self.path {
            return adapter.reset();
        }
        self.with_component(|m, c| m.reset(c))
    }

    fn handle_get_real(&mut self) -> Status {
        let n = self.transport.real_values().len();
        let vr: Vec<u32> = (0..n as u32).collect();
        let mut out = vec![0.0; n];
        let status = self.with_component(|m, c| m.get_real(c, &vr, &mut out));
        self.transport.real_values_mut().copy_from_slice(&out);
        status
    }

    fn handle_set_real(&mut self) -> Status {
        let values = self.transport.real_values().to_vec();
        let vr: Vec<u32> = (0..values.len() as u32).collect();
        self.with_component(|m, c| m.set_real(c, &vr, &values))
    }

    fn handle_get_integer(&mut self) -> Status {
        let n = self.transport.integer_values().len();
        let vr: Vec<u32> = (0..n as u32).collect();
        let mut out = vec![0; n];
        let status = self.with_component(|m, c| m.get_integer(c, &vr, &mut out));
        self.transport.set_integer_values(&out);
        status
    }

    fn handle_set_integer(&mut self) -> Status {
        let values = self.transport.integer_values();
        let vr: Vec<u32> = (0..values.len() as u32).collect();
        self.with_component(|m, c| m.set_integer(c, &vr, &values))
    }

    fn handle_get_boolean(&mut self) -> Status {
        let n = self.transport.boolean_values().len();
        let vr: Vec<u32> = (0..n as u32).collect();
        let mut out = vec![0; n];
        let status = self.with_component(|m, c| m.get_boolean(c, &vr, &mut out));
        let bools: Vec<bool> = out.iter().map(|&v| v != 0).collect();
        self.transport.set_boolean_values(&bools);
        status
    }

    fn handle_set_boolean(&mut self) -> Status {
        let values: Vec<i32> = self
            .transport
            .boolean_values()
            .into_iter()
            .map(|b| b as i32)
            .collect();
        let vr: Vec<u32> = (0..values.len() as u32).collect();
        self.with_component(|m, c| m.set_boolean(c, &vr, &values))
    }

    fn handle_get_string(&mut self) -> Status {
        let n_vr = self.transport.header().scratch_i[0] as usize;
        let vr: Vec<u32> = (0..n_vr as u32).collect();
        let component = match self.component {
            Some(c) => c,
            None => {
                self.log("no live model instance");
                return Status::Error;
            }
        };
        match self.model.get_string(component, &vr) {
            Ok((status, strings)) => {
                let refs: Vec<&str> = strings.iter().map(|s| s.as_str()).collect();
                if self.transport.write_strings(&refs).is_err() {
                    self.log("GetString result exceeds string slot capacity");
                    return Status::Error;
                }
                status
            }
            Err(status) => status,
        }
    }

    fn handle_set_string(&mut self) -> Status {
        let n_vr = self.transport.header().scratch_i[0] as usize;
        let vr: Vec<u32> = (0..n_vr as u32).collect();
        let values = self.transport.read_strings(n_vr);
        self.with_component(|m, c| m.set_string(c, &vr, &values))
    }

    fn handle_get_directional_derivative(&mut self) -> Status {
        let header = self.transport.header();
        let n_unknown = header.scratch_i[0] as usize;
        let n_known = header.scratch_i[1] as usize;
        let varbuf = self.transport.read_varbuf().to_vec();
        if varbuf.len() < n_unknown + n_known + n_known {
            self.log("GetDirectionalDerivative varbuf payload too short");
            return Status::Error;
        }
        let unknown_vr: Vec<u32> = varbuf[..n_unknown].iter().map(|&v| v as u32).collect();
        let known_vr: Vec<u32> = varbuf[n_unknown..n_unknown + n_known].iter().map(|&v| v as u32).collect();
        let dv_known = &varbuf[n_unknown + n_known..n_unknown + 2 * n_known];
        let mut dv_unknown = vec![0.0; n_unknown];
        let status =
            self.with_component(|m, c| m.get_directional_derivative(c, &unknown_vr, &known_vr, dv_known, &mut dv_unknown));
        if self.transport.write_varbuf(&dv_unknown).is_err() {
            self.log("GetDirectionalDerivative result exceeds varbuf capacity");
            return Status::Error;
        }
        status
    }

    fn handle_do_step(&mut self) -> Status {
        let header = self.transport.header();
        let current_time = header.scratch_f[0];
        let step_size = header.scratch_f[1];

        if matches!(self.path, Some(CoSimulationPath::Native)) {
            let status = match self.component {
                Some(c) => self.model.do_step(c, current_time, step_size),
                None => {
                    self.log("DoStep called before Instantiate");
                    return Status::Error;
                }
            };
            if !status.is_failure() {
                self.refresh_variables_from_model();
            }
            return status;
        }

        if let Some(CoSimulationPath::Adapted(adapter)) = &mut self.path {
            let status = adapter.do_step(current_time, step_size);
            if !status.is_failure() {
                self.refresh_variables_from_model();
            }
            return status;
        }

        self.log("DoStep called before Instantiate");
        Status::Error
    }
}

