// SPDX-License-Identifier: MIT
//
// The model-exchange surface the adapter drives (§4.5). Kept as a trait
// rather than a concrete dynamically-loaded library so the integrator can
// be exercised against an in-memory fake (§8 "expressed against the
// MeModel/fake-model test doubles").

use remote_protocol::Status;

/// Event-info record (§3 "Co-simulation adapter state"), mirroring the
/// fields the model-exchange discrete-state iteration exchanges with the
/// wrapped model.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EventInfo {
    pub next_event_time_defined: bool,
    pub next_event_time: f64,
    pub new_discrete_states_needed: bool,
    pub terminate_simulation: bool,
    pub values_of_continuous_states_changed: bool,
}

/// The model-exchange entry points the adapter needs. A `remote-server`
/// hosting an ME-only library under the co-simulation opcode set adapts
/// its loaded library to this trait; tests exercise it against a plain
/// Rust struct.
pub trait MeModel {
    fn n_continuous_states(&self) -> usize;
    fn n_event_indicators(&self) -> usize;

    fn set_time(&mut self, t: f64) -> Status;
    fn set_continuous_states(&mut self, x: &[f64]) -> Status;
    fn get_continuous_states(&self, x: &mut [f64]) -> Status;
    fn get_derivatives(&self, dx: &mut [f64]) -> Status;
    fn get_event_indicators(&self, z: &mut [f64]) -> Status;

    /// Nominal magnitude of each continuous state, used to scale the
    /// absolute tolerance component-wise (§4.5 "Tolerances and nominals").
    /// Returns `None` when the model does not supply nominals.
    fn nominals_of_continuous_states(&self) -> Option<Vec<f64>> {
        None
    }

    /// Returns the reply status, whether the model is requesting event mode
    /// be entered, and the event-info snapshot after the call.
    fn completed_integrator_step(&mut self, no_set_fmu_state_prior: bool) -> (Status, bool, EventInfo);
    fn enter_event_mode(&mut self) -> Status;
    fn new_discrete_states(&mut self) -> (Status, EventInfo);
    fn enter_continuous_time_mode(&mut self) -> Status;

    fn reset(&mut self) -> Status;
}
