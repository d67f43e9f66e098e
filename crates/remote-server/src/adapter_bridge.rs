// SPDX-License-Identifier: MIT
//
// Adapts a loaded model-exchange-only library to `cosim_adapter::MeModel`
// so `remote-server` can host it under the co-simulation opcode set
// (§4.5 "remote-server adapts a loaded dynamic library to MeModel").
//
// Owns a copy of the relevant function pointers (`MeSymbols`, all `Copy`)
// rather than borrowing `LoadedModel`: the adapter and the model it was
// built from end up stored side by side in `Server`, and borrowing would
// make that struct self-referential.

use cosim_adapter::{EventInfo, MeModel};
use remote_protocol::Status;

use crate::ffi_model::{Component, FfiEventInfo, MeSymbols};

pub struct DynamicMeModel {
    symbols: MeSymbols,
    component: Component,
    nx: usize,
    nz: usize,
}

impl DynamicMeModel {
    pub fn new(symbols: MeSymbols, component: Component, nx: usize, nz: usize) -> Self {
        Self {
            symbols,
            component,
            nx,
            nz,
        }
    }
}

impl MeModel for DynamicMeModel {
    fn n_continuous_states(&self) -> usize {
        self.nx
    }

    fn n_event_indicators(&self) -> usize {
        self.nz
    }

    fn set_time(&mut self, t: f64) -> Status {
        Status::from((self.symbols.set_time)(self.component, t))
    }

    fn set_continuous_states(&mut self, x: &[f64]) -> Status {
        Status::from((self.symbols.set_continuous_states)(self.component, x.as_ptr(), x.len()))
    }

    fn get_continuous_states(&self, x: &mut [f64]) -> Status {
        Status::from((self.symbols.get_continuous_states)(self.component, x.as_mut_ptr(), x.len()))
    }

    fn get_derivatives(&self, dx: &mut [f64]) -> Status {
        Status::from((self.symbols.get_derivatives)(self.component, dx.as_mut_ptr(), dx.len()))
    }

    fn get_event_indicators(&self, z: &mut [f64]) -> Status {
        Status::from((self.symbols.get_event_indicators)(self.component, z.as_mut_ptr(), z.len()))
    }

    fn nominals_of_continuous_states(&self) -> Option<Vec<f64>> {
        let f = self.symbols.get_nominals_of_continuous_states?;
        let mut nominals = vec![0.0; self.nx];
        let status = Status::from(f(self.component, nominals.as_mut_ptr(), nominals.len()));
        if status.is_failure() {
            None
        } else {
            Some(nominals)
        }
    }

    fn completed_integrator_step(&mut self, no_set_fmu_state_prior: bool) -> (Status, bool, EventInfo) {
        let mut enter_event_mode: i32 = 0;
        let mut info = FfiEventInfo::default();
        let status = Status::from((self.symbols.completed_integrator_step)(
            self.component,
            no_set_fmu_state_prior as i32,
            &mut enter_event_mode,
            &mut info,
        ));
        (status, enter_event_mode != 0, info.into())
    }

    fn enter_event_mode(&mut self) -> Status {
        Status::from((self.symbols.enter_event_mode)(self.component))
    }

    fn new_discrete_states(&mut self) -> (Status, EventInfo) {
        let mut info = FfiEventInfo::default();
        let status = Status::from((self.symbols.new_discrete_states)(self.component, &mut info));
        (status, info.into())
    }

    fn enter_continuous_time_mode(&mut self) -> Status {
        Status::from((self.symbols.enter_continuous_time_mode)(self.component))
    }

    fn reset(&mut self) -> Status {
        Status::from((self.symbols.reset)(self.component))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A stand-in "loaded library": a single continuous state (height),
    // exposed through the same raw C-ABI function pointer shapes
    // `LoadedModel` resolves via `dlsym`. Each test instance gets its own
    // `Component`, a boxed `f64`, so concurrently-run tests don't share
    // mutable state through the stub symbols.
    fn new_component(initial_height: f64) -> Component {
        Box::into_raw(Box::new(initial_height)) as Component
    }

    unsafe fn free_component(c: Component) {
        drop(Box::from_raw(c as *mut f64));
    }

    extern "C" fn stub_set_time(_c: Component, _t: f64) -> i32 {
        0
    }
    extern "C" fn stub_set_continuous_states(c: Component, x: *const f64, nx: usize) -> i32 {
        let slice = unsafe { std::slice::from_raw_parts(x, nx) };
        unsafe { *(c as *mut f64) = slice[0] };
        0
    }
    extern "C" fn stub_get_continuous_states(c: Component, x: *mut f64, nx: usize) -> i32 {
        let slice = unsafe { std::slice::from_raw_parts_mut(x, nx) };
        slice[0] = unsafe { *(c as *const f64) };
        0
    }
    extern "C" fn stub_get_derivatives(_c: Component, dx: *mut f64, nx: usize) -> i32 {
        let slice = unsafe { std::slice::from_raw_parts_mut(dx, nx) };
        slice[0] = -9.81;
        0
    }
    extern "C" fn stub_get_event_indicators(c: Component, z: *mut f64, nz: usize) -> i32 {
        let slice = unsafe { std::slice::from_raw_parts_mut(z, nz) };
        slice[0] = unsafe { *(c as *const f64) };
        0
    }
    extern "C" fn stub_enter_event_mode(_c: Component) -> i32 {
        0
    }
    extern "C" fn stub_new_discrete_states(_c: Component, info: *mut FfiEventInfo) -> i32 {
        unsafe { *info = FfiEventInfo::default() };
        0
    }
    extern "C" fn stub_enter_continuous_time_mode(_c: Component) -> i32 {
        0
    }
    extern "C" fn stub_completed_integrator_step(
        c: Component,
        _no_set_fmu_state_prior: i32,
        enter_event_mode: *mut i32,
        info: *mut FfiEventInfo,
    ) -> i32 {
        unsafe {
            *enter_event_mode = (*(c as *const f64) <= 0.0) as i32;
            *info = FfiEventInfo::default();
        }
        0
    }
    extern "C" fn stub_reset(c: Component) -> i32 {
        unsafe { *(c as *mut f64) = 1.0 };
        0
    }

    fn stub_symbols() -> MeSymbols {
        MeSymbols {
            set_time: stub_set_time,
            set_continuous_states: stub_set_continuous_states,
            get_continuous_states: stub_get_continuous_states,
            get_derivatives: stub_get_derivatives,
            get_event_indicators: stub_get_event_indicators,
            get_nominals_of_continuous_states: None,
            enter_event_mode: stub_enter_event_mode,
            new_discrete_states: stub_new_discrete_states,
            enter_continuous_time_mode: stub_enter_continuous_time_mode,
            completed_integrator_step: stub_completed_integrator_step,
            reset: stub_reset,
        }
    }

    #[test]
    fn dynamic_model_forwards_state_through_raw_symbols() {
        let component = new_component(1.0);
        let mut model = DynamicMeModel::new(stub_symbols(), component, 1, 1);

        assert_eq!(model.n_continuous_states(), 1);
        assert_eq!(model.set_continuous_states(&[2.5]), Status::Ok);

        let mut x = [0.0];
        assert_eq!(model.get_continuous_states(&mut x), Status::Ok);
        assert_eq!(x[0], 2.5);

        let mut z = [0.0];
        assert_eq!(model.get_event_indicators(&mut z), Status::Ok);
        assert_eq!(z[0], 2.5);

        unsafe { free_component(component) };
    }

    #[test]
    fn reset_delegates_to_the_raw_reset_symbol() {
        let component = new_component(99.0);
        let mut model = DynamicMeModel::new(stub_symbols(), component, 1, 1);
        assert_eq!(model.reset(), Status::Ok);

        let mut x = [0.0];
        model.get_continuous_states(&mut x);
        assert_eq!(x[0], 1.0);

        unsafe { free_component(component) };
    }

    #[test]
    fn nominals_are_none_when_the_optional_symbol_is_absent() {
        let component = new_component(1.0);
        let model = DynamicMeModel::new(stub_symbols(), component, 1, 1);
        assert_eq!(model.nominals_of_continuous_states(), None);
        unsafe { free_component(component) };
    }

    #[test]
    fn completed_integrator_step_reports_event_once_height_is_nonpositive() {
        let component = new_component(0.1);
        let mut model = DynamicMeModel::new(stub_symbols(), component, 1, 1);
        let (status, enter_event_mode, _info) = model.completed_integrator_step(false);
        assert_eq!(status, Status::Ok);
        assert!(!enter_event_mode);

        model.set_continuous_states(&[-0.1]);
        let (status, enter_event_mode, _info) = model.completed_integrator_step(false);
        assert_eq!(status, Status::Ok);
        assert!(enter_event_mode);

        unsafe { free_component(component) };
    }
}
