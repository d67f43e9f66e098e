// SPDX-License-Identifier: MIT
//
// Raw C ABI surface of the wrapped model library (§4.4 "Server loop").
// `LoadedModel` resolves each symbol once at `Instantiate` and holds the
// function pointers for the session's lifetime; a model's own handle is
// an opaque pointer it returns on instantiation and expects back on every
// later call (§3 "Model instance").

use std::ffi::{c_char, c_void, CStr, CString};

use ipc_platform::LoadedLibrary;
use remote_protocol::Status;

pub type Component = *mut c_void;

/// Mirrors `MeModel::EventInfo` across the C ABI boundary (§4.5).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FfiEventInfo {
    pub next_event_time_defined: i32,
    pub next_event_time: f64,
    pub new_discrete_states_needed: i32,
    pub terminate_simulation: i32,
    pub values_of_continuous_states_changed: i32,
}

impl From<FfiEventInfo> for cosim_adapter::EventInfo {
    fn from(ev: FfiEventInfo) -> Self {
        cosim_adapter::EventInfo {
            next_event_time_defined: ev.next_event_time_defined != 0,
            next_event_time: ev.next_event_time,
            new_discrete_states_needed: ev.new_discrete_states_needed != 0,
            terminate_simulation: ev.terminate_simulation != 0,
            values_of_continuous_states_changed: ev.values_of_continuous_states_changed != 0,
        }
    }
}

pub(crate) type FnInstantiate = extern "C" fn(instance_name: *const c_char) -> Component;
pub(crate) type FnFreeInstance = extern "C" fn(c: Component);
pub(crate) type FnSetupExperiment = extern "C" fn(
    c: Component,
    tolerance_defined: i32,
    tolerance: f64,
    start_time: f64,
    stop_time_defined: i32,
    stop_time: f64,
) -> i32;
pub(crate) type FnEnterInitializationMode = extern "C" fn(c: Component) -> i32;
pub(crate) type FnExitInitializationMode = extern "C" fn(c: Component) -> i32;
pub(crate) type FnTerminate = extern "C" fn(c: Component) -> i32;
pub(crate) type FnReset = extern "C" fn(c: Component) -> i32;
pub(crate) type FnSetDebugLogging =
    extern "C" fn(c: Component, logging_on: i32, n_categories: usize, categories: *const *const c_char) -> i32;

pub(crate) type FnGetReal = extern "C" fn(c: Component, vr: *const u32, nvr: usize, values: *mut f64) -> i32;
pub(crate) type FnSetReal = extern "C" fn(c: Component, vr: *const u32, nvr: usize, values: *const f64) -> i32;
pub(crate) type FnGetInteger = extern "C" fn(c: Component, vr: *const u32, nvr: usize, values: *mut i32) -> i32;
pub(crate) type FnSetInteger = extern "C" fn(c: Component, vr: *const u32, nvr: usize, values: *const i32) -> i32;
pub(crate) type FnGetBoolean = extern "C" fn(c: Component, vr: *const u32, nvr: usize, values: *mut i32) -> i32;
pub(crate) type FnSetBoolean = extern "C" fn(c: Component, vr: *const u32, nvr: usize, values: *const i32) -> i32;
pub(crate) type FnGetString = extern "C" fn(c: Component, vr: *const u32, nvr: usize, values: *mut *const c_char) -> i32;
pub(crate) type FnSetString = extern "C" fn(c: Component, vr: *const u32, nvr: usize, values: *const *const c_char) -> i32;

pub(crate) type FnGetDirectionalDerivative = extern "C" fn(
    c: Component,
    unknown_vr: *const u32,
    n_unknown: usize,
    known_vr: *const u32,
    n_known: usize,
    dv_known: *const f64,
    dv_unknown: *mut f64,
) -> i32;

pub(crate) type FnDoStep =
    extern "C" fn(c: Component, current_time: f64, step_size: f64, no_set_fmu_state_prior: i32) -> i32;

pub(crate) type FnSetTime = extern "C" fn(c: Component, t: f64) -> i32;
pub(crate) type FnSetContinuousStates = extern "C" fn(c: Component, x: *const f64, nx: usize) -> i32;
pub(crate) type FnGetContinuousStates = extern "C" fn(c: Component, x: *mut f64, nx: usize) -> i32;
pub(crate) type FnGetDerivatives = extern "C" fn(c: Component, dx: *mut f64, nx: usize) -> i32;
pub(crate) type FnGetEventIndicators = extern "C" fn(c: Component, z: *mut f64, nz: usize) -> i32;
pub(crate) type FnGetNominalsOfContinuousStates = extern "C" fn(c: Component, nominals: *mut f64, nx: usize) -> i32;
pub(crate) type FnEnterEventMode = extern "C" fn(c: Component) -> i32;
pub(crate) type FnNewDiscreteStates = extern "C" fn(c: Component, info: *mut FfiEventInfo) -> i32;
pub(crate) type FnEnterContinuousTimeMode = extern "C" fn(c: Component) -> i32;
pub(crate) type FnCompletedIntegratorStep = extern "C" fn(
    c: Component,
    no_set_fmu_state_prior: i32,
    enter_event_mode: *mut i32,
    info: *mut FfiEventInfo,
) -> i32;
pub(crate) type FnCount = extern "C" fn(c: Component) -> usize;

macro_rules! optional_symbol {
    ($lib:expr, $name:expr, $ty:ty) => {
        $lib.symbol($name).ok().map(|p| unsafe { std::mem::transmute::<_, $ty>(p) })
    };
}

/// A loaded model library plus its resolved, optional symbol table. Which
/// opcodes are servable depends on which symbols actually resolved: a
/// model exposing the model-exchange set but no `model_do_step` is hosted
/// through `cosim_adapter::Adapter` instead (§4.5).
pub struct LoadedModel {
    _library: LoadedLibrary,

    instantiate: FnInstantiate,
    free_instance: FnFreeInstance,
    setup_experiment: FnSetupExperiment,
    enter_initialization_mode: FnEnterInitializationMode,
    exit_initialization_mode: FnExitInitializationMode,
    terminate: FnTerminate,
    reset: FnReset,
    set_debug_logging: Option<FnSetDebugLogging>,

    get_real: Option<FnGetReal>,
    set_real: Option<FnSetReal>,
    get_integer: Option<FnGetInteger>,
    set_integer: Option<FnSetInteger>,
    get_boolean: Option<FnGetBoolean>,
    set_boolean: Option<FnSetBoolean>,
    get_string: Option<FnGetString>,
    set_string: Option<FnSetString>,
    get_directional_derivative: Option<FnGetDirectionalDerivative>,

    pub do_step: Option<FnDoStep>,

    pub set_time: Option<FnSetTime>,
    pub set_continuous_states: Option<FnSetContinuousStates>,
    pub get_continuous_states: Option<FnGetContinuousStates>,
    pub get_derivatives: Option<FnGetDerivatives>,
    pub get_event_indicators: Option<FnGetEventIndicators>,
    pub get_nominals_of_continuous_states: Option<FnGetNominalsOfContinuousStates>,
    pub enter_event_mode: Option<FnEnterEventMode>,
    pub new_discrete_states: Option<FnNewDiscreteStates>,
    pub enter_continuous_time_mode: Option<FnEnterContinuousTimeMode>,
    pub completed_integrator_step: Option<FnCompletedIntegratorStep>,
    pub n_continuous_states: Option<FnCount>,
    pub n_event_indicators: Option<FnCount>,
}

/// The model-exchange function pointers, copied out of `LoadedModel` by
/// value (every field is `Copy`) so `DynamicMeModel` can own its symbol
/// table instead of borrowing the `LoadedModel` it was resolved from —
/// the two end up living side by side in `Server`, which a borrow would
/// make self-referential.
#[derive(Clone, Copy)]
pub(crate) struct MeSymbols {
    pub set_time: FnSetTime,
    pub set_continuous_states: FnSetContinuousStates,
    pub get_continuous_states: FnGetContinuousStates,
    pub get_derivatives: FnGetDerivatives,
    pub get_event_indicators: FnGetEventIndicators,
    pub get_nominals_of_continuous_states: Option<FnGetNominalsOfContinuousStates>,
    pub enter_event_mode: FnEnterEventMode,
    pub new_discrete_states: FnNewDiscreteStates,
    pub enter_continuous_time_mode: FnEnterContinuousTimeMode,
    pub completed_integrator_step: FnCompletedIntegratorStep,
    pub reset: FnReset,
}

#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error(transparent)]
    Platform(#[from] ipc_platform::PlatformError),

    #[error("required symbol `{0}` not found in loaded library")]
    MissingRequiredSymbol(&'static str),
}

impl LoadedModel {
    pub fn load(path: &std::path::Path) -> Result<Self, ModelLoadError> {
        let library = LoadedLibrary::load(&path.to_string_lossy())?;

        macro_rules! required {
            ($name:expr, $ty:ty) => {
                library
                    .symbol($name)
                    .map(|p| unsafe { std::mem::transmute::<_, $ty>(p) })
                    .map_err(|_| ModelLoadError::MissingRequiredSymbol($name))?
            };
        }

        Ok(Self {
            instantiate: required!("model_instantiate", FnInstantiate),
            free_instance: required!("model_free_instance", FnFreeInstance),
            setup_experiment: required!("model_setup_experiment", FnSetupExperiment),
            enter_initialization_mode: required!("model_enter_initialization_mode", FnEnterInitializationMode),
            exit_initialization_mode: required!("model_exit_initialization_mode", FnExitInitializationMode),
            terminate: required!("model_terminate", FnTerminate),
            reset: required!("model_reset", FnReset),
            set_debug_logging: optional_symbol!(library, "model_set_debug_logging", FnSetDebugLogging),

            get_real: optional_symbol!(library, "model_get_real", FnGetReal),
            set_real: optional_symbol!(library, "model_set_real", FnSetReal),
            get_integer: optional_symbol!(library, "model_get_integer", FnGetInteger),
            set_integer: optional_symbol!(library, "model_set_integer", FnSetInteger),
            get_boolean: optional_symbol!(library, "model_get_boolean", FnGetBoolean),
            set_boolean: optional_symbol!(library, "model_set_boolean", FnSetBoolean),
            get_string: optional_symbol!(library, "model_get_string", FnGetString),
            set_string: optional_symbol!(library, "model_set_string", FnSetString),
            get_directional_derivative: optional_symbol!(
                library,
                "model_get_directional_derivative",
                FnGetDirectionalDerivative
            ),

            do_step: optional_symbol!(library, "model_do_step", FnDoStep),

            set_time: optional_symbol!(library, "model_set_time", FnSetTime),
            set_continuous_states: optional_symbol!(library, "model_set_continuous_states", FnSetContinuousStates),
            get_continuous_states: optional_symbol!(library, "model_get_continuous_states", FnGetContinuousStates),
            get_derivatives: optional_symbol!(library, "model_get_derivatives", FnGetDerivatives),
            get_event_indicators: optional_symbol!(library, "model_get_event_indicators", FnGetEventIndicators),
            get_nominals_of_continuous_states: optional_symbol!(
                library,
                "model_get_nominals_of_continuous_states",
                FnGetNominalsOfContinuousStates
            ),
            enter_event_mode: optional_symbol!(library, "model_enter_event_mode", FnEnterEventMode),
            new_discrete_states: optional_symbol!(library, "model_new_discrete_states", FnNewDiscreteStates),
            enter_continuous_time_mode: optional_symbol!(
                library,
                "model_enter_continuous_time_mode",
                FnEnterContinuousTimeMode
            ),
            completed_integrator_step: optional_symbol!(
                library,
                "model_completed_integrator_step",
                FnCompletedIntegratorStep
            ),
            n_continuous_states: optional_symbol!(library, "model_n_continuous_states", FnCount),
            n_event_indicators: optional_symbol!(library, "model_n_event_indicators", FnCount),

            _library: library,
        })
    }

    /// True when the library exposes the co-simulation `doStep` entry
    /// point directly; false means it is a model-exchange-only library
    /// that must be hosted through `cosim_adapter::Adapter` (§4.5).
    pub fn is_co_simulation_native(&self) -> bool {
        self.do_step.is_some()
    }

    /// True when the library exposes the full model-exchange set the
    /// adapter needs.
    pub fn has_model_exchange_set(&self) -> bool {
        self.set_time.is_some()
            && self.set_continuous_states.is_some()
            && self.get_continuous_states.is_some()
            && self.get_derivatives.is_some()
            && self.get_event_indicators.is_some()
            && self.enter_event_mode.is_some()
            && self.new_discrete_states.is_some()
            && self.enter_continuous_time_mode.is_some()
            && self.completed_integrator_step.is_some()
            && self.n_continuous_states.is_some()
            && self.n_event_indicators.is_some()
    }

    pub fn instantiate(&self, instance_name: &str) -> Option<Component> {
        let c_name = CString::new(instance_name).ok()?;
        let component = (self.instantiate)(c_name.as_ptr());
        if component.is_null() {
            None
        } else {
            Some(component)
        }
    }

    pub fn free_instance(&self, c: Component) {
        (self.free_instance)(c);
    }

    pub fn setup_experiment(
        &self,
        c: Component,
        tolerance: Option<f64>,
        start_time: f64,
        stop_time: Option<f64>,
    ) -> Status {
        let raw = (self.setup_experiment)(
            c,
            tolerance.is_some() as i32,
            tolerance.unwrap_or(0.0),
            start_time,
            stop_time.is_some() as i32,
            stop_time.unwrap_or(0.0),
        );
        Status::from(raw)
    }

    pub fn enter_initialization_mode(&self, c: Component) -> Status {
        Status::from((self.enter_initialization_mode)(c))
    }

    pub fn exit_initialization_mode(&self, c: Component) -> Status {
        Status::from((self.exit_initialization_mode)(c))
    }

    pub fn terminate(&self, c: Component) -> Status {
        Status::from((self.terminate)(c))
    }

    pub fn reset(&self, c: Component) -> Status {
        Status::from((self.reset)(c))
    }

    pub fn set_debug_logging(&self, c: Component, logging_on: bool, categories: &[String]) -> Status {
        let Some(f) = self.set_debug_logging else {
            return Status::Ok;
        };
        let c_categories: Vec<CString> = categories.iter().map(|s| CString::new(s.as_str()).unwrap()).collect();
        let ptrs: Vec<*const c_char> = c_categories.iter().map(|s| s.as_ptr()).collect();
        Status::from(f(c, logging_on as i32, ptrs.len(), ptrs.as_ptr()))
    }

    pub fn get_real(&self, c: Component, vr: &[u32], out: &mut [f64]) -> Status {
        match self.get_real {
            Some(f) => Status::from(f(c, vr.as_ptr(), vr.len(), out.as_mut_ptr())),
            None => Status::Error,
        }
    }

    pub fn set_real(&self, c: Component, vr: &[u32], values: &[f64]) -> Status {
        match self.set_real {
            Some(f) => Status::from(f(c, vr.as_ptr(), vr.len(), values.as_ptr())),
            None => Status::Error,
        }
    }

    pub fn get_integer(&self, c: Component, vr: &[u32], out: &mut [i32]) -> Status {
        match self.get_integer {
            Some(f) => Status::from(f(c, vr.as_ptr(), vr.len(), out.as_mut_ptr())),
            None => Status::Error,
        }
    }

    pub fn set_integer(&self, c: Component, vr: &[u32], values: &[i32]) -> Status {
        match self.set_integer {
            Some(f) => Status::from(f(c, vr.as_ptr(), vr.len(), values.as_ptr())),
            None => Status::Error,
        }
    }

    pub fn get_boolean(&self, c: Component, vr: &[u32], out: &mut [i32]) -> Status {
        match self.get_boolean {
            Some(f) => Status::from(f(c, vr.as_ptr(), vr.len(), out.as_mut_ptr())),
            None => Status::Error,
        }
    }

    pub fn set_boolean(&self, c: Component, vr: &[u32], values: &[i32]) -> Status {
        match self.set_boolean {
            Some(f) => Status::from(f(c, vr.as_ptr(), vr.len(), values.as_ptr())),
            None => Status::Error,
        }
    }

    pub fn get_string(&self, c: Component, vr: &[u32]) -> Result<(Status, Vec<String>), Status> {
        let Some(f) = self.get_string else {
            return Err(Status::Error);
        };
        let mut raw = vec![std::ptr::null(); vr.len()];
        let status = Status::from(f(c, vr.as_ptr(), vr.len(), raw.as_mut_ptr()));
        let strings = raw
            .into_iter()
            .map(|p| {
                if p.is_null() {
                    String::new()
                } else {
                    unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned()
                }
            })
            .collect();
        Ok((status, strings))
    }

    pub fn set_string(&self, c: Component, vr: &[u32], values: &[String]) -> Status {
        let Some(f) = self.set_string else {
            return Status::Error;
        };
        let c_values: Vec<CString> = values.iter().map(|s| CString::new(s.as_str()).unwrap_or_default()).collect();
        let ptrs: Vec<*const c_char> = c_values.iter().map(|s| s.as_ptr()).collect();
        Status::from(f(c, vr.as_ptr(), vr.len(), ptrs.as_ptr()))
    }

    pub fn get_directional_derivative(
        &self,
        c: Component,
        unknown_vr: &[u32],
        known_vr: &[u32],
        dv_known: &[f64],
        dv_unknown: &mut [f64],
    ) -> Status {
        match self.get_directional_derivative {
            Some(f) => Status::from(f(
                c,
                unknown_vr.as_ptr(),
                unknown_vr.len(),
                known_vr.as_ptr(),
                known_vr.len(),
                dv_known.as_ptr(),
                dv_unknown.as_mut_ptr(),
            )),
            None => Status::Error,
        }
    }

    pub fn do_step(&self, c: Component, current_time: f64, step_size: f64) -> Status {
        match self.do_step {
            Some(f) => Status::from(f(c, current_time, step_size, 0)),
            None => Status::Error,
        }
    }

    pub fn n_continuous_states(&self, c: Component) -> usize {
        self.n_continuous_states.map(|f| f(c)).unwrap_or(0)
    }

    pub fn n_event_indicators(&self, c: Component) -> usize {
        self.n_event_indicators.map(|f| f(c)).unwrap_or(0)
    }

    /// Copies out the model-exchange symbol table. Panics if
    /// `has_model_exchange_set()` was not checked first — a caller bug,
    /// not a model failure.
    pub(crate) fn me_symbols(&self) -> MeSymbols {
        MeSymbols {
            set_time: self.set_time.expect("checked by has_model_exchange_set"),
            set_continuous_states: self.set_continuous_states.expect("checked by has_model_exchange_set"),
            get_continuous_states: self.get_continuous_states.expect("checked by has_model_exchange_set"),
            get_derivatives: self.get_derivatives.expect("checked by has_model_exchange_set"),
            get_event_indicators: self.get_event_indicators.expect("checked by has_model_exchange_set"),
            get_nominals_of_continuous_states: self.get_nominals_of_continuous_states,
            enter_event_mode: self.enter_event_mode.expect("checked by has_model_exchange_set"),
            new_discrete_states: self.new_discrete_states.expect("checked by has_model_exchange_set"),
            enter_continuous_time_mode: self.enter_continuous_time_mode.expect("checked by has_model_exchange_set"),
            completed_integrator_step: self.completed_integrator_step.expect("checked by has_model_exchange_set"),
            reset: self.reset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_a_missing_library_reports_platform_error() {
        let path = std::path::Path::new("/nonexistent/path/to/libmodel.so");
        let result = LoadedModel::load(path);
        assert!(matches!(result, Err(ModelLoadError::Platform(_))));
    }
}
