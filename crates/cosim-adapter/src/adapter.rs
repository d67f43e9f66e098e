// SPDX-License-Identifier: MIT
//
// The `DoStep(t, h)` co-simulation surface (§4.5 "Step algorithm"), built
// on top of `MeModel` and the internal adaptive integrator.

use std::cell::RefCell;

use nalgebra::DVector;

use remote_protocol::Status;

use crate::integrator::{self, DEFAULT_REL_TOL};
use crate::model::{EventInfo, MeModel};

struct IntegratorState {
    x: DVector<f64>,
    event_info: EventInfo,
}

/// Wraps a model-exchange model and presents a co-simulation `do_step`.
/// Integrator state is lazily (re)initialized: absent right after
/// construction and after `reset()`, populated on first use (§9 "Reset
/// MUST reinitialize the integrator on the next step").
pub struct Adapter<M: MeModel> {
    model: M,
    rel_tol: f64,
    state: Option<IntegratorState>,
}

impl<M: MeModel> Adapter<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            rel_tol: DEFAULT_REL_TOL,
            state: None,
        }
    }

    pub fn with_relative_tolerance(model: M, rel_tol: f64) -> Self {
        Self {
            model,
            rel_tol,
            state: None,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    fn abs_tol(&self, nx: usize) -> DVector<f64> {
        match self.model.nominals_of_continuous_states() {
            Some(nominals) if nominals.len() == nx => {
                DVector::from_iterator(nx, nominals.iter().map(|n| self.rel_tol * n.abs().max(1.0)))
            }
            _ => DVector::from_element(nx, self.rel_tol),
        }
    }

    fn ensure_initialized(&mut self) -> IntegratorState {
        let nx = self.model.n_continuous_states();
        let mut x = vec![0.0; nx];
        self.model.get_continuous_states(&mut x);
        IntegratorState {
            x: DVector::from_vec(x),
            event_info: EventInfo::default(),
        }
    }

    /// Reruns event handling until the model stops requesting another
    /// discrete-state iteration (§4.5 step 5).
    fn run_event_iteration(&mut self, t: f64, x: &mut DVector<f64>) -> Result<EventInfo, Status> {
        let status = self.model.enter_event_mode();
        if status.is_failure() {
            return Err(status);
        }

        let mut event_info = EventInfo::default();
        loop {
            let (status, ev) = self.model.new_discrete_states();
            if status.is_failure() {
                return Err(status);
            }
            event_info = ev;
            if !ev.new_discrete_states_needed || ev.terminate_simulation {
                break;
            }
        }

        let status = self.model.enter_continuous_time_mode();
        if status.is_failure() {
            return Err(status);
        }

        let nx = self.model.n_continuous_states();
        if nx > 0 && event_info.values_of_continuous_states_changed {
            let mut fresh = vec![0.0; nx];
            self.model.get_continuous_states(&mut fresh);
            *x = DVector::from_vec(fresh);
        }
        Ok(event_info)
    }

    /// Advances the model from `t0` to `t0 + h` (§4.5 "Step algorithm").
    /// `DoStep(t, 0)` is a no-op returning `Ok` without mutating state
    /// (§8 invariant 6).
    pub fn do_step(&mut self, t0: f64, h: f64) -> Status {
        if h == 0.0 {
            return Status::Ok;
        }

        let nx = self.model.n_continuous_states();
        let nz = self.model.n_event_indicators();

        let mut current = match self.state.take() {
            Some(s) => s,
            None => self.ensure_initialized(),
        };

        let t_end = t0 + h;
        let eps = (1.0 + t_end.abs()) * 1e-14;
        let mut t = t0;
        let mut last_status = Status::Ok;

        while t + eps < t_end {
            let mut t_out = t_end;
            if current.event_info.next_event_time_defined && current.event_info.next_event_time < t_end {
                t_out = current.event_info.next_event_time;
            }

            let abs_tol = self.abs_tol(nx);

            // Both closures below need `&mut self.model`; since `integrate_to`
            // holds them concurrently (it alternates calling one then the
            // other), they share a `RefCell` instead of each capturing a
            // distinct `&mut` — the borrows never actually overlap because
            // the adapter is single-threaded and cooperative (§5).
            let model_cell = RefCell::new(&mut self.model);
            let derivative = |t: f64, x: &DVector<f64>| {
                let mut model = model_cell.borrow_mut();
                model.set_time(t);
                if !x.is_empty() {
                    model.set_continuous_states(x.as_slice());
                }
                let mut dx = vec![0.0; x.len()];
                model.get_derivatives(&mut dx);
                DVector::from_vec(dx)
            };
            let root = |t: f64, x: &DVector<f64>| {
                let mut model = model_cell.borrow_mut();
                model.set_time(t);
                if !x.is_empty() {
                    model.set_continuous_states(x.as_slice());
                }
                let mut z = vec![0.0; nz];
                model.get_event_indicators(&mut z);
                DVector::from_vec(z)
            };

            let result = if nz > 0 {
                integrator::integrate_to(t, &current.x, t_out, self.rel_tol, &abs_tol, derivative, Some(root))
            } else {
                integrator::integrate_to::<_, fn(f64, &DVector<f64>) -> DVector<f64>>(
                    t,
                    &current.x,
                    t_out,
                    self.rel_tol,
                    &abs_tol,
                    derivative,
                    None,
                )
            };

            let result = match result {
                Some(r) => r,
                None => {
                    self.state = Some(current);
                    return Status::Error;
                }
            };

            t = result.t;
            current.x = result.x;

            let status = self.model.set_time(t);
            if status.is_failure() {
                self.state = Some(current);
                return status;
            }
            if nx > 0 {
                let status = self.model.set_continuous_states(current.x.as_slice());
                if status.is_failure() {
                    self.state = Some(current);
                    return status;
                }
            }

            let (status, enter_event_mode, ev) = self.model.completed_integrator_step(false);
            if status.is_failure() {
                self.state = Some(current);
                return status;
            }
            if ev.terminate_simulation {
                self.state = Some(current);
                return Status::Error;
            }
            last_status = status;

            let time_event = current.event_info.next_event_time_defined
                && (current.event_info.next_event_time - t).abs() <= eps;
            if result.hit_root || enter_event_mode || time_event {
                match self.run_event_iteration(t, &mut current.x) {
                    Ok(ev) => current.event_info = ev,
                    Err(status) => {
                        self.state = Some(current);
                        return status;
                    }
                }
            } else {
                current.event_info = ev;
            }
        }

        self.state = Some(current);
        last_status
    }

    /// `Reset` (§4.5 "Reset"): forwards to the model, discards integrator
    /// state so the next `do_step` lazily reinitializes it.
    pub fn reset(&mut self) -> Status {
        let status = self.model.reset();
        self.state = None;
        status
    }
}
