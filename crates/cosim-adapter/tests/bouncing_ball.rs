// SPDX-License-Identifier: MIT
//
// Exercises the adapter against a two-state bouncing-ball fixture: height
// and velocity under gravity, with an event indicator on height crossing
// zero and a velocity-reversal event handler (§8 scenario S4).

use cosim_adapter::{Adapter, EventInfo, MeModel};
use remote_protocol::Status;

const GRAVITY: f64 = 9.81;
const RESTITUTION: f64 = 0.8;

struct BouncingBall {
    h: f64,
    v: f64,
    pending_bounce: bool,
}

impl BouncingBall {
    fn new(h0: f64) -> Self {
        Self {
            h: h0,
            v: 0.0,
            pending_bounce: false,
        }
    }
}

impl MeModel for BouncingBall {
    fn n_continuous_states(&self) -> usize {
        2
    }

    fn n_event_indicators(&self) -> usize {
        1
    }

    fn set_time(&mut self, _t: f64) -> Status {
        Status::Ok
    }

    fn set_continuous_states(&mut self, x: &[f64]) -> Status {
        self.h = x[0];
        self.v = x[1];
        Status::Ok
    }

    fn get_continuous_states(&self, x: &mut [f64]) -> Status {
        x[0] = self.h;
        x[1] = self.v;
        Status::Ok
    }

    fn get_derivatives(&self, dx: &mut [f64]) -> Status {
        dx[0] = self.v;
        dx[1] = -GRAVITY;
        Status::Ok
    }

    fn get_event_indicators(&self, z: &mut [f64]) -> Status {
        z[0] = self.h;
        Status::Ok
    }

    fn completed_integrator_step(&mut self, _no_set_fmu_state_prior: bool) -> (Status, bool, EventInfo) {
        let enter_event_mode = self.h <= 0.0 && self.v < 0.0;
        if enter_event_mode {
            self.pending_bounce = true;
        }
        (Status::Ok, enter_event_mode, EventInfo::default())
    }

    fn enter_event_mode(&mut self) -> Status {
        Status::Ok
    }

    fn new_discrete_states(&mut self) -> (Status, EventInfo) {
        if self.pending_bounce {
            self.v = -self.v * RESTITUTION;
            self.h = 0.0;
            self.pending_bounce = false;
            return (
                Status::Ok,
                EventInfo {
                    values_of_continuous_states_changed: true,
                    ..Default::default()
                },
            );
        }
        (Status::Ok, EventInfo::default())
    }

    fn enter_continuous_time_mode(&mut self) -> Status {
        Status::Ok
    }

    fn reset(&mut self) -> Status {
        self.h = 1.0;
        self.v = 0.0;
        self.pending_bounce = false;
        Status::Ok
    }
}

#[test]
fn ball_bounces_and_stays_nonnegative() {
    let mut adapter = Adapter::new(BouncingBall::new(1.0));

    let mut t = 0.0;
    for _ in 0..50 {
        let status = adapter.do_step(t, 0.1);
        assert_eq!(status, Status::Ok);
        t += 0.1;
        assert!(adapter.model().h >= -1e-6, "height must not go meaningfully negative");
    }
}

#[test]
fn zero_length_step_is_a_no_op() {
    let mut adapter = Adapter::new(BouncingBall::new(2.0));
    adapter.do_step(0.0, 0.1); // populate integrator state
    let h_before = adapter.model().h;
    let v_before = adapter.model().v;

    let status = adapter.do_step(1.0, 0.0);
    assert_eq!(status, Status::Ok);
    assert_eq!(adapter.model().h, h_before);
    assert_eq!(adapter.model().v, v_before);
}

#[test]
fn reset_discards_integrator_state_for_next_step() {
    let mut adapter = Adapter::new(BouncingBall::new(1.0));
    adapter.do_step(0.0, 0.5);
    assert_eq!(adapter.reset(), Status::Ok);
    assert_eq!(adapter.model().h, 1.0);

    // The next step must reinitialize cleanly rather than reuse stale state.
    let status = adapter.do_step(0.0, 0.1);
    assert_eq!(status, Status::Ok);
}
