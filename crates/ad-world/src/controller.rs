//! Low-level vehicle controller seam.
//!
//! The controller is a pure function of the vehicle state and the target;
//! the orchestrator calls it at most once per tick.

use ad_core::{Transform, VehicleControl};

use crate::Waypoint;

/// Ego state handed to the controller.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VehicleState {
    pub transform: Transform,
    pub speed_kmh: f32,
}

pub trait Controller: Send + Sync {
    fn control(&self, state: &VehicleState, target: &Waypoint, target_speed_kmh: f32) -> VehicleControl;
}

/// Proportional speed and heading tracking.
///
/// Enough to follow a lane in tests and demos; production deployments plug
/// in the simulator's own PID controller.
#[derive(Clone, Debug)]
pub struct ProportionalController {
    pub k_speed: f32,
    pub k_steer: f32,
    pub max_throttle: f32,
    pub max_brake: f32,
    pub max_steer: f32,
}

impl Default for ProportionalController {
    fn default() -> Self {
        Self { k_speed: 0.15, k_steer: 0.8, max_throttle: 0.75, max_brake: 0.5, max_steer: 0.8 }
    }
}

impl Controller for ProportionalController {
    fn control(&self, state: &VehicleState, target: &Waypoint, target_speed_kmh: f32) -> VehicleControl {
        let mut control = VehicleControl::default();

        let speed_error = target_speed_kmh - state.speed_kmh;
        if speed_error >= 0.0 {
            control.throttle = (self.k_speed * speed_error).min(self.max_throttle);
        } else {
            control.brake = (-self.k_speed * speed_error).min(self.max_brake);
        }

        let forward = state.transform.forward_vector();
        let to_target = (target.location() - state.transform.location).normalized();
        let cross_z = forward.x * to_target.y - forward.y * to_target.x;
        let angle = cross_z.atan2(forward.dot_2d(to_target));
        control.steer = (self.k_steer * angle).clamp(-self.max_steer, self.max_steer);

        control
    }
}

/// Always returns the same control.  Test double.
#[derive(Clone, Debug, Default)]
pub struct FixedController(pub VehicleControl);

impl Controller for FixedController {
    fn control(&self, _state: &VehicleState, _target: &Waypoint, _target_speed_kmh: f32) -> VehicleControl {
        self.0
    }
}
