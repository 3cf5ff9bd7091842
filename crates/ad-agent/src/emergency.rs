//! Bounded braking policy used when a tick enters `EMERGENCY`.

use tracing::debug;

use ad_core::{AgentRng, HazardSet, VehicleControl};

use crate::settings::EmergencySettings;

/// Turn `base` into an emergency stop.
///
/// With `ignore_percentage` chance the planner's control is kept as is.
/// Otherwise throttle is cut, the brake goes to `max_brake`, the hand brake
/// follows the settings (flipped with `hand_brake_modify_chance`) and the
/// steering is optionally randomised within `random_steer_range`.
pub fn emergency_control(
    base: VehicleControl,
    hazards: &HazardSet,
    settings: &EmergencySettings,
    rng: &mut AgentRng,
) -> VehicleControl {
    if settings.ignore_percentage > 0.0 && rng.gen_bool(settings.ignore_percentage / 100.0) {
        debug!(%hazards, "emergency ignored");
        return base;
    }

    let mut control = base;
    control.throttle = 0.0;
    control.brake = settings.max_brake;

    control.hand_brake = settings.hand_brake;
    if settings.hand_brake_modify_chance > 0.0 && rng.gen_bool(settings.hand_brake_modify_chance / 100.0) {
        control.hand_brake = !control.hand_brake;
    }

    if settings.do_random_steering {
        let [lo, hi] = settings.random_steer_range;
        control.steer = if lo < hi { rng.gen_range(lo..=hi) } else { lo };
    }

    control.clamped()
}
