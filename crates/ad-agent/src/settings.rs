//! Layered agent settings.
//!
//! # Layers
//!
//! ```text
//! declared defaults  <  TOML file  <  runtime override
//! ```
//!
//! Every struct is `#[serde(default)]`, so a file only lists what it
//! changes.  The result is frozen into an `Arc<AgentSettings>` at agent
//! construction and never re-read.
//!
//! # Example file
//!
//! ```toml
//! seed = 7
//!
//! [speed]
//! target_speed_kmh = 40.0
//!
//! [matrix]
//! mode = "async"
//! async_sleep_ms = 50
//!
//! [[rules]]
//! name     = "brake_for_slow_car"
//! phases   = ["CAR_DETECTED|BEGIN"]
//! priority = "HIGH"
//! cooldown = 20
//! action   = "brake"
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ad_matrix::MatrixSettings;
use ad_rules::RuleSpec;

use crate::error::{AgentError, AgentResult};

/// Target speeds, km/h.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedSettings {
    pub target_speed_kmh: f32,
    /// Track the posted limit instead of `target_speed_kmh`.
    pub follow_speed_limits: bool,
    /// Stay this far below the posted limit.
    pub speed_lim_dist_kmh: f32,
    /// How much slower than a leading car to drive when closing in.
    pub speed_decrease_kmh: f32,
    /// Time to collision below which the agent slows down, seconds.
    pub safety_time_s: f32,
    pub min_speed_kmh: f32,
}

impl Default for SpeedSettings {
    fn default() -> Self {
        Self {
            target_speed_kmh: 30.0,
            follow_speed_limits: false,
            speed_lim_dist_kmh: 3.0,
            speed_decrease_kmh: 10.0,
            safety_time_s: 3.0,
            min_speed_kmh: 5.0,
        }
    }
}

/// Detection ranges and safety gaps, metres.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceSettings {
    /// Bumper-to-bumper gap that triggers an emergency stop.
    pub braking_distance_m: f32,
    /// Lower bound of the obstacle scan range.
    pub min_proximity_m: f32,
    /// Scan range is `speed_limit / downscale` when that exceeds `min_proximity_m`.
    pub same_lane_downscale: f32,
    pub other_lane_downscale: f32,
    /// Actors farther than this are not reported as nearby.
    pub nearby_radius_m: f32,
    /// Stop lines farther ahead than this are ignored.
    pub traffic_light_range_m: f32,
}

impl Default for DistanceSettings {
    fn default() -> Self {
        Self {
            braking_distance_m: 5.0,
            min_proximity_m: 10.0,
            same_lane_downscale: 3.0,
            other_lane_downscale: 2.0,
            nearby_radius_m: 45.0,
            traffic_light_range_m: 25.0,
        }
    }
}

/// Emergency braking policy.
///
/// Chances are percentages in `[0, 100]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencySettings {
    pub max_brake: f32,
    pub hand_brake: bool,
    /// Chance of using the opposite of `hand_brake`.
    pub hand_brake_modify_chance: f64,
    pub do_random_steering: bool,
    pub random_steer_range: [f32; 2],
    /// Chance of ignoring the emergency and keeping the planned control.
    pub ignore_percentage: f64,
}

impl Default for EmergencySettings {
    fn default() -> Self {
        Self {
            max_brake: 1.0,
            hand_brake: false,
            hand_brake_modify_chance: 0.0,
            do_random_steering: false,
            random_steer_range: [-0.25, 0.25],
            ignore_percentage: 0.0,
        }
    }
}

/// Local waypoint queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// Spacing of routed waypoints, metres.
    pub sampling_resolution_m: f32,
    /// Waypoints closer than this to ego count as reached.
    pub min_distance_m: f32,
    /// Look-ahead steps are `speed_limit / look_ahead_divisor`.
    pub look_ahead_divisor: f32,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self { sampling_resolution_m: 2.0, min_distance_m: 3.0, look_ahead_divisor: 10.0 }
    }
}

/// Rule dispatch bounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSettings {
    /// Reject phase requests that do not follow the state machine.
    pub strict_phases: bool,
    /// Restarts in one tick after which a warning is logged.
    pub replan_warn_after: u32,
    /// Restarts in one tick after which the session fails.
    pub max_replans: u32,
    /// Tick budget for blocking rules that do not set their own.
    pub blocking_budget: u32,
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self { strict_phases: true, replan_warn_after: 5, max_replans: 50, blocking_budget: ad_rules::DEFAULT_BLOCKING_BUDGET }
    }
}

// ── AgentSettings ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Global seed; mixed with the ego id for the agent's RNG.
    pub seed: u64,
    pub speed: SpeedSettings,
    pub distance: DistanceSettings,
    pub emergency: EmergencySettings,
    pub planner: PlannerSettings,
    pub matrix: MatrixSettings,
    pub dispatch: RuleSettings,
    /// Declarative rules, resolved through a `RuleRegistry` at build time.
    pub rules: Vec<RuleSpec>,
}

impl AgentSettings {
    /// Defaults overlaid with the keys present in `text`.
    pub fn from_toml_str(text: &str) -> AgentResult<Self> {
        let settings: AgentSettings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> AgentResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Apply the runtime layer.
    pub fn with_override(mut self, f: impl FnOnce(&mut AgentSettings)) -> Self {
        f(&mut self);
        self
    }

    pub fn validate(&self) -> AgentResult<()> {
        let bad = |msg: &str| Err(AgentError::Settings(msg.to_owned()));
        let e = &self.emergency;
        if !(0.0..=1.0).contains(&e.max_brake) {
            return bad("emergency.max_brake must be within [0, 1]");
        }
        if !(0.0..=100.0).contains(&e.hand_brake_modify_chance) || !(0.0..=100.0).contains(&e.ignore_percentage) {
            return bad("emergency chances are percentages within [0, 100]");
        }
        if e.random_steer_range[0] > e.random_steer_range[1] {
            return bad("emergency.random_steer_range must be ordered");
        }
        let d = &self.distance;
        if d.same_lane_downscale <= 0.0 || d.other_lane_downscale <= 0.0 {
            return bad("distance downscale factors must be positive");
        }
        if self.planner.look_ahead_divisor <= 0.0 || self.planner.sampling_resolution_m <= 0.0 {
            return bad("planner resolution and look-ahead divisor must be positive");
        }
        if self.dispatch.max_replans == 0 || self.dispatch.blocking_budget == 0 {
            return bad("dispatch.max_replans and dispatch.blocking_budget must be positive");
        }
        if self.matrix.sync_interval_ticks == 0 {
            return bad("matrix.sync_interval_ticks must be positive");
        }
        Ok(())
    }

    pub fn into_shared(self) -> Arc<AgentSettings> {
        Arc::new(self)
    }

    /// Cruise speed on a road with limit `speed_limit_kmh`.
    pub fn target_speed(&self, speed_limit_kmh: f32) -> f32 {
        let s = &self.speed;
        let capped = speed_limit_kmh - s.speed_lim_dist_kmh;
        if s.follow_speed_limits { capped } else { s.target_speed_kmh.min(capped) }.max(0.0)
    }

    /// `max(min_proximity, speed_limit / downscale)`.
    pub fn max_detection_distance(&self, speed_limit_kmh: f32, same_lane: bool) -> f32 {
        let d = &self.distance;
        let downscale = if same_lane { d.same_lane_downscale } else { d.other_lane_downscale };
        d.min_proximity_m.max(speed_limit_kmh / downscale)
    }
}
