//! Vehicle control record and planner direction hints.

/// One control command for the ego vehicle.
///
/// A single value is threaded through the tick, mutated by the planner and
/// by rules, and applied to the world exactly once at the end of the tick.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VehicleControl {
    /// `[0, 1]`
    pub throttle: f32,
    /// `[-1, 1]`, negative is left.
    pub steer: f32,
    /// `[0, 1]`
    pub brake: f32,
    pub hand_brake: bool,
    pub reverse: bool,
}

impl VehicleControl {
    /// Full stop: no throttle, full brake.
    pub const STOP: VehicleControl = VehicleControl {
        throttle: 0.0,
        steer: 0.0,
        brake: 1.0,
        hand_brake: false,
        reverse: false,
    };

    pub fn new(throttle: f32, steer: f32, brake: f32) -> Self {
        Self { throttle, steer, brake, ..Default::default() }
    }

    /// Copy with every axis clamped into its valid range.
    pub fn clamped(self) -> Self {
        Self {
            throttle: self.throttle.clamp(0.0, 1.0),
            steer: self.steer.clamp(-1.0, 1.0),
            brake: self.brake.clamp(0.0, 1.0),
            ..self
        }
    }

    #[inline]
    pub fn is_braking(&self) -> bool {
        self.brake > 0.0 || self.hand_brake
    }
}

impl std::fmt::Display for VehicleControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "throttle={:.2} steer={:.2} brake={:.2} hand_brake={} reverse={}",
            self.throttle, self.steer, self.brake, self.hand_brake, self.reverse
        )
    }
}

// ── RoadOption ────────────────────────────────────────────────────────────────

/// Topological maneuver attached to a planned waypoint.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RoadOption {
    Void,
    Left,
    Right,
    Straight,
    #[default]
    LaneFollow,
    ChangeLaneLeft,
    ChangeLaneRight,
}

impl RoadOption {
    /// `true` for a turn at a junction.
    #[inline]
    pub fn is_turn(self) -> bool {
        matches!(self, RoadOption::Left | RoadOption::Right)
    }

    #[inline]
    pub fn is_lane_change(self) -> bool {
        matches!(self, RoadOption::ChangeLaneLeft | RoadOption::ChangeLaneRight)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoadOption::Void            => "void",
            RoadOption::Left            => "left",
            RoadOption::Right           => "right",
            RoadOption::Straight        => "straight",
            RoadOption::LaneFollow      => "lane_follow",
            RoadOption::ChangeLaneLeft  => "change_lane_left",
            RoadOption::ChangeLaneRight => "change_lane_right",
        }
    }
}

impl std::fmt::Display for RoadOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
