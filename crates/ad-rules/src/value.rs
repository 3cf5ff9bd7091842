//! Values flowing between conditions, actions and phases.

use std::fmt;

use ad_core::{ActorId, HazardSet, VehicleControl};
use ad_world::LightState;

/// Result of a condition.  Selects which action runs.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Verdict {
    Bool(bool),
    Int(i64),
    Label(String),
}

impl Verdict {
    pub const TRUE: Verdict = Verdict::Bool(true);
    pub const FALSE: Verdict = Verdict::Bool(false);

    /// `false`, `0` and the empty label are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Verdict::Bool(b) => *b,
            Verdict::Int(i) => *i != 0,
            Verdict::Label(s) => !s.is_empty(),
        }
    }

    /// Parse a key as written in rule files: `true`/`false`, an integer, or
    /// anything else as a label.
    pub fn parse(key: &str) -> Verdict {
        match key {
            "true" | "True" => Verdict::TRUE,
            "false" | "False" => Verdict::FALSE,
            _ => key.parse().map(Verdict::Int).unwrap_or_else(|_| Verdict::Label(key.to_owned())),
        }
    }
}

impl From<bool> for Verdict {
    fn from(b: bool) -> Self {
        Verdict::Bool(b)
    }
}

impl From<i64> for Verdict {
    fn from(i: i64) -> Self {
        Verdict::Int(i)
    }
}

impl From<&str> for Verdict {
    fn from(s: &str) -> Self {
        Verdict::Label(s.to_owned())
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Bool(b) => write!(f, "{b}"),
            Verdict::Int(i) => write!(f, "{i}"),
            Verdict::Label(s) => f.write_str(s),
        }
    }
}

/// Outcome of the traffic-light check.
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct TrafficLightDetection {
    pub found: bool,
    pub light: Option<ActorId>,
    pub state: Option<LightState>,
    /// Distance to the stop line, metres.
    pub distance: f32,
}

/// Outcome of a pedestrian or vehicle proximity check.
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct ObstacleDetection {
    pub found: bool,
    pub actor: Option<ActorId>,
    pub distance: f32,
}

/// What an action or a phase produced.
#[derive(Clone, PartialEq, Debug, Default)]
pub enum RuleValue {
    #[default]
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Control(VehicleControl),
    Hazards(HazardSet),
    Obstacle(ObstacleDetection),
    TrafficLight(TrafficLightDetection),
    List(Vec<RuleValue>),
}

impl RuleValue {
    pub fn as_control(&self) -> Option<VehicleControl> {
        match self {
            RuleValue::Control(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_obstacle(&self) -> Option<&ObstacleDetection> {
        match self {
            RuleValue::Obstacle(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_traffic_light(&self) -> Option<&TrafficLightDetection> {
        match self {
            RuleValue::TrafficLight(t) => Some(t),
            _ => None,
        }
    }
}

impl From<VehicleControl> for RuleValue {
    fn from(c: VehicleControl) -> Self {
        RuleValue::Control(c)
    }
}

impl From<bool> for RuleValue {
    fn from(b: bool) -> Self {
        RuleValue::Bool(b)
    }
}
