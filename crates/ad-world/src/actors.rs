//! Actor snapshots reported by the world.

use ad_core::{ActorId, Location, RoadLaneId, Transform, Vec3};

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ActorKind {
    Vehicle,
    Walker,
    TrafficLight,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LightState {
    Red,
    Yellow,
    #[default]
    Green,
    Off,
}

/// Point-in-time copy of one actor.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActorSnapshot {
    pub id: ActorId,
    pub kind: ActorKind,
    pub transform: Transform,
    /// World-frame velocity, m/s.
    pub velocity: Vec3,
    /// Bounding-box half extents, metres.
    pub extent: Vec3,
    /// Set for traffic lights only.
    pub light: Option<TrafficLightInfo>,
}

/// Where a traffic light stops traffic and what it currently shows.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrafficLightInfo {
    pub state: LightState,
    /// Lane whose traffic the light controls.
    pub controls: RoadLaneId,
    /// Stop line position on that lane.
    pub stop_location: Location,
}

impl ActorSnapshot {
    pub fn vehicle(id: ActorId, transform: Transform) -> Self {
        Self {
            id,
            kind: ActorKind::Vehicle,
            transform,
            velocity: Vec3::ZERO,
            extent: Vec3::new(2.4, 1.0, 0.8),
            light: None,
        }
    }

    pub fn walker(id: ActorId, transform: Transform) -> Self {
        Self {
            id,
            kind: ActorKind::Walker,
            transform,
            velocity: Vec3::ZERO,
            extent: Vec3::new(0.3, 0.3, 0.9),
            light: None,
        }
    }

    pub fn traffic_light(id: ActorId, transform: Transform, info: TrafficLightInfo) -> Self {
        Self {
            id,
            kind: ActorKind::TrafficLight,
            transform,
            velocity: Vec3::ZERO,
            extent: Vec3::new(0.3, 0.3, 2.0),
            light: Some(info),
        }
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    #[inline]
    pub fn location(&self) -> Location {
        self.transform.location
    }

    /// Speed in km/h.
    #[inline]
    pub fn speed_kmh(&self) -> f32 {
        3.6 * self.velocity.length()
    }
}
